//! Crypto-Rails Bridge
//!
//! Converts fiat to fiat through a USD stablecoin leg. Small amounts settle
//! against an internally held pool; larger ones (or a pool that cannot cover
//! the net amount) go through the blockchain path.
//!
//! Pool accounting keeps `balance` and per-reference reservations. An
//! executed conversion on the pool path reserves its net USD amount; the
//! reservation is either committed (debited) after a successful payout or
//! released.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::rates::RateTable;
use crate::config::CryptoRailsConfig;
use crate::core_types::{Currency, ReferenceId};
use crate::money::round_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPath {
    InternalPool,
    Blockchain,
    /// Source and target currency are equal; nothing to convert
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Quote,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub source_currency: Currency,
    pub target_currency: Currency,
}

impl ConversionRequest {
    pub fn new(
        reference: impl Into<ReferenceId>,
        amount: Decimal,
        source_currency: impl Into<Currency>,
        target_currency: impl Into<Currency>,
    ) -> Self {
        Self {
            reference: reference.into(),
            amount,
            source_currency: source_currency.into(),
            target_currency: target_currency.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversionFees {
    pub conversion_fee_usd: Decimal,
    pub network_fee_usd: Decimal,
}

impl ConversionFees {
    pub fn total_usd(&self) -> Decimal {
        self.conversion_fee_usd + self.network_fee_usd
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub reference: ReferenceId,
    pub source_amount: Decimal,
    pub source_currency: Currency,
    pub target_amount: Decimal,
    pub target_currency: Currency,
    /// USD per unit of source
    pub source_rate: Decimal,
    /// Target units per USD
    pub target_rate: Decimal,
    pub gross_usd: Decimal,
    pub net_usd: Decimal,
    pub fees: ConversionFees,
    /// Total fee expressed in the target currency
    pub fee_in_target: Decimal,
    pub stablecoin: Currency,
    pub path: ConversionPath,
    pub used_internal_pool: bool,
    pub tx_hash: Option<String>,
    pub estimated_seconds: u64,
    pub status: ConversionStatus,
}

impl ConversionResponse {
    /// Effective target units per source unit
    pub fn exchange_rate(&self) -> Decimal {
        self.source_rate * self.target_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub balance: Decimal,
    pub reserved: Decimal,
}

impl PoolSnapshot {
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }
}

#[derive(Debug, Default)]
struct PoolState {
    balance: Decimal,
    reservations: HashMap<ReferenceId, Decimal>,
}

impl PoolState {
    fn reserved(&self) -> Decimal {
        self.reservations.values().copied().sum()
    }

    fn available(&self) -> Decimal {
        self.balance - self.reserved()
    }
}

pub struct CryptoRailsBridge {
    config: CryptoRailsConfig,
    rates: RwLock<RateTable>,
    pool: Mutex<PoolState>,
}

impl CryptoRailsBridge {
    pub fn new(config: &CryptoRailsConfig) -> Self {
        Self::with_rates(config, RateTable::from_config(config))
    }

    pub fn with_rates(config: &CryptoRailsConfig, rates: RateTable) -> Self {
        Self {
            config: config.clone(),
            rates: RwLock::new(rates),
            pool: Mutex::new(PoolState {
                balance: config.initial_pool_balance,
                reservations: HashMap::new(),
            }),
        }
    }

    pub async fn set_rates(&self, rates: RateTable) {
        *self.rates.write().await = rates;
    }

    pub async fn usd_equivalent(
        &self,
        amount: Decimal,
        currency: &Currency,
    ) -> Result<Decimal, BridgeError> {
        self.rates.read().await.to_usd(amount, currency)
    }

    /// Price a conversion without touching the pool
    pub async fn get_quote(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResponse, BridgeError> {
        let available = self.pool.lock().await.available();
        let mut response = self.price(request, available).await?;
        response.status = ConversionStatus::Quote;
        response.tx_hash = None;
        Ok(response)
    }

    /// Execute a conversion
    ///
    /// On the pool path the net USD amount is reserved under the pool lock so
    /// concurrent conversions cannot spend the same balance. The pool is not
    /// debited until [`commit_pool_usage`](Self::commit_pool_usage). A
    /// reference may hold at most one reservation at a time.
    pub async fn convert_via_stablecoin(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionResponse, BridgeError> {
        let mut pool = self.pool.lock().await;
        if pool.reservations.contains_key(&request.reference) {
            warn!(reference = %request.reference, "Conversion reference already holds a reservation");
            return Err(BridgeError::DuplicateReference(request.reference.clone()));
        }
        let response = self.price(request, pool.available()).await?;

        if response.used_internal_pool {
            pool.reservations
                .insert(request.reference.clone(), response.net_usd);
        }
        drop(pool);

        info!(
            reference = %request.reference,
            source = %request.source_currency,
            target = %request.target_currency,
            amount = %request.amount,
            target_amount = %response.target_amount,
            path = ?response.path,
            "Conversion executed"
        );
        Ok(response)
    }

    async fn price(
        &self,
        request: &ConversionRequest,
        pool_available: Decimal,
    ) -> Result<ConversionResponse, BridgeError> {
        if request.amount <= Decimal::ZERO {
            return Err(BridgeError::InvalidAmount(request.amount));
        }

        if request.source_currency == request.target_currency {
            return Ok(self.passthrough(request));
        }

        let (source_rate, target_rate) = {
            let rates = self.rates.read().await;
            (
                rates.source_rate(&request.source_currency)?,
                rates.target_rate(&request.target_currency)?,
            )
        };

        let overflow = || BridgeError::InvalidAmount(request.amount);
        let gross_usd = request.amount.checked_mul(source_rate).ok_or_else(overflow)?;
        let pool_eligible =
            self.config.internal_pool_enabled && gross_usd <= self.config.instant_threshold_usd;

        let pool_fees = ConversionFees {
            conversion_fee_usd: gross_usd
                .checked_mul(self.config.pool_fee_rate)
                .ok_or_else(overflow)?,
            network_fee_usd: Decimal::ZERO,
        };
        let pool_net = gross_usd - pool_fees.total_usd();

        let (path, fees) = if pool_eligible && pool_net <= pool_available {
            (ConversionPath::InternalPool, pool_fees)
        } else {
            if pool_eligible {
                debug!(
                    reference = %request.reference,
                    needed = %pool_net,
                    available = %pool_available,
                    "Pool cannot cover conversion, using blockchain"
                );
            }
            (
                ConversionPath::Blockchain,
                ConversionFees {
                    conversion_fee_usd: gross_usd
                        .checked_mul(self.config.blockchain_fee_rate)
                        .ok_or_else(overflow)?,
                    network_fee_usd: self.config.network_fee_usd,
                },
            )
        };

        let net_usd = gross_usd - fees.total_usd();
        if net_usd <= Decimal::ZERO {
            warn!(reference = %request.reference, gross_usd = %gross_usd, "Amount does not cover conversion fees");
            return Err(BridgeError::BelowFee {
                amount: request.amount,
                fee: fees.total_usd(),
            });
        }

        let target_amount = net_usd.checked_mul(target_rate).ok_or_else(overflow)?;
        let fee_in_target = fees
            .total_usd()
            .checked_mul(target_rate)
            .ok_or_else(overflow)?;

        let used_internal_pool = path == ConversionPath::InternalPool;
        Ok(ConversionResponse {
            reference: request.reference.clone(),
            source_amount: request.amount,
            source_currency: request.source_currency.clone(),
            target_amount: round_for(target_amount, &request.target_currency),
            target_currency: request.target_currency.clone(),
            source_rate,
            target_rate,
            gross_usd,
            net_usd,
            fees,
            fee_in_target: round_for(fee_in_target, &request.target_currency),
            stablecoin: self.config.stablecoin.clone(),
            path,
            used_internal_pool,
            tx_hash: (!used_internal_pool).then(settlement_hash),
            estimated_seconds: if used_internal_pool {
                self.config.pool_estimated_seconds
            } else {
                self.config.blockchain_estimated_seconds
            },
            status: ConversionStatus::Completed,
        })
    }

    fn passthrough(&self, request: &ConversionRequest) -> ConversionResponse {
        ConversionResponse {
            reference: request.reference.clone(),
            source_amount: request.amount,
            source_currency: request.source_currency.clone(),
            target_amount: request.amount,
            target_currency: request.target_currency.clone(),
            source_rate: Decimal::ONE,
            target_rate: Decimal::ONE,
            gross_usd: Decimal::ZERO,
            net_usd: Decimal::ZERO,
            fees: ConversionFees::default(),
            fee_in_target: Decimal::ZERO,
            stablecoin: self.config.stablecoin.clone(),
            path: ConversionPath::Passthrough,
            used_internal_pool: false,
            tx_hash: None,
            estimated_seconds: 0,
            status: ConversionStatus::Completed,
        }
    }

    /// Debit the pool for a reserved conversion (UpdatePoolBalance)
    pub async fn commit_pool_usage(&self, reference: &ReferenceId) -> Result<Decimal, BridgeError> {
        let mut pool = self.pool.lock().await;
        let amount = pool
            .reservations
            .remove(reference)
            .ok_or_else(|| BridgeError::ReservationNotFound(reference.clone()))?;
        pool.balance -= amount;
        info!(reference = %reference, amount = %amount, balance = %pool.balance, "Pool usage committed");
        Ok(amount)
    }

    /// Drop a reservation without debiting the pool
    pub async fn release_pool_reservation(
        &self,
        reference: &ReferenceId,
    ) -> Result<Decimal, BridgeError> {
        let amount = self
            .pool
            .lock()
            .await
            .reservations
            .remove(reference)
            .ok_or_else(|| BridgeError::ReservationNotFound(reference.clone()))?;
        info!(reference = %reference, amount = %amount, "Pool reservation released");
        Ok(amount)
    }

    pub async fn top_up_pool(&self, amount: Decimal) -> Result<Decimal, BridgeError> {
        if amount <= Decimal::ZERO {
            return Err(BridgeError::InvalidAmount(amount));
        }
        let mut pool = self.pool.lock().await;
        pool.balance += amount;
        info!(amount = %amount, balance = %pool.balance, "Pool topped up");
        Ok(pool.balance)
    }

    pub async fn pool_snapshot(&self) -> PoolSnapshot {
        let pool = self.pool.lock().await;
        PoolSnapshot {
            balance: pool.balance,
            reserved: pool.reserved(),
        }
    }
}

fn settlement_hash() -> String {
    format!("0x{}", hex::encode(rand::random::<[u8; 32]>()))
}
