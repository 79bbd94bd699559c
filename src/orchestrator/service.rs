//! Cross-border transfer orchestration
//!
//! ```text
//! quote:    bridge.get_quote ─▶ router.get_quote(converted amount)
//! execute:  bridge.convert (reserve pool) ─▶ router.create_payout
//!              ├─ ok   ─▶ commit pool usage
//!              └─ fail ─▶ release pool, park converted value in holding wallet
//! ```
//!
//! A reference executes once per orchestrator: a finished reference returns
//! its recorded outcome, one still executing is rejected with `InProgress`.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::OrchestratorError;
use crate::config::OrchestratorConfig;
use crate::core_types::{CountryCode, Currency, ProviderCode, ReferenceId};
use crate::crypto_rails::{ConversionPath, ConversionRequest, ConversionResponse, CryptoRailsBridge};
use crate::events::{
    EventPublisher, SettlementEvent, TOPIC_PAYOUT_COMPLETED, TOPIC_PAYOUT_FAILED,
};
use crate::logging::AUDIT_TARGET;
use crate::provider::{PaymentMethod, PaymentStatus, PayoutRequest, Recipient};
use crate::router::{RoutedPayout, ZoneRouter};
use crate::wallet::WalletService;

/// Fiat in, fiat out across a border
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossBorderRequest {
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub country: CountryCode,
    pub method: PaymentMethod,
    pub recipient: Recipient,
    pub narration: Option<String>,
}

impl CrossBorderRequest {
    fn conversion(&self) -> ConversionRequest {
        ConversionRequest::new(
            self.reference.clone(),
            self.amount,
            self.source_currency.clone(),
            self.target_currency.clone(),
        )
    }

    fn payout(&self, amount: Decimal) -> PayoutRequest {
        PayoutRequest {
            reference: self.reference.clone(),
            amount,
            currency: self.target_currency.clone(),
            country: self.country.clone(),
            method: self.method,
            recipient: self.recipient.clone(),
            narration: self.narration.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferQuote {
    pub reference: ReferenceId,
    pub source_amount: Decimal,
    pub source_currency: Currency,
    /// Amount handed to the payout rail
    pub converted_amount: Decimal,
    pub target_currency: Currency,
    pub exchange_rate: Decimal,
    pub conversion_fee: Decimal,
    pub payout_fee: Decimal,
    /// Conversion and payout fees, in the target currency
    pub total_fee: Decimal,
    pub recipient_amount: Decimal,
    pub provider: ProviderCode,
    pub conversion_path: ConversionPath,
    pub estimated_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub reference: ReferenceId,
    pub conversion: ConversionResponse,
    /// Present when a provider accepted the payout
    pub payout: Option<RoutedPayout>,
    pub status: PaymentStatus,
    pub failure: Option<String>,
    pub failure_code: Option<&'static str>,
    /// Reference of the holding-wallet credit made after a failed payout
    pub reversal_reference: Option<ReferenceId>,
}

pub struct TransferOrchestrator {
    router: Arc<ZoneRouter>,
    bridge: Arc<CryptoRailsBridge>,
    wallets: Arc<dyn WalletService>,
    events: Arc<dyn EventPublisher>,
    config: OrchestratorConfig,
    executions: Mutex<HashMap<ReferenceId, Execution>>,
}

enum Execution {
    InFlight,
    Finished(TransferOutcome),
}

impl TransferOrchestrator {
    pub fn new(
        router: Arc<ZoneRouter>,
        bridge: Arc<CryptoRailsBridge>,
        wallets: Arc<dyn WalletService>,
        events: Arc<dyn EventPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router,
            bridge,
            wallets,
            events,
            config,
            executions: Mutex::new(HashMap::new()),
        }
    }

    /// Price the whole route without side effects
    pub async fn get_quote(
        &self,
        request: &CrossBorderRequest,
    ) -> Result<TransferQuote, OrchestratorError> {
        let conversion = self.bridge.get_quote(&request.conversion()).await?;
        let payout = self
            .router
            .get_quote(&request.payout(conversion.target_amount))
            .await?;

        Ok(TransferQuote {
            reference: request.reference.clone(),
            source_amount: request.amount,
            source_currency: request.source_currency.clone(),
            converted_amount: conversion.target_amount,
            target_currency: request.target_currency.clone(),
            exchange_rate: conversion.exchange_rate(),
            conversion_fee: conversion.fee_in_target,
            payout_fee: payout.fee,
            total_fee: conversion.fee_in_target + payout.fee,
            recipient_amount: conversion.target_amount - payout.fee,
            provider: payout.provider,
            conversion_path: conversion.path,
            estimated_seconds: conversion.estimated_seconds
                + payout.estimated_seconds
                + self.config.payout_buffer_secs,
        })
    }

    /// Convert then pay out
    ///
    /// A conversion failure is returned as an error with nothing reserved and
    /// the reference may be retried. A payout failure after conversion is
    /// reported in the outcome, with the converted value parked under
    /// `<reference>_reversal`; repeating the reference returns that outcome.
    pub async fn execute_transfer(
        &self,
        request: &CrossBorderRequest,
    ) -> Result<TransferOutcome, OrchestratorError> {
        {
            let mut executions = self.executions.lock().await;
            match executions.get(&request.reference) {
                Some(Execution::Finished(outcome)) => {
                    debug!(reference = %request.reference, status = ?outcome.status, "Known reference, returning recorded outcome");
                    return Ok(outcome.clone());
                }
                Some(Execution::InFlight) => {
                    warn!(reference = %request.reference, "Reference already executing");
                    return Err(OrchestratorError::InProgress(request.reference.clone()));
                }
                None => {
                    executions.insert(request.reference.clone(), Execution::InFlight);
                }
            }
        }

        let result = self.convert_and_pay_out(request).await;

        let mut executions = self.executions.lock().await;
        match &result {
            Ok(outcome) => {
                executions.insert(
                    request.reference.clone(),
                    Execution::Finished(outcome.clone()),
                );
            }
            Err(_) => {
                executions.remove(&request.reference);
            }
        }
        result
    }

    async fn convert_and_pay_out(
        &self,
        request: &CrossBorderRequest,
    ) -> Result<TransferOutcome, OrchestratorError> {
        let conversion = self.bridge.convert_via_stablecoin(&request.conversion()).await?;
        let payout_request = request.payout(conversion.target_amount);

        match self.router.create_payout(&payout_request).await {
            Ok(routed) => {
                if conversion.used_internal_pool
                    && let Err(e) = self.bridge.commit_pool_usage(&request.reference).await
                {
                    error!(reference = %request.reference, error = %e, "Pool usage commit failed");
                }
                info!(
                    target: AUDIT_TARGET,
                    reference = %request.reference,
                    source_amount = %request.amount,
                    source_currency = %request.source_currency,
                    paid_amount = %conversion.target_amount,
                    target_currency = %request.target_currency,
                    provider = ?routed.response.provider,
                    path = ?conversion.path,
                    "Cross-border transfer paid out"
                );
                self.events
                    .publish(SettlementEvent::new(
                        TOPIC_PAYOUT_COMPLETED,
                        request.reference.clone(),
                        conversion.target_amount,
                        request.target_currency.clone(),
                        routed.response.status.as_str(),
                    ))
                    .await;

                Ok(TransferOutcome {
                    reference: request.reference.clone(),
                    status: routed.response.status,
                    conversion,
                    payout: Some(routed),
                    failure: None,
                    failure_code: None,
                    reversal_reference: None,
                })
            }
            Err(e) => {
                warn!(
                    reference = %request.reference,
                    attempts = e.attempt_count(),
                    error = %e,
                    "Payout failed after conversion, reversing"
                );
                let reversal_reference = self.reverse(&conversion).await;
                self.events
                    .publish(
                        SettlementEvent::new(
                            TOPIC_PAYOUT_FAILED,
                            request.reference.clone(),
                            conversion.target_amount,
                            request.target_currency.clone(),
                            "failed",
                        )
                        .with_detail(e.to_string()),
                    )
                    .await;

                Ok(TransferOutcome {
                    reference: request.reference.clone(),
                    conversion,
                    payout: None,
                    status: PaymentStatus::Failed,
                    failure: Some(e.to_string()),
                    failure_code: Some(e.code()),
                    reversal_reference,
                })
            }
        }
    }

    async fn reverse(&self, conversion: &ConversionResponse) -> Option<ReferenceId> {
        if conversion.used_internal_pool
            && let Err(e) = self
                .bridge
                .release_pool_reservation(&conversion.reference)
                .await
        {
            warn!(reference = %conversion.reference, error = %e, "Pool reservation release failed");
        }

        let reversal = conversion.reference.reversal();
        match self
            .wallets
            .credit_wallet(&self.config.holding_wallet, conversion.target_amount, &reversal)
            .await
        {
            Ok(balance) => {
                info!(
                    target: AUDIT_TARGET,
                    reference = %reversal,
                    wallet = %self.config.holding_wallet,
                    amount = %conversion.target_amount,
                    currency = %conversion.target_currency,
                    balance = %balance,
                    "Converted value parked in holding wallet"
                );
                Some(reversal)
            }
            Err(e) => {
                error!(
                    reference = %reversal,
                    error = %e,
                    "CRITICAL: holding wallet credit failed, manual reconciliation required"
                );
                None
            }
        }
    }

    pub async fn get_status(
        &self,
        provider: &ProviderCode,
        provider_reference: &str,
    ) -> Result<PaymentStatus, OrchestratorError> {
        Ok(self
            .router
            .get_payout_status(provider, provider_reference)
            .await?)
    }
}
