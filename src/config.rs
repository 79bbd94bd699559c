use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::{Currency, ProviderCode, WalletId};
use crate::provider::{FeeSchedule, PaymentMethod};
use crate::router::Zone;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit per-movement ledger audit lines (target `FUNDRAIL::AUDIT`)
    #[serde(default = "default_true")]
    pub enable_audit: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub crypto_rails: CryptoRailsConfig,
    #[serde(default)]
    pub internal_transfer: InternalTransferConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub sandbox_providers: Vec<SandboxProviderConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; in-memory stores are used when absent
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Server-side `statement_timeout` applied to every pooled connection
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            acquire_timeout_ms: 5_000,
            statement_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouterConfig {
    pub fallback_zone: Zone,
    pub provider_timeout_ms: u64,
    /// Ordered provider codes per zone, most preferred first
    #[serde(default)]
    pub priorities: BTreeMap<Zone, Vec<ProviderCode>>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fallback_zone: Zone::Africa,
            provider_timeout_ms: 30_000,
            priorities: BTreeMap::new(),
        }
    }
}

impl RouterConfig {
    pub fn priority_table(&self) -> HashMap<Zone, Vec<ProviderCode>> {
        self.priorities
            .iter()
            .map(|(zone, codes)| (*zone, codes.clone()))
            .collect()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CryptoRailsConfig {
    pub internal_pool_enabled: bool,
    /// USD-equivalent amount at or below which the internal pool is tried
    pub instant_threshold_usd: Decimal,
    pub pool_fee_rate: Decimal,
    pub blockchain_fee_rate: Decimal,
    pub network_fee_usd: Decimal,
    pub pool_estimated_seconds: u64,
    pub blockchain_estimated_seconds: u64,
    pub initial_pool_balance: Decimal,
    pub stablecoin: Currency,
    /// Treat an unknown source currency as 1:1 against USD instead of failing
    pub assume_par_for_unknown_source: bool,
    /// USD per unit of fiat
    pub fiat_to_usd: BTreeMap<Currency, Decimal>,
    /// Local units per USD
    pub usd_to_local: BTreeMap<Currency, Decimal>,
}

impl Default for CryptoRailsConfig {
    fn default() -> Self {
        let fiat_to_usd = [
            ("USD", dec!(1)),
            ("EUR", dec!(1.08)),
            ("GBP", dec!(1.27)),
            ("XOF", dec!(0.00165)),
            ("XAF", dec!(0.00165)),
            ("NGN", dec!(0.00065)),
            ("GHS", dec!(0.065)),
            ("KES", dec!(0.0077)),
            ("CAD", dec!(0.73)),
        ];
        let usd_to_local = [
            ("USD", dec!(1)),
            ("EUR", dec!(0.926)),
            ("GBP", dec!(0.787)),
            ("XOF", dec!(606)),
            ("XAF", dec!(606)),
            ("NGN", dec!(1540)),
            ("GHS", dec!(15.4)),
            ("KES", dec!(129.5)),
            ("CAD", dec!(1.37)),
        ];
        Self {
            internal_pool_enabled: true,
            instant_threshold_usd: dec!(2500),
            pool_fee_rate: dec!(0.005),
            blockchain_fee_rate: dec!(0.01),
            network_fee_usd: dec!(1.5),
            pool_estimated_seconds: 5,
            blockchain_estimated_seconds: 120,
            initial_pool_balance: dec!(100000),
            stablecoin: Currency::usdc(),
            assume_par_for_unknown_source: true,
            fiat_to_usd: fiat_to_usd
                .into_iter()
                .map(|(c, r)| (Currency::new(c), r))
                .collect(),
            usd_to_local: usd_to_local
                .into_iter()
                .map(|(c, r)| (Currency::new(c), r))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InternalTransferConfig {
    /// Fee rate for same-currency transfers
    pub direct_fee_rate: Decimal,
    /// USD-equivalent amount at or below which cross-currency transfers settle instantly
    pub instant_threshold_usd: Decimal,
    pub lock_window_secs: u64,
    pub settlement_queue_size: usize,
    /// Revenue wallet per currency credited with direct-transfer fees
    #[serde(default)]
    pub fee_wallets: BTreeMap<Currency, WalletId>,
}

impl Default for InternalTransferConfig {
    fn default() -> Self {
        Self {
            direct_fee_rate: dec!(0.001),
            instant_threshold_usd: dec!(2500),
            lock_window_secs: 300,
            settlement_queue_size: 1024,
            fee_wallets: BTreeMap::new(),
        }
    }
}

impl InternalTransferConfig {
    pub fn lock_window(&self) -> Duration {
        Duration::from_secs(self.lock_window_secs)
    }

    pub fn fee_wallet(&self, currency: &Currency) -> Option<&WalletId> {
        self.fee_wallets.get(currency)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Source wallet for hot-wallet auto-recharge
    pub cold_wallet: WalletId,
    pub recharge_threshold: Decimal,
    pub recharge_target: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cold_wallet: WalletId::new("platform-cold"),
            recharge_threshold: dec!(1000),
            recharge_target: dec!(10000),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweeperConfig {
    pub scan_interval_secs: u64,
    /// Extra time past the estimated unlock before a locked transfer is expired
    pub grace_secs: u64,
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            grace_secs: 60,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrchestratorConfig {
    pub payout_buffer_secs: u64,
    /// Receives converted value when a payout fails after conversion
    pub holding_wallet: WalletId,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            payout_buffer_secs: 300,
            holding_wallet: WalletId::new("platform-holding"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_estimated_seconds() -> u64 {
    60
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SandboxProviderConfig {
    pub code: ProviderCode,
    #[serde(default)]
    pub display_name: Option<String>,
    pub countries: Vec<crate::core_types::CountryCode>,
    pub methods: Vec<PaymentMethod>,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default = "default_estimated_seconds")]
    pub estimated_seconds: u64,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.database.max_connections == 0 || self.database.statement_timeout_ms == 0 {
            return invalid("database.max_connections and statement_timeout_ms must be > 0".into());
        }
        if self.router.provider_timeout_ms == 0 {
            return invalid("router.provider_timeout_ms must be > 0".into());
        }
        for (zone, codes) in &self.router.priorities {
            if codes.is_empty() {
                return invalid(format!("router.priorities.{} is empty", zone));
            }
        }

        let rails = &self.crypto_rails;
        for (name, rate) in [
            ("pool_fee_rate", rails.pool_fee_rate),
            ("blockchain_fee_rate", rails.blockchain_fee_rate),
            ("network_fee_usd", rails.network_fee_usd),
            ("initial_pool_balance", rails.initial_pool_balance),
        ] {
            if rate.is_sign_negative() {
                return invalid(format!("crypto_rails.{} must not be negative", name));
            }
        }
        if rails.pool_fee_rate >= Decimal::ONE || rails.blockchain_fee_rate >= Decimal::ONE {
            return invalid("crypto_rails fee rates must be below 1".into());
        }
        if rails.instant_threshold_usd <= Decimal::ZERO {
            return invalid("crypto_rails.instant_threshold_usd must be > 0".into());
        }
        for (table, rates) in [("fiat_to_usd", &rails.fiat_to_usd), ("usd_to_local", &rails.usd_to_local)] {
            if let Some((currency, _)) = rates.iter().find(|(_, r)| **r <= Decimal::ZERO) {
                return invalid(format!("crypto_rails.{}.{} must be > 0", table, currency));
            }
        }

        let transfer = &self.internal_transfer;
        if transfer.direct_fee_rate.is_sign_negative() || transfer.direct_fee_rate >= Decimal::ONE {
            return invalid("internal_transfer.direct_fee_rate must be in [0, 1)".into());
        }
        if transfer.instant_threshold_usd <= Decimal::ZERO {
            return invalid("internal_transfer.instant_threshold_usd must be > 0".into());
        }
        if transfer.settlement_queue_size == 0 {
            return invalid("internal_transfer.settlement_queue_size must be > 0".into());
        }

        if self.ledger.recharge_target < self.ledger.recharge_threshold {
            return invalid("ledger.recharge_target must be >= recharge_threshold".into());
        }

        if self.sweeper.scan_interval_secs == 0 || self.sweeper.batch_size == 0 {
            return invalid("sweeper.scan_interval_secs and batch_size must be > 0".into());
        }

        for provider in &self.sandbox_providers {
            if provider.countries.is_empty() || provider.methods.is_empty() {
                return invalid(format!(
                    "sandbox provider {} needs countries and methods",
                    provider.code
                ));
            }
        }

        Ok(())
    }
}
