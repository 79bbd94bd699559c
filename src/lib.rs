//! Fundrail - Payment Routing & Fund Movement Engine
//!
//! Moves money between fiat rails across African zones, a stablecoin
//! bridge, and internal wallets, keeping a double-entry record of every
//! movement.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers (WalletId, ReferenceId, Currency, ...)
//! - [`money`] - Currency-aware rounding and fee arithmetic
//! - [`provider`] - Collection / payout capability traits and the sandbox rail
//! - [`router`] - Zone-based provider selection with failover
//! - [`crypto_rails`] - Fiat ↔ stablecoin ↔ fiat conversion with an internal pool
//! - [`wallet`] - Balance, lock and unlock primitives
//! - [`transfer`] - Internal transfer engine (direct / instant / locked)
//! - [`orchestrator`] - Cross-border transfer: convert, then pay out
//! - [`ledger`] - Double-entry fund ledger and hot-wallet recharge
//! - [`instance`] - Aggregator instance selection with limits
//! - [`events`] - Settlement event publishing

// Core types - must be first!
pub mod core_types;

pub mod i18n;
pub mod money;

// Rails
pub mod crypto_rails;
pub mod provider;
pub mod router;

// Funds
pub mod instance;
pub mod ledger;
pub mod orchestrator;
pub mod transfer;
pub mod wallet;

// Infrastructure
pub mod config;
pub mod db;
pub mod events;
pub mod logging;

// Convenient re-exports at crate root
pub use core_types::{
    CountryCode, Currency, InstanceId, InternalTransferId, ProviderCode, ReferenceId, UserId,
    WalletId,
};
pub use crypto_rails::{BridgeError, ConversionPath, CryptoRailsBridge};
pub use events::{EventPublisher, SettlementEvent};
pub use instance::InstanceSelector;
pub use ledger::{FundLedger, LedgerError};
pub use orchestrator::{OrchestratorError, TransferOrchestrator};
pub use provider::{CollectionProvider, PayoutProvider, ProviderError, SandboxProvider};
pub use router::{CollectionRouter, RouterError, Zone, ZoneRouter};
pub use transfer::{InternalTransferEngine, TransferError, TransferStatus};
pub use wallet::{WalletError, WalletService};
