//! Transfer Orchestrator
//!
//! Chains the crypto-rails bridge and the zone router into one cross-border
//! transfer: fiat is converted through the stablecoin rail, then paid out on
//! the best local rail for the destination country.

pub mod error;
pub mod service;

pub use error::OrchestratorError;
pub use service::{CrossBorderRequest, TransferOrchestrator, TransferOutcome, TransferQuote};
