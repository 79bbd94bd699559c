//! Internal Transfer Engine
//!
//! Wallet-to-wallet transfers inside the platform, same or cross currency.
//!
//! # State Machine
//!
//! ```text
//! PENDING ──────────────────────────────▶ COMPLETED      (direct / instant)
//!    │  └───────────────────────────────▶ FAILED
//!    ▼
//! LOCKED ──▶ PROCESSING ──▶ COMPLETED                     (locked, via worker)
//!    │            └───────▶ FAILED
//!    └──────────────────────▶ FAILED (expired by sweeper)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Validate-Before-Mutate**: amount, wallets and balance are checked before any write
//! 2. **One Reference, One Transfer**: a known reference returns the stored transfer untouched
//! 3. **CAS Status Updates**: every status write names the status it expects to replace
//! 4. **Refund On Partial Settlement**: a debited sender is credited back under `<ref>_refund`

pub mod db;
pub mod engine;
pub mod error;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod worker;

mod integration_tests;

pub use db::PgTransferStore;
pub use engine::InternalTransferEngine;
pub use error::TransferError;
pub use state::TransferStatus;
pub use store::{MemoryTransferStore, TransferStore};
pub use sweeper::ExpirySweeper;
pub use types::{
    CreateTransferRequest, InternalTransfer, PayoutInstruction, SettlementJob, TransferKind,
};
pub use worker::SettlementWorker;
