//! Fund-Movement Ledger
//!
//! Double-entry bookkeeping for hot wallets, user wallets and the cold
//! wallet. Every balance change is a [`LedgerBatch`] committed atomically by
//! a [`LedgerStore`]; the signed sum of a committed batch is zero.

pub mod error;
pub mod pg;
pub mod service;
pub mod store;
pub mod types;

pub use error::LedgerError;
pub use pg::PgLedgerStore;
pub use service::{
    DepositSettlement, FundLedger, LedgerReceipt, WithdrawalOutcome, WithdrawalStaging,
};
pub use store::{LedgerStore, MemoryLedgerStore};
pub use types::{
    Direction, LedgerBatch, LedgerMovement, LedgerTransaction, LedgerTxKind, LedgerTxStatus,
    Posting, StatusUpdate,
};
