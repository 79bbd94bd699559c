//! Wallet Service Boundary
//!
//! Balance operations on platform wallets. Every mutation carries a
//! reference ID so it can be traced (and compensated) later.

pub mod memory;
pub mod pg;

pub use memory::{MemoryWalletService, WalletEntry};
pub use pg::PgWalletService;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{Currency, ReferenceId, WalletId};
use crate::i18n::{Localized, Message, catalog};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub wallet_id: WalletId,
    pub currency: Currency,
    /// Total balance, including locked funds
    pub balance: Decimal,
    pub locked: Decimal,
}

impl WalletBalance {
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Wallet not found: {0}")]
    NotFound(WalletId),

    #[error("Insufficient balance in {wallet}: available {available}, requested {requested}")]
    InsufficientBalance {
        wallet: WalletId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Amount must be positive: {0}")]
    InvalidAmount(Decimal),

    #[error("No lock {reference} on wallet {wallet}")]
    LockNotFound {
        wallet: WalletId,
        reference: ReferenceId,
    },

    #[error("Lock {0} already exists")]
    DuplicateLock(ReferenceId),

    #[error("Wallet service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "WALLET_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::LockNotFound { .. } => "LOCK_NOT_FOUND",
            Self::DuplicateLock(_) => "DUPLICATE_LOCK",
            Self::Unavailable(_) => "WALLET_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl Localized for WalletError {
    fn message(&self) -> Message {
        match self {
            Self::InsufficientBalance { .. } => catalog::INSUFFICIENT_BALANCE,
            Self::InvalidAmount(_) => catalog::INVALID_AMOUNT,
            _ => catalog::INTERNAL,
        }
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::Database(e.to_string())
    }
}

/// Balance operations on a wallet
#[async_trait]
pub trait WalletService: Send + Sync {
    async fn get_balance(&self, wallet: &WalletId) -> Result<WalletBalance, WalletError>;

    /// Reserve `amount` so it cannot be spent until unlocked
    async fn lock_funds(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<(), WalletError>;

    /// Release a lock, returning the amount that was reserved
    async fn unlock_funds(
        &self,
        wallet: &WalletId,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError>;

    /// Debit available funds, returning the new balance
    async fn debit_wallet(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError>;

    /// Credit funds, returning the new balance
    async fn credit_wallet(
        &self,
        wallet: &WalletId,
        amount: Decimal,
        reference: &ReferenceId,
    ) -> Result<Decimal, WalletError>;
}
