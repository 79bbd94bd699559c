use rust_decimal::Decimal;
use thiserror::Error;

use super::types::LedgerTxStatus;
use crate::core_types::{Currency, ReferenceId, WalletId};
use crate::i18n::{Localized, Message, catalog};
use crate::instance::InstanceError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Ledger account not found: {0}")]
    AccountNotFound(WalletId),

    #[error("Insufficient balance in {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: WalletId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account {account} holds {actual}, transaction is in {expected}")]
    CurrencyMismatch {
        account: WalletId,
        expected: Currency,
        actual: Currency,
    },

    #[error("Balance of {account} moved: expected {expected}, found {actual}")]
    StaleBalance {
        account: WalletId,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Unbalanced batch: {0}")]
    Unbalanced(String),

    #[error("Amount must be positive: {0}")]
    InvalidAmount(Decimal),

    #[error("Reference already used: {0}")]
    DuplicateReference(ReferenceId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(ReferenceId),

    #[error("Transaction {reference} is {status}, expected pending")]
    InvalidStatus {
        reference: ReferenceId,
        status: LedgerTxStatus,
    },

    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::StaleBalance { .. } => "STALE_BALANCE",
            Self::Unbalanced(_) => "UNBALANCED_BATCH",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::Instance(e) => e.code(),
            Self::Corrupt(_) => "CORRUPT_DATA",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl Localized for LedgerError {
    fn message(&self) -> Message {
        match self {
            Self::InsufficientBalance { .. } => catalog::INSUFFICIENT_BALANCE,
            Self::InvalidAmount(_) => catalog::INVALID_AMOUNT,
            Self::CurrencyMismatch { .. } => catalog::CURRENCY_NOT_SUPPORTED,
            _ => catalog::INTERNAL,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}
