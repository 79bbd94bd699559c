//! Transfer Error Types

use rust_decimal::Decimal;
use thiserror::Error;

use super::state::TransferStatus;
use crate::core_types::{ReferenceId, WalletId};
use crate::crypto_rails::BridgeError;
use crate::i18n::{Localized, Message, catalog};
use crate::wallet::WalletError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Sender and recipient wallet cannot be the same")]
    SameWallet,

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    // === Settlement Errors ===
    #[error("Conversion failed: {0}")]
    Conversion(#[from] BridgeError),

    #[error("Wallet operation failed: {0}")]
    Wallet(WalletError),

    /// Funds moved and were returned; the transfer is FAILED
    #[error("Transfer {reference} failed and was refunded: {reason}")]
    Refunded {
        reference: ReferenceId,
        reason: String,
    },

    // === Lookup / FSM Errors ===
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Duplicate reference: {0}")]
    DuplicateReference(ReferenceId),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransferStatus,
        to: TransferStatus,
    },

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SameWallet => "SAME_WALLET",
            TransferError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::Conversion(e) => e.code(),
            TransferError::Wallet(e) => e.code(),
            TransferError::Refunded { .. } => "TRANSFER_REFUNDED",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            TransferError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
            TransferError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount
            | TransferError::SameWallet
            | TransferError::DuplicateReference(_) => 400,
            TransferError::WalletNotFound(_) | TransferError::TransferNotFound(_) => 404,
            TransferError::InsufficientBalance { .. }
            | TransferError::Conversion(_)
            | TransferError::Refunded { .. } => 422,
            TransferError::Wallet(_)
            | TransferError::DatabaseError(_)
            | TransferError::SystemError(_)
            | TransferError::InvalidStateTransition { .. } => 500,
            TransferError::ServiceUnavailable(_) => 503,
        }
    }
}

impl Localized for TransferError {
    fn message(&self) -> Message {
        match self {
            TransferError::InvalidAmount => catalog::INVALID_AMOUNT,
            TransferError::SameWallet => catalog::SAME_WALLET,
            TransferError::InsufficientBalance { .. } => catalog::INSUFFICIENT_BALANCE,
            TransferError::Conversion(e) => e.message(),
            TransferError::Refunded { .. } => catalog::TRANSFER_FAILED,
            TransferError::TransferNotFound(_) => catalog::TRANSFER_NOT_FOUND,
            _ => catalog::INTERNAL,
        }
    }
}

impl From<WalletError> for TransferError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::NotFound(wallet) => TransferError::WalletNotFound(wallet),
            WalletError::InsufficientBalance {
                available,
                requested,
                ..
            } => TransferError::InsufficientBalance {
                available,
                requested,
            },
            WalletError::InvalidAmount(_) => TransferError::InvalidAmount,
            other => TransferError::Wallet(other),
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}
