use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{Currency, ReferenceId};
use crate::i18n::{Localized, Message, catalog};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Rate unavailable for {0}")]
    RateUnavailable(Currency),

    #[error("Amount must be positive: {0}")]
    InvalidAmount(Decimal),

    #[error("Amount {amount} too small to cover fee {fee}")]
    BelowFee { amount: Decimal, fee: Decimal },

    #[error("Conversion {0} already holds a pool reservation")]
    DuplicateReference(ReferenceId),

    #[error("No pool reservation for {0}")]
    ReservationNotFound(ReferenceId),
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateUnavailable(_) => "RATE_UNAVAILABLE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::BelowFee { .. } => "AMOUNT_BELOW_FEE",
            Self::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
        }
    }
}

impl Localized for BridgeError {
    fn message(&self) -> Message {
        match self {
            Self::RateUnavailable(_) => catalog::RATE_UNAVAILABLE,
            Self::InvalidAmount(_) | Self::BelowFee { .. } => catalog::INVALID_AMOUNT,
            Self::DuplicateReference(_) => catalog::DUPLICATE_REFERENCE,
            Self::ReservationNotFound(_) => catalog::INTERNAL,
        }
    }
}
