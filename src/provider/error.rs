//! Provider Error Types
//!
//! The retryable/non-retryable split drives router failover: only transport
//! and availability failures move on to the next candidate.

use thiserror::Error;

use crate::core_types::{CountryCode, Currency};
use crate::i18n::{Localized, Message, catalog};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    // === Retryable ===
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Provider under maintenance: {0}")]
    Maintenance(String),

    // === Non-retryable ===
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Country not supported: {0}")]
    CountryNotSupported(CountryCode),

    #[error("Currency not supported: {0}")]
    CurrencyNotSupported(Currency),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Unknown provider reference: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Whether the router may fail over to the next candidate
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_)
                | ProviderError::Timeout { .. }
                | ProviderError::Maintenance(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Unavailable(_) => "PROVIDER_UNAVAILABLE",
            ProviderError::Timeout { .. } => "PROVIDER_TIMEOUT",
            ProviderError::Maintenance(_) => "PROVIDER_MAINTENANCE",
            ProviderError::Rejected(_) => "PROVIDER_REJECTED",
            ProviderError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            ProviderError::CountryNotSupported(_) => "COUNTRY_NOT_SUPPORTED",
            ProviderError::CurrencyNotSupported(_) => "CURRENCY_NOT_SUPPORTED",
            ProviderError::Unsupported(_) => "UNSUPPORTED_OPERATION",
            ProviderError::NotFound(_) => "PROVIDER_REFERENCE_NOT_FOUND",
        }
    }
}

impl Localized for ProviderError {
    fn message(&self) -> Message {
        match self {
            ProviderError::Unavailable(_)
            | ProviderError::Timeout { .. }
            | ProviderError::Maintenance(_) => catalog::PROVIDER_UNAVAILABLE,
            ProviderError::Rejected(_) => catalog::PROVIDER_REJECTED,
            ProviderError::InvalidRecipient(_) => catalog::INVALID_RECIPIENT,
            ProviderError::CountryNotSupported(_) => catalog::COUNTRY_NOT_SUPPORTED,
            ProviderError::CurrencyNotSupported(_) => catalog::CURRENCY_NOT_SUPPORTED,
            ProviderError::Unsupported(_) | ProviderError::NotFound(_) => catalog::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Unavailable("503".into()).is_retryable());
        assert!(ProviderError::Timeout { after_ms: 100 }.is_retryable());
        assert!(ProviderError::Maintenance("window".into()).is_retryable());

        assert!(!ProviderError::Rejected("limit".into()).is_retryable());
        assert!(!ProviderError::InvalidRecipient("phone".into()).is_retryable());
        assert!(!ProviderError::CountryNotSupported(CountryCode::new("ZZ")).is_retryable());
    }

    #[test]
    fn test_localized_message() {
        let err = ProviderError::InvalidRecipient("bad msisdn".into());
        assert_eq!(err.code(), "INVALID_RECIPIENT");
        assert_eq!(
            err.localized(Locale::Fr),
            "Les informations du bénéficiaire sont invalides"
        );
    }
}
