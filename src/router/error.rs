//! Router Error Types

use std::fmt;
use thiserror::Error;

use crate::core_types::{CountryCode, ProviderCode};
use crate::i18n::{Localized, Message, catalog};
use crate::provider::{PaymentMethod, ProviderError};

/// One failed attempt while walking the candidate list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: ProviderCode,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Country not supported: {0}")]
    CountryNotSupported(CountryCode),

    #[error("Method {method} not supported in {country}")]
    MethodNotSupported {
        country: CountryCode,
        method: PaymentMethod,
    },

    #[error("Provider not registered: {0}")]
    ProviderNotFound(ProviderCode),

    /// Non-retryable failure from one provider; routing stopped there
    #[error("{provider} refused the request: {error}")]
    Aborted {
        provider: ProviderCode,
        error: ProviderError,
    },

    #[error("All providers failed: {}", join_failures(.attempts))]
    AllProvidersFailed { attempts: Vec<ProviderFailure> },
}

impl RouterError {
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::CountryNotSupported(_) => "COUNTRY_NOT_SUPPORTED",
            RouterError::MethodNotSupported { .. } => "METHOD_NOT_SUPPORTED",
            RouterError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            RouterError::Aborted { error, .. } => error.code(),
            RouterError::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
        }
    }

    /// Number of provider attempts recorded in the error
    pub fn attempt_count(&self) -> usize {
        match self {
            RouterError::AllProvidersFailed { attempts } => attempts.len(),
            RouterError::Aborted { .. } => 1,
            _ => 0,
        }
    }
}

impl Localized for RouterError {
    fn message(&self) -> Message {
        match self {
            RouterError::CountryNotSupported(_) | RouterError::MethodNotSupported { .. } => {
                catalog::COUNTRY_NOT_SUPPORTED
            }
            RouterError::ProviderNotFound(_) => catalog::INTERNAL,
            RouterError::Aborted { error, .. } => error.message(),
            RouterError::AllProvidersFailed { .. } => catalog::ALL_PROVIDERS_FAILED,
        }
    }
}
