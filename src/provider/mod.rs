//! Provider Capability Interfaces
//!
//! Every external rail is consumed through two traits: [`CollectionProvider`]
//! (deposit side) and [`PayoutProvider`] (withdrawal side). Concrete REST
//! clients live outside this crate; [`SandboxProvider`] is the in-tree rail
//! used for local runs and tests.

pub mod error;
pub mod sandbox;
pub mod types;

pub use error::ProviderError;
pub use sandbox::{SandboxBehavior, SandboxProvider};
pub use types::{
    Bank, CollectionRequest, CollectionResponse, FeeSchedule, MobileOperator, Payer,
    PaymentMethod, PaymentStatus, PayoutQuote, PayoutRequest, PayoutResponse, ProviderInfo,
    Recipient,
};

use async_trait::async_trait;

use crate::core_types::{CountryCode, ProviderCode};

/// Withdrawal-side capability of a rail
///
/// Implementations must treat `PayoutRequest::reference` as an idempotency key.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    fn info(&self) -> &ProviderInfo;

    fn code(&self) -> &ProviderCode {
        &self.info().code
    }

    fn supported_countries(&self) -> Vec<CountryCode> {
        self.info().countries.iter().cloned().collect()
    }

    fn available_methods(&self, country: &CountryCode) -> Vec<PaymentMethod> {
        if self.info().supports_country(country) {
            self.info().methods.iter().copied().collect()
        } else {
            Vec::new()
        }
    }

    async fn banks(&self, country: &CountryCode) -> Result<Vec<Bank>, ProviderError>;

    async fn mobile_operators(
        &self,
        country: &CountryCode,
    ) -> Result<Vec<MobileOperator>, ProviderError>;

    /// Non-retryable: a failure here aborts routing
    async fn validate_recipient(&self, request: &PayoutRequest) -> Result<(), ProviderError>;

    async fn get_quote(&self, request: &PayoutRequest) -> Result<PayoutQuote, ProviderError>;

    async fn create_payout(&self, request: &PayoutRequest)
    -> Result<PayoutResponse, ProviderError>;

    async fn payout_status(&self, provider_reference: &str)
    -> Result<PaymentStatus, ProviderError>;

    async fn cancel_payout(&self, _provider_reference: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("cancel_payout"))
    }
}

/// Deposit-side capability of a rail
#[async_trait]
pub trait CollectionProvider: Send + Sync {
    fn info(&self) -> &ProviderInfo;

    fn code(&self) -> &ProviderCode {
        &self.info().code
    }

    fn supported_countries(&self) -> Vec<CountryCode> {
        self.info().countries.iter().cloned().collect()
    }

    fn available_methods(&self, country: &CountryCode) -> Vec<PaymentMethod> {
        if self.info().supports_country(country) {
            self.info().methods.iter().copied().collect()
        } else {
            Vec::new()
        }
    }

    async fn initiate_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<CollectionResponse, ProviderError>;

    async fn verify_collection(
        &self,
        provider_reference: &str,
    ) -> Result<CollectionResponse, ProviderError>;
}
