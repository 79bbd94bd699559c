//! Collection Router (deposit side)
//!
//! Same zone table and failover rules as the payout router, applied to
//! collection rails.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::error::{ProviderFailure, RouterError};
use super::payout::with_timeout;
use super::registry::{Candidate, ProviderRegistry};
use super::zone::Zone;
use crate::config::RouterConfig;
use crate::core_types::{CountryCode, ProviderCode};
use crate::provider::{CollectionProvider, CollectionRequest, CollectionResponse, PaymentMethod};

pub struct CollectionRouter {
    registry: ProviderRegistry<dyn CollectionProvider>,
    call_timeout: Duration,
}

impl CollectionRouter {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            registry: ProviderRegistry::new(config.fallback_zone, config.priority_table()),
            call_timeout: config.call_timeout(),
        }
    }

    pub fn with_priorities(
        fallback_zone: Zone,
        priorities: HashMap<Zone, Vec<ProviderCode>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry: ProviderRegistry::new(fallback_zone, priorities),
            call_timeout,
        }
    }

    pub async fn register(&self, provider: Arc<dyn CollectionProvider>) {
        self.registry.register(provider.info().clone(), provider).await;
    }

    pub async fn set_priority(&self, zone: Zone, codes: Vec<ProviderCode>) {
        self.registry.set_priority(zone, codes).await;
    }

    /// Start a collection, failing over on retryable errors
    pub async fn initiate_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<CollectionResponse, RouterError> {
        let candidates = self
            .registry
            .candidates(&request.country, Some(request.method))
            .await?;

        let mut failures = Vec::new();
        for Candidate { code, provider } in candidates {
            match with_timeout(self.call_timeout, provider.initiate_collection(request)).await {
                Ok(mut response) => {
                    response.provider = Some(code.clone());
                    info!(
                        reference = %request.reference,
                        provider = %code,
                        attempts = failures.len() + 1,
                        "Collection initiated"
                    );
                    return Ok(response);
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        reference = %request.reference,
                        provider = %code,
                        error = %error,
                        "Collection attempt failed, trying next provider"
                    );
                    failures.push(ProviderFailure {
                        provider: code,
                        error,
                    });
                }
                Err(error) => {
                    return Err(RouterError::Aborted {
                        provider: code,
                        error,
                    });
                }
            }
        }

        Err(RouterError::AllProvidersFailed { attempts: failures })
    }

    pub async fn verify_collection(
        &self,
        provider: &ProviderCode,
        provider_reference: &str,
    ) -> Result<CollectionResponse, RouterError> {
        let p = self.registry.get(provider).await?;
        let mut response = with_timeout(self.call_timeout, p.verify_collection(provider_reference))
            .await
            .map_err(|error| RouterError::Aborted {
                provider: provider.clone(),
                error,
            })?;
        response.provider = Some(provider.clone());
        Ok(response)
    }

    pub async fn available_methods_for_country(
        &self,
        country: &CountryCode,
    ) -> Result<Vec<PaymentMethod>, RouterError> {
        let candidates = self.registry.candidates(country, None).await?;
        let methods: BTreeSet<PaymentMethod> = candidates
            .iter()
            .flat_map(|c| c.provider.available_methods(country))
            .collect();
        Ok(methods.into_iter().collect())
    }
}
