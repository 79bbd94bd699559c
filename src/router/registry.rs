//! Provider Registry
//!
//! Read-mostly store of registered providers and the per-zone priority
//! table. Registration happens at start-up; lookups take the read side of a
//! `tokio::sync::RwLock` and never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::RouterError;
use super::zone::Zone;
use crate::core_types::{CountryCode, ProviderCode};
use crate::provider::{PaymentMethod, ProviderInfo};

struct Entry<P: ?Sized> {
    info: ProviderInfo,
    provider: Arc<P>,
}

struct RegistryState<P: ?Sized> {
    providers: HashMap<ProviderCode, Entry<P>>,
    priorities: HashMap<Zone, Vec<ProviderCode>>,
}

/// A capable provider selected for a country
pub struct Candidate<P: ?Sized> {
    pub code: ProviderCode,
    pub provider: Arc<P>,
}

impl<P: ?Sized> Clone for Candidate<P> {
    fn clone(&self) -> Self {
        Self {
            code: self.code.clone(),
            provider: self.provider.clone(),
        }
    }
}

pub struct ProviderRegistry<P: ?Sized> {
    state: RwLock<RegistryState<P>>,
    fallback_zone: Zone,
}

impl<P: ?Sized + Send + Sync> ProviderRegistry<P> {
    pub fn new(fallback_zone: Zone, priorities: HashMap<Zone, Vec<ProviderCode>>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                providers: HashMap::new(),
                priorities,
            }),
            fallback_zone,
        }
    }

    pub async fn register(&self, info: ProviderInfo, provider: Arc<P>) {
        let code = info.code.clone();
        info!(
            provider = %code,
            countries = info.countries.len(),
            "Provider registered"
        );
        self.state
            .write()
            .await
            .providers
            .insert(code, Entry { info, provider });
    }

    /// Replace a zone's ordered provider list (most preferred first)
    pub async fn set_priority(&self, zone: Zone, codes: Vec<ProviderCode>) {
        self.state.write().await.priorities.insert(zone, codes);
    }

    pub async fn priority(&self, zone: Zone) -> Vec<ProviderCode> {
        self.state
            .read()
            .await
            .priorities
            .get(&zone)
            .cloned()
            .unwrap_or_default()
    }

    /// Zone for a country, substituting the fallback zone for unmapped codes
    pub fn zone_for(&self, country: &CountryCode) -> Zone {
        match Zone::classify(country) {
            Some(zone) => zone,
            None => {
                debug!(country = %country, fallback = %self.fallback_zone, "Unmapped country, using fallback zone");
                self.fallback_zone
            }
        }
    }

    pub async fn get(&self, code: &ProviderCode) -> Result<Arc<P>, RouterError> {
        self.state
            .read()
            .await
            .providers
            .get(code)
            .map(|e| e.provider.clone())
            .ok_or_else(|| RouterError::ProviderNotFound(code.clone()))
    }

    pub async fn info(&self, code: &ProviderCode) -> Option<ProviderInfo> {
        self.state
            .read()
            .await
            .providers
            .get(code)
            .map(|e| e.info.clone())
    }

    /// Ordered candidates for a country (and optionally a method)
    ///
    /// Skips providers that are not registered, do not serve the country or
    /// do not advertise the method.
    pub async fn candidates(
        &self,
        country: &CountryCode,
        method: Option<PaymentMethod>,
    ) -> Result<Vec<Candidate<P>>, RouterError> {
        let zone = self.zone_for(country);
        let state = self.state.read().await;
        let order = state.priorities.get(&zone).map(Vec::as_slice).unwrap_or(&[]);

        let serving: Vec<&Entry<P>> = order
            .iter()
            .filter_map(|code| state.providers.get(code))
            .filter(|e| e.info.supports_country(country))
            .collect();

        if serving.is_empty() {
            return Err(RouterError::CountryNotSupported(country.clone()));
        }

        let capable: Vec<Candidate<P>> = serving
            .into_iter()
            .filter(|e| method.is_none_or(|m| e.info.methods.contains(&m)))
            .map(|e| Candidate {
                code: e.info.code.clone(),
                provider: e.provider.clone(),
            })
            .collect();

        match method {
            Some(method) if capable.is_empty() => Err(RouterError::MethodNotSupported {
                country: country.clone(),
                method,
            }),
            _ => Ok(capable),
        }
    }
}
