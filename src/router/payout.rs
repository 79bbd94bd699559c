//! Zone Router (payout side)
//!
//! Picks the best available payout rail for a destination country and fails
//! over to the next candidate on transport/availability errors.
//!
//! # Failover rules
//!
//! ```text
//! candidate ─▶ validate_recipient ─▶ create_payout ─▶ Ok (stamped with provider)
//!                   │                     │
//!                   │ non-retryable       │ retryable (unavailable/timeout/maintenance)
//!                   ▼                     ▼
//!                 abort              next candidate ─▶ ... ─▶ AllProvidersFailed
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{ProviderFailure, RouterError};
use super::registry::{Candidate, ProviderRegistry};
use super::zone::Zone;
use crate::config::RouterConfig;
use crate::core_types::{CountryCode, ProviderCode};
use crate::provider::{
    Bank, MobileOperator, PaymentMethod, PaymentStatus, PayoutProvider, PayoutQuote,
    PayoutRequest, PayoutResponse, ProviderError,
};

/// Result of a routed payout
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPayout {
    pub response: PayoutResponse,
    /// Providers tried, including the one that succeeded
    pub attempts: usize,
    /// Retryable failures that preceded the success
    pub failures: Vec<ProviderFailure>,
}

/// Run a provider call under a request-scoped timeout
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            after_ms: limit.as_millis() as u64,
        }),
    }
}

pub struct ZoneRouter {
    registry: ProviderRegistry<dyn PayoutProvider>,
    call_timeout: Duration,
}

impl ZoneRouter {
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

    pub async fn register(&self, provider: Arc<dyn PayoutProvider>) {
        self.registry.register(provider.info().clone(), provider).await;
    }

    pub async fn set_priority(&self, zone: Zone, codes: Vec<ProviderCode>) {
        self.registry.set_priority(zone, codes).await;
    }

    pub fn zone_for(&self, country: &CountryCode) -> Zone {
        self.registry.zone_for(country)
    }

    /// Ordered provider codes able to pay `method` in `country`
    pub async fn candidates_for(
        &self,
        country: &CountryCode,
        method: PaymentMethod,
    ) -> Result<Vec<ProviderCode>, RouterError> {
        Ok(self
            .registry
            .candidates(country, Some(method))
            .await?
            .into_iter()
            .map(|c| c.code)
            .collect())
    }

    /// Best available provider for a country/method pair
    pub async fn select_provider(
        &self,
        country: &CountryCode,
        method: PaymentMethod,
    ) -> Result<Arc<dyn PayoutProvider>, RouterError> {
        let candidates = self.registry.candidates(country, Some(method)).await?;
        candidates
            .into_iter()
            .next()
            .map(|c| c.provider)
            .ok_or_else(|| RouterError::CountryNotSupported(country.clone()))
    }

    /// Create a payout, walking the zone's candidates in priority order
    pub async fn create_payout(&self, request: &PayoutRequest) -> Result<RoutedPayout, RouterError> {
        let candidates = self
            .registry
            .candidates(&request.country, Some(request.method))
            .await?;

        let mut failures = Vec::new();
        for Candidate { code, provider } in candidates {
            match self.try_payout(provider.as_ref(), request).await {
                Ok(mut response) => {
                    response.provider = Some(code.clone());
                    info!(
                        reference = %request.reference,
                        provider = %code,
                        attempts = failures.len() + 1,
                        status = %response.status,
                        "Payout created"
                    );
                    return Ok(RoutedPayout {
                        response,
                        attempts: failures.len() + 1,
                        failures,
                    });
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        reference = %request.reference,
                        provider = %code,
                        error = %error,
                        "Payout attempt failed, trying next provider"
                    );
                    failures.push(ProviderFailure {
                        provider: code,
                        error,
                    });
                }
                Err(error) => {
                    warn!(
                        reference = %request.reference,
                        provider = %code,
                        error = %error,
                        "Payout aborted (non-retryable)"
                    );
                    return Err(RouterError::Aborted {
                        provider: code,
                        error,
                    });
                }
            }
        }

        Err(RouterError::AllProvidersFailed { attempts: failures })
    }

    async fn try_payout(
        &self,
        provider: &dyn PayoutProvider,
        request: &PayoutRequest,
    ) -> Result<PayoutResponse, ProviderError> {
        with_timeout(self.call_timeout, provider.validate_recipient(request)).await?;
        with_timeout(self.call_timeout, provider.create_payout(request)).await
    }

    /// Quote from the first provider able to price the request
    pub async fn get_quote(&self, request: &PayoutRequest) -> Result<PayoutQuote, RouterError> {
        let candidates = self
            .registry
            .candidates(&request.country, Some(request.method))
            .await?;

        let mut failures = Vec::new();
        for Candidate { code, provider } in candidates {
            match with_timeout(self.call_timeout, provider.get_quote(request)).await {
                Ok(quote) => return Ok(quote),
                Err(error) if error.is_retryable() => {
                    debug!(provider = %code, error = %error, "Quote failed, trying next provider");
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

    pub async fn get_payout_status(
        &self,
        provider: &ProviderCode,
        provider_reference: &str,
    ) -> Result<PaymentStatus, RouterError> {
        let p = self.registry.get(provider).await?;
        with_timeout(self.call_timeout, p.payout_status(provider_reference))
            .await
            .map_err(|error| RouterError::Aborted {
                provider: provider.clone(),
                error,
            })
    }

    pub async fn cancel_payout(
        &self,
        provider: &ProviderCode,
        provider_reference: &str,
    ) -> Result<(), RouterError> {
        let p = self.registry.get(provider).await?;
        with_timeout(self.call_timeout, p.cancel_payout(provider_reference))
            .await
            .map_err(|error| RouterError::Aborted {
                provider: provider.clone(),
                error,
            })
    }

    /// Union of methods across every provider serving the country
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

    /// Union of bank catalogs; a failing provider is skipped
    pub async fn banks_for_country(&self, country: &CountryCode) -> Result<Vec<Bank>, RouterError> {
        let candidates = self.registry.candidates(country, None).await?;
        let mut seen = BTreeSet::new();
        let mut banks = Vec::new();
        for Candidate { code, provider } in candidates {
            match with_timeout(self.call_timeout, provider.banks(country)).await {
                Ok(list) => banks.extend(list.into_iter().filter(|b| seen.insert(b.code.clone()))),
                Err(e) => warn!(provider = %code, error = %e, "Bank catalog unavailable"),
            }
        }
        Ok(banks)
    }

    /// Union of mobile operator catalogs; a failing provider is skipped
    pub async fn mobile_operators_for_country(
        &self,
        country: &CountryCode,
    ) -> Result<Vec<MobileOperator>, RouterError> {
        let candidates = self.registry.candidates(country, None).await?;
        let mut seen = BTreeSet::new();
        let mut operators = Vec::new();
        for Candidate { code, provider } in candidates {
            match with_timeout(self.call_timeout, provider.mobile_operators(country)).await {
                Ok(list) => {
                    operators.extend(list.into_iter().filter(|o| seen.insert(o.code.clone())))
                }
                Err(e) => warn!(provider = %code, error = %e, "Operator catalog unavailable"),
            }
        }
        Ok(operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Currency, ReferenceId};
    use crate::provider::{Recipient, SandboxProvider};
    use rust_decimal_macros::dec;

    struct Harness {
        router: ZoneRouter,
        a: Arc<SandboxProvider>,
        b: Arc<SandboxProvider>,
        c: Arc<SandboxProvider>,
    }

    async fn harness() -> Harness {
        let router = ZoneRouter::with_priorities(
            Zone::Africa,
            HashMap::from([(
                Zone::Africa,
                vec!["A".into(), "B".into(), "C".into()],
            )]),
            Duration::from_millis(200),
        );
        let mm = [PaymentMethod::MobileMoney, PaymentMethod::BankTransfer];
        let a = Arc::new(SandboxProvider::new("A", &["SN"], &mm));
        let b = Arc::new(SandboxProvider::new("B", &["SN"], &mm));
        let c = Arc::new(SandboxProvider::new("C", &["SN"], &mm));
        router.register(a.clone()).await;
        router.register(b.clone()).await;
        router.register(c.clone()).await;
        Harness { router, a, b, c }
    }

    fn request() -> PayoutRequest {
        PayoutRequest {
            reference: ReferenceId::new("po-1"),
            amount: dec!(20000),
            currency: Currency::new("XOF"),
            country: CountryCode::new("SN"),
            method: PaymentMethod::MobileMoney,
            recipient: Recipient::mobile("Awa", "+221771234567"),
            narration: None,
        }
    }

    #[tokio::test]
    async fn test_failover_to_third_provider() {
        let h = harness().await;
        h.a.set_payout_failure(Some(ProviderError::Unavailable("503".into())));
        h.b.set_payout_failure(Some(ProviderError::Timeout { after_ms: 30_000 }));

        let routed = h.router.create_payout(&request()).await.unwrap();

        assert_eq!(routed.attempts, 3);
        assert_eq!(routed.failures.len(), 2);
        assert_eq!(routed.response.provider, Some(ProviderCode::new("C")));
        assert_eq!(h.c.payout_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_without_failover() {
        let h = harness().await;
        h.a.set_reject_recipient(Some("blacklisted msisdn"));

        let err = h.router.create_payout(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            RouterError::Aborted {
                error: ProviderError::InvalidRecipient(_),
                ..
            }
        ));
        assert_eq!(h.a.payout_count(), 0);
        assert_eq!(h.b.validate_count() + h.b.payout_count(), 0);
        assert_eq!(h.c.validate_count() + h.c.payout_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let h = harness().await;
        h.a.set_payout_failure(Some(ProviderError::Rejected("limit exceeded".into())));

        let err = h.router.create_payout(&request()).await.unwrap_err();

        assert_eq!(err.code(), "PROVIDER_REJECTED");
        assert_eq!(h.b.payout_count(), 0);
    }

    #[tokio::test]
    async fn test_all_providers_failed_carries_each_failure() {
        let h = harness().await;
        for p in [&h.a, &h.b, &h.c] {
            p.set_payout_failure(Some(ProviderError::Maintenance("window".into())));
        }

        let err = h.router.create_payout(&request()).await.unwrap_err();

        match err {
            RouterError::AllProvidersFailed { attempts } => {
                let codes: Vec<&str> = attempts.iter().map(|f| f.provider.as_str()).collect();
                assert_eq!(codes, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_and_fails_over() {
        let h = harness().await;
        h.a.set_latency(Duration::from_secs(5));

        let routed = h.router.create_payout(&request()).await.unwrap();

        assert_eq!(routed.attempts, 2);
        assert!(matches!(
            routed.failures[0].error,
            ProviderError::Timeout { after_ms: 200 }
        ));
        assert_eq!(routed.response.provider, Some(ProviderCode::new("B")));
    }

    #[tokio::test]
    async fn test_unsupported_country_before_any_call() {
        let h = harness().await;
        let mut req = request();
        req.country = CountryCode::new("KE");

        let err = h.router.create_payout(&req).await.unwrap_err();

        assert_eq!(err, RouterError::CountryNotSupported("KE".into()));
        assert_eq!(h.a.validate_count(), 0);
    }

    #[tokio::test]
    async fn test_capability_queries_union_catalogs() {
        let router = ZoneRouter::with_priorities(
            Zone::Africa,
            HashMap::from([(Zone::Africa, vec!["X".into(), "Y".into()])]),
            Duration::from_secs(1),
        );
        let sn = CountryCode::new("SN");
        let x = SandboxProvider::new("X", &["SN"], &[PaymentMethod::MobileMoney]).with_banks(vec![
            Bank {
                code: "CBAO".into(),
                name: "CBAO".into(),
                country: sn.clone(),
            },
        ]);
        let y = SandboxProvider::new("Y", &["SN"], &[PaymentMethod::BankTransfer])
            .with_banks(vec![
                Bank {
                    code: "CBAO".into(),
                    name: "CBAO Groupe Attijariwafa".into(),
                    country: sn.clone(),
                },
                Bank {
                    code: "SGBS".into(),
                    name: "Société Générale Sénégal".into(),
                    country: sn.clone(),
                },
            ])
            .with_operators(vec![MobileOperator {
                code: "ORANGE".into(),
                name: "Orange Money".into(),
                country: sn.clone(),
            }]);
        router.register(Arc::new(x)).await;
        router.register(Arc::new(y)).await;

        let methods = router.available_methods_for_country(&sn).await.unwrap();
        assert_eq!(
            methods,
            vec![PaymentMethod::MobileMoney, PaymentMethod::BankTransfer]
        );

        let banks = router.banks_for_country(&sn).await.unwrap();
        let codes: Vec<&str> = banks.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["CBAO", "SGBS"]);

        let operators = router.mobile_operators_for_country(&sn).await.unwrap();
        assert_eq!(operators.len(), 1);
    }

    #[tokio::test]
    async fn test_status_and_cancel_delegate_by_name() {
        let h = harness().await;
        h.a.set_settled_status(PaymentStatus::Processing);
        let routed = h.router.create_payout(&request()).await.unwrap();
        let provider = routed.response.provider.clone().unwrap();

        let status = h
            .router
            .get_payout_status(&provider, &routed.response.provider_reference)
            .await
            .unwrap();
        assert_eq!(status, PaymentStatus::Processing);

        h.router
            .cancel_payout(&provider, &routed.response.provider_reference)
            .await
            .unwrap();
        assert!(matches!(
            h.router
                .get_payout_status(&"NOPE".into(), "x")
                .await,
            Err(RouterError::ProviderNotFound(_))
        ));
    }
}
