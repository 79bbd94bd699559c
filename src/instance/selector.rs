//! Instance selection
//!
//! Picks the instance of a provider that should carry a movement: enabled
//! and unpaused, allowed for the country, hot wallet able to cover the
//! amount, inside its daily/monthly limits. Lowest priority number wins;
//! ties go to the instance with less daily usage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{AggregatorInstance, InstanceError, InstanceStore};
use crate::core_types::{CountryCode, InstanceId, ProviderCode};
use crate::ledger::LedgerStore;

pub struct InstanceSelector {
    instances: Arc<dyn InstanceStore>,
    balances: Arc<dyn LedgerStore>,
}

impl InstanceSelector {
    pub fn new(instances: Arc<dyn InstanceStore>, balances: Arc<dyn LedgerStore>) -> Self {
        Self {
            instances,
            balances,
        }
    }

    pub async fn select(
        &self,
        provider: &ProviderCode,
        country: &CountryCode,
        amount: Decimal,
    ) -> Result<AggregatorInstance, InstanceError> {
        self.select_at(provider, country, amount, Utc::now()).await
    }

    pub async fn select_at(
        &self,
        provider: &ProviderCode,
        country: &CountryCode,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AggregatorInstance, InstanceError> {
        let mut eligible = Vec::new();
        for mut instance in self.instances.list_for_provider(provider).await? {
            instance.roll_windows(now);
            if !instance.is_active() || !instance.serves(country) || !instance.has_headroom(amount)
            {
                continue;
            }
            match self.balances.balance(&instance.hot_wallet).await {
                Ok(balance) if balance >= amount => eligible.push(instance),
                Ok(balance) => {
                    debug!(instance = %instance.id, balance = %balance, amount = %amount, "Hot wallet cannot cover amount");
                }
                Err(e) => {
                    warn!(instance = %instance.id, error = %e, "Hot wallet balance unavailable");
                }
            }
        }

        eligible.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.daily_usage.cmp(&b.daily_usage))
        });

        eligible
            .into_iter()
            .next()
            .ok_or_else(|| InstanceError::NoEligibleInstance {
                provider: provider.clone(),
                country: country.clone(),
            })
    }

    /// Take an instance out of rotation permanently
    pub async fn disable(&self, id: &InstanceId) -> Result<(), InstanceError> {
        self.instances.set_enabled(id, false).await?;
        info!(instance = %id, "Aggregator instance disabled");
        Ok(())
    }

    pub async fn pause(&self, id: &InstanceId, paused: bool) -> Result<(), InstanceError> {
        self.instances.set_paused(id, paused).await?;
        info!(instance = %id, paused, "Aggregator instance pause toggled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Currency, WalletId};
    use crate::instance::MemoryInstanceStore;
    use crate::ledger::MemoryLedgerStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Harness {
        selector: InstanceSelector,
        instances: Arc<MemoryInstanceStore>,
    }

    async fn harness(instances: Vec<(AggregatorInstance, Decimal)>) -> Harness {
        let store = Arc::new(MemoryInstanceStore::new());
        let ledger = Arc::new(MemoryLedgerStore::new());
        for (instance, balance) in instances {
            ledger
                .open_account(&instance.hot_wallet, &Currency::new("XOF"), balance)
                .await
                .unwrap();
            store.upsert(instance).await.unwrap();
        }
        Harness {
            selector: InstanceSelector::new(store.clone(), ledger),
            instances: store,
        }
    }

    fn wave() -> ProviderCode {
        ProviderCode::new("WAVE")
    }

    #[tokio::test]
    async fn test_lowest_priority_wins() {
        let h = harness(vec![
            (AggregatorInstance::new("wave-2", "WAVE", "hot-2", 2), dec!(100000)),
            (AggregatorInstance::new("wave-1", "WAVE", "hot-1", 1), dec!(100000)),
        ])
        .await;

        let chosen = h.selector.select(&wave(), &"SN".into(), dec!(5000)).await.unwrap();
        assert_eq!(chosen.id, InstanceId::new("wave-1"));
    }

    #[tokio::test]
    async fn test_tie_broken_by_daily_usage() {
        let h = harness(vec![
            (AggregatorInstance::new("wave-a", "WAVE", "hot-a", 1), dec!(100000)),
            (AggregatorInstance::new("wave-b", "WAVE", "hot-b", 1), dec!(100000)),
        ])
        .await;
        h.instances
            .record_usage(&"wave-a".into(), dec!(9000), Utc::now())
            .await
            .unwrap();

        let chosen = h.selector.select(&wave(), &"SN".into(), dec!(100)).await.unwrap();
        assert_eq!(chosen.id, InstanceId::new("wave-b"));
    }

    #[tokio::test]
    async fn test_filters_disabled_country_balance_and_limits() {
        let h = harness(vec![
            (AggregatorInstance::new("disabled", "WAVE", "hot-1", 0), dec!(100000)),
            (
                AggregatorInstance::new("ci-only", "WAVE", "hot-2", 1).with_allowed_countries(&["CI"]),
                dec!(100000),
            ),
            (AggregatorInstance::new("poor", "WAVE", "hot-3", 2), dec!(10)),
            (
                AggregatorInstance::new("capped", "WAVE", "hot-4", 3).with_limits(Some(dec!(100)), None),
                dec!(100000),
            ),
            (AggregatorInstance::new("ok", "WAVE", "hot-5", 9), dec!(100000)),
        ])
        .await;
        h.selector.disable(&"disabled".into()).await.unwrap();

        let chosen = h.selector.select(&wave(), &"SN".into(), dec!(500)).await.unwrap();
        assert_eq!(chosen.id, InstanceId::new("ok"));

        h.selector.pause(&"ok".into(), true).await.unwrap();
        assert!(matches!(
            h.selector.select(&wave(), &"SN".into(), dec!(500)).await,
            Err(InstanceError::NoEligibleInstance { .. })
        ));
    }

    #[tokio::test]
    async fn test_exhausted_limit_recovers_after_window() {
        let h = harness(vec![(
            AggregatorInstance::new("wave-1", "WAVE", "hot-1", 1).with_limits(Some(dec!(1000)), None),
            dec!(100000),
        )])
        .await;
        let now = Utc::now();
        h.instances
            .record_usage(&"wave-1".into(), dec!(1000), now)
            .await
            .unwrap();

        assert!(h.selector.select_at(&wave(), &"SN".into(), dec!(1), now).await.is_err());
        assert!(
            h.selector
                .select_at(&wave(), &"SN".into(), dec!(1), now + Duration::hours(25))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_unknown_hot_wallet_is_skipped() {
        let store = Arc::new(MemoryInstanceStore::new());
        store
            .upsert(AggregatorInstance::new("wave-1", "WAVE", WalletId::new("missing"), 1))
            .await
            .unwrap();
        let selector = InstanceSelector::new(store, Arc::new(MemoryLedgerStore::new()));
        assert!(selector.select(&wave(), &"SN".into(), dec!(1)).await.is_err());
    }
}
