use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AggregatorInstance, InstanceError};
use crate::core_types::{InstanceId, ProviderCode};

/// Persistence for aggregator instances
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn upsert(&self, instance: AggregatorInstance) -> Result<(), InstanceError>;

    async fn get(&self, id: &InstanceId) -> Result<AggregatorInstance, InstanceError>;

    async fn list_for_provider(
        &self,
        provider: &ProviderCode,
    ) -> Result<Vec<AggregatorInstance>, InstanceError>;

    /// Add settled volume to the rolling counters
    async fn record_usage(
        &self,
        id: &InstanceId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AggregatorInstance, InstanceError>;

    async fn set_enabled(&self, id: &InstanceId, enabled: bool) -> Result<(), InstanceError>;

    async fn set_paused(&self, id: &InstanceId, paused: bool) -> Result<(), InstanceError>;
}

#[derive(Default)]
pub struct MemoryInstanceStore {
    instances: RwLock<HashMap<InstanceId, AggregatorInstance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: &InstanceId, f: F) -> Result<AggregatorInstance, InstanceError>
    where
        F: FnOnce(&mut AggregatorInstance) + Send,
    {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| InstanceError::NotFound(id.clone()))?;
        f(instance);
        Ok(instance.clone())
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn upsert(&self, instance: AggregatorInstance) -> Result<(), InstanceError> {
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn get(&self, id: &InstanceId) -> Result<AggregatorInstance, InstanceError> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| InstanceError::NotFound(id.clone()))
    }

    async fn list_for_provider(
        &self,
        provider: &ProviderCode,
    ) -> Result<Vec<AggregatorInstance>, InstanceError> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|i| i.provider == *provider)
            .cloned()
            .collect())
    }

    async fn record_usage(
        &self,
        id: &InstanceId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AggregatorInstance, InstanceError> {
        self.update(id, |i| i.record_usage(amount, now)).await
    }

    async fn set_enabled(&self, id: &InstanceId, enabled: bool) -> Result<(), InstanceError> {
        self.update(id, |i| i.enabled = enabled).await.map(|_| ())
    }

    async fn set_paused(&self, id: &InstanceId, paused: bool) -> Result<(), InstanceError> {
        self.update(id, |i| i.paused = paused).await.map(|_| ())
    }
}
