//! PostgreSQL instance store (`aggregator_instances_tb`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{AggregatorInstance, InstanceError, InstanceStore};
use crate::core_types::{CountryCode, InstanceId, ProviderCode, WalletId};

const COLUMNS: &str = "instance_id, provider, priority, enabled, paused, allowed_countries, \
     hot_wallet_id, daily_limit, monthly_limit, daily_usage, monthly_usage, \
     day_window_start, month_window_start";

/// Rolls expired windows and adds `$2` at time `$3`
const RECORD_USAGE_SQL: &str = "UPDATE aggregator_instances_tb SET
        daily_usage = CASE WHEN $3 - day_window_start >= INTERVAL '24 hours'
                           THEN $2 ELSE daily_usage + $2 END,
        day_window_start = CASE WHEN $3 - day_window_start >= INTERVAL '24 hours'
                                THEN $3 ELSE day_window_start END,
        monthly_usage = CASE WHEN $3 - month_window_start >= INTERVAL '30 days'
                             THEN $2 ELSE monthly_usage + $2 END,
        month_window_start = CASE WHEN $3 - month_window_start >= INTERVAL '30 days'
                                  THEN $3 ELSE month_window_start END
     WHERE instance_id = $1";

pub struct PgInstanceStore {
    pool: PgPool,
}

impl PgInstanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Usage update inside a caller-owned transaction (ledger commits)
    pub(crate) async fn record_usage_in(
        tx: &mut Transaction<'_, Postgres>,
        id: &InstanceId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), InstanceError> {
        let result = sqlx::query(RECORD_USAGE_SQL)
            .bind(id.as_str())
            .bind(amount)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(InstanceError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn set_flag(&self, id: &InstanceId, column: &str, value: bool) -> Result<(), InstanceError> {
        let sql = format!(
            "UPDATE aggregator_instances_tb SET {} = $2 WHERE instance_id = $1",
            column
        );
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(InstanceError::NotFound(id.clone()));
        }
        Ok(())
    }
}

fn from_row(row: &PgRow) -> Result<AggregatorInstance, sqlx::Error> {
    let countries: Vec<String> = row.try_get("allowed_countries")?;
    let priority: i32 = row.try_get("priority")?;
    Ok(AggregatorInstance {
        id: InstanceId::new(row.try_get::<String, _>("instance_id")?),
        provider: ProviderCode::new(row.try_get::<String, _>("provider")?),
        priority: priority.max(0) as u32,
        enabled: row.try_get("enabled")?,
        paused: row.try_get("paused")?,
        allowed_countries: countries.into_iter().map(CountryCode::new).collect(),
        hot_wallet: WalletId::new(row.try_get::<String, _>("hot_wallet_id")?),
        daily_limit: row.try_get("daily_limit")?,
        monthly_limit: row.try_get("monthly_limit")?,
        daily_usage: row.try_get("daily_usage")?,
        monthly_usage: row.try_get("monthly_usage")?,
        day_window_start: row.try_get("day_window_start")?,
        month_window_start: row.try_get("month_window_start")?,
    })
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn upsert(&self, instance: AggregatorInstance) -> Result<(), InstanceError> {
        let countries: Vec<String> = instance
            .allowed_countries
            .iter()
            .map(|c| c.to_string())
            .collect();
        sqlx::query(
            "INSERT INTO aggregator_instances_tb
               (instance_id, provider, priority, enabled, paused, allowed_countries,
                hot_wallet_id, daily_limit, monthly_limit, daily_usage, monthly_usage,
                day_window_start, month_window_start)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (instance_id) DO UPDATE SET
               provider = EXCLUDED.provider,
               priority = EXCLUDED.priority,
               enabled = EXCLUDED.enabled,
               paused = EXCLUDED.paused,
               allowed_countries = EXCLUDED.allowed_countries,
               hot_wallet_id = EXCLUDED.hot_wallet_id,
               daily_limit = EXCLUDED.daily_limit,
               monthly_limit = EXCLUDED.monthly_limit",
        )
        .bind(instance.id.as_str())
        .bind(instance.provider.as_str())
        .bind(instance.priority as i32)
        .bind(instance.enabled)
        .bind(instance.paused)
        .bind(&countries)
        .bind(instance.hot_wallet.as_str())
        .bind(instance.daily_limit)
        .bind(instance.monthly_limit)
        .bind(instance.daily_usage)
        .bind(instance.monthly_usage)
        .bind(instance.day_window_start)
        .bind(instance.month_window_start)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &InstanceId) -> Result<AggregatorInstance, InstanceError> {
        let sql = format!(
            "SELECT {} FROM aggregator_instances_tb WHERE instance_id = $1",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| InstanceError::NotFound(id.clone()))?;
        Ok(from_row(&row)?)
    }

    async fn list_for_provider(
        &self,
        provider: &ProviderCode,
    ) -> Result<Vec<AggregatorInstance>, InstanceError> {
        let sql = format!(
            "SELECT {} FROM aggregator_instances_tb WHERE provider = $1 ORDER BY priority",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(provider.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| from_row(row).map_err(InstanceError::from))
            .collect()
    }

    async fn record_usage(
        &self,
        id: &InstanceId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<AggregatorInstance, InstanceError> {
        let mut tx = self.pool.begin().await?;
        Self::record_usage_in(&mut tx, id, amount, now).await?;
        tx.commit().await?;
        self.get(id).await
    }

    async fn set_enabled(&self, id: &InstanceId, enabled: bool) -> Result<(), InstanceError> {
        self.set_flag(id, "enabled", enabled).await
    }

    async fn set_paused(&self, id: &InstanceId, paused: bool) -> Result<(), InstanceError> {
        self.set_flag(id, "paused", paused).await
    }
}
