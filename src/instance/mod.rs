//! Aggregator Instances
//!
//! An aggregator instance is one credential/wallet-bound configuration of a
//! provider. Instances carry rolling daily/monthly usage counters and are
//! never deleted, only disabled.

pub mod pg;
pub mod selector;
pub mod store;

pub use pg::PgInstanceStore;
pub use selector::InstanceSelector;
pub use store::{InstanceStore, MemoryInstanceStore};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::core_types::{CountryCode, InstanceId, ProviderCode, WalletId};

pub const DAY_WINDOW_HOURS: i64 = 24;
pub const MONTH_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorInstance {
    pub id: InstanceId,
    pub provider: ProviderCode,
    /// Lower wins
    pub priority: u32,
    pub enabled: bool,
    pub paused: bool,
    /// Empty means every country the provider serves
    pub allowed_countries: BTreeSet<CountryCode>,
    pub hot_wallet: WalletId,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub daily_usage: Decimal,
    pub monthly_usage: Decimal,
    pub day_window_start: DateTime<Utc>,
    pub month_window_start: DateTime<Utc>,
}

impl AggregatorInstance {
    pub fn new(
        id: impl Into<InstanceId>,
        provider: impl Into<ProviderCode>,
        hot_wallet: impl Into<WalletId>,
        priority: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            provider: provider.into(),
            priority,
            enabled: true,
            paused: false,
            allowed_countries: BTreeSet::new(),
            hot_wallet: hot_wallet.into(),
            daily_limit: None,
            monthly_limit: None,
            daily_usage: Decimal::ZERO,
            monthly_usage: Decimal::ZERO,
            day_window_start: now,
            month_window_start: now,
        }
    }

    pub fn with_limits(mut self, daily: Option<Decimal>, monthly: Option<Decimal>) -> Self {
        self.daily_limit = daily;
        self.monthly_limit = monthly;
        self
    }

    pub fn with_allowed_countries(mut self, countries: &[&str]) -> Self {
        self.allowed_countries = countries.iter().map(|c| CountryCode::new(c)).collect();
        self
    }

    /// Reset counters whose window has elapsed at `now`
    pub fn roll_windows(&mut self, now: DateTime<Utc>) {
        if now - self.day_window_start >= Duration::hours(DAY_WINDOW_HOURS) {
            self.daily_usage = Decimal::ZERO;
            self.day_window_start = now;
        }
        if now - self.month_window_start >= Duration::days(MONTH_WINDOW_DAYS) {
            self.monthly_usage = Decimal::ZERO;
            self.month_window_start = now;
        }
    }

    /// Add settled volume, rolling windows first
    pub fn record_usage(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.roll_windows(now);
        self.daily_usage += amount;
        self.monthly_usage += amount;
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.paused
    }

    pub fn serves(&self, country: &CountryCode) -> bool {
        self.allowed_countries.is_empty() || self.allowed_countries.contains(country)
    }

    /// Whether `amount` more volume fits the limits (windows must be rolled)
    pub fn has_headroom(&self, amount: Decimal) -> bool {
        self.daily_limit.is_none_or(|l| self.daily_usage + amount <= l)
            && self.monthly_limit.is_none_or(|l| self.monthly_usage + amount <= l)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstanceError {
    #[error("Aggregator instance not found: {0}")]
    NotFound(InstanceId),

    #[error("No eligible instance of {provider} for {country}")]
    NoEligibleInstance {
        provider: ProviderCode,
        country: CountryCode,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl InstanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "INSTANCE_NOT_FOUND",
            Self::NoEligibleInstance { .. } => "NO_ELIGIBLE_INSTANCE",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for InstanceError {
    fn from(e: sqlx::Error) -> Self {
        InstanceError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_daily_window_rolls_after_24h() {
        let mut instance = AggregatorInstance::new("i-1", "WAVE", "hot-1", 1);
        let start = instance.day_window_start;
        instance.record_usage(dec!(100), start);

        instance.roll_windows(start + Duration::hours(23));
        assert_eq!(instance.daily_usage, dec!(100));

        instance.roll_windows(start + Duration::hours(24));
        assert_eq!(instance.daily_usage, Decimal::ZERO);
        assert_eq!(instance.monthly_usage, dec!(100));
    }

    #[test]
    fn test_monthly_window_rolls_after_30_days() {
        let mut instance = AggregatorInstance::new("i-1", "WAVE", "hot-1", 1);
        let start = instance.month_window_start;
        instance.record_usage(dec!(100), start);
        instance.record_usage(dec!(50), start + Duration::days(30));
        assert_eq!(instance.monthly_usage, dec!(50));
    }

    #[test]
    fn test_headroom_and_country_filter() {
        let instance = AggregatorInstance::new("i-1", "WAVE", "hot-1", 1)
            .with_limits(Some(dec!(1000)), None)
            .with_allowed_countries(&["SN"]);
        assert!(instance.has_headroom(dec!(1000)));
        assert!(!instance.has_headroom(dec!(1000.01)));
        assert!(instance.serves(&"SN".into()));
        assert!(!instance.serves(&"CI".into()));
    }
}
