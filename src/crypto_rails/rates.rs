//! Fiat rate tables
//!
//! Two tables: `fiat_to_usd` (USD per unit of fiat) and `usd_to_local`
//! (local units per USD). The target leg never guesses; the source leg may
//! degrade to par when `assume_par_for_unknown_source` is set.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

use super::error::BridgeError;
use crate::config::CryptoRailsConfig;
use crate::core_types::Currency;

#[derive(Debug, Clone, Default)]
pub struct RateTable {
    fiat_to_usd: HashMap<Currency, Decimal>,
    usd_to_local: HashMap<Currency, Decimal>,
    assume_par_for_unknown_source: bool,
}

impl RateTable {
    pub fn new(assume_par_for_unknown_source: bool) -> Self {
        Self {
            assume_par_for_unknown_source,
            ..Default::default()
        }
    }

    pub fn from_config(config: &CryptoRailsConfig) -> Self {
        Self {
            fiat_to_usd: config.fiat_to_usd.clone().into_iter().collect(),
            usd_to_local: config.usd_to_local.clone().into_iter().collect(),
            assume_par_for_unknown_source: config.assume_par_for_unknown_source,
        }
    }

    pub fn with_fiat_rate(mut self, currency: &str, usd_per_unit: Decimal) -> Self {
        self.set_fiat_rate(Currency::new(currency), usd_per_unit);
        self
    }

    pub fn with_local_rate(mut self, currency: &str, units_per_usd: Decimal) -> Self {
        self.set_local_rate(Currency::new(currency), units_per_usd);
        self
    }

    pub fn set_fiat_rate(&mut self, currency: Currency, usd_per_unit: Decimal) {
        self.fiat_to_usd.insert(currency, usd_per_unit);
    }

    pub fn set_local_rate(&mut self, currency: Currency, units_per_usd: Decimal) {
        self.usd_to_local.insert(currency, units_per_usd);
    }

    /// USD per unit of `currency`
    pub fn source_rate(&self, currency: &Currency) -> Result<Decimal, BridgeError> {
        match self.fiat_to_usd.get(currency) {
            Some(rate) => Ok(*rate),
            None if self.assume_par_for_unknown_source => {
                warn!(currency = %currency, "No USD rate for source currency, assuming par");
                Ok(Decimal::ONE)
            }
            None => Err(BridgeError::RateUnavailable(currency.clone())),
        }
    }

    /// Units of `currency` per USD
    ///
    /// Falls back to the inverse of the fiat table when the local table has
    /// no entry.
    pub fn target_rate(&self, currency: &Currency) -> Result<Decimal, BridgeError> {
        if let Some(rate) = self.usd_to_local.get(currency) {
            return Ok(*rate);
        }
        match self.fiat_to_usd.get(currency) {
            Some(usd_per_unit) if !usd_per_unit.is_zero() => Ok(Decimal::ONE / *usd_per_unit),
            _ => Err(BridgeError::RateUnavailable(currency.clone())),
        }
    }

    pub fn to_usd(&self, amount: Decimal, currency: &Currency) -> Result<Decimal, BridgeError> {
        amount
            .checked_mul(self.source_rate(currency)?)
            .ok_or(BridgeError::InvalidAmount(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table(assume_par: bool) -> RateTable {
        RateTable::new(assume_par)
            .with_fiat_rate("EUR", dec!(1.25))
            .with_fiat_rate("GBP", dec!(1.25))
            .with_local_rate("EUR", dec!(0.8))
    }

    #[test]
    fn test_target_prefers_local_table() {
        assert_eq!(table(true).target_rate(&"EUR".into()).unwrap(), dec!(0.8));
    }

    #[test]
    fn test_target_falls_back_to_inverse_fiat_rate() {
        assert_eq!(table(true).target_rate(&"GBP".into()).unwrap(), dec!(0.8));
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        assert_eq!(
            table(true).target_rate(&"ZZZ".into()),
            Err(BridgeError::RateUnavailable("ZZZ".into()))
        );
    }

    #[test]
    fn test_unknown_source_par_policy() {
        assert_eq!(table(true).source_rate(&"ZZZ".into()).unwrap(), Decimal::ONE);
        assert!(table(false).source_rate(&"ZZZ".into()).is_err());
    }

    #[test]
    fn test_to_usd() {
        assert_eq!(table(true).to_usd(dec!(100), &"EUR".into()).unwrap(), dec!(125));
    }

    #[test]
    fn test_to_usd_overflow_is_invalid_amount() {
        assert_eq!(
            table(true).to_usd(Decimal::MAX, &"EUR".into()),
            Err(BridgeError::InvalidAmount(Decimal::MAX))
        );
    }
}
