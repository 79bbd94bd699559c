//! Money Module
//!
//! All amounts are `rust_decimal::Decimal`. This module owns the currency
//! precision table and the rounding helpers every other module goes through.
//!
//! ## Design Principles
//! 1. Rounding happens once, at the edge of a computation, to the currency's
//!    minor unit
//! 2. Fees are computed from basis rates (`0.005` = 0.5%), never from floats

use rust_decimal::{Decimal, RoundingStrategy};

use crate::core_types::Currency;

// ============================================================================
// Currency precision
// ============================================================================

/// Currencies with no minor unit in practice
const ZERO_DECIMAL: &[&str] = &[
    "XOF", "XAF", "GNF", "RWF", "UGX", "JPY", "KRW", "VND", "CLP", "PYG", "KMF", "BIF", "DJF",
];

/// Minor-unit precision for a currency
pub fn currency_decimals(currency: &Currency) -> u32 {
    match currency.as_str() {
        c if ZERO_DECIMAL.contains(&c) => 0,
        "USDC" | "USDT" => 6,
        _ => 2,
    }
}

/// Round to the currency's minor unit (banker's rounding is avoided: money
/// rounds half away from zero)
pub fn round_for(amount: Decimal, currency: &Currency) -> Decimal {
    amount.round_dp_with_strategy(
        currency_decimals(currency),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Fee for `amount` at `rate` (e.g. `0.001` for 0.1%)
pub fn fee_at(amount: Decimal, rate: Decimal) -> Decimal {
    amount * rate
}
