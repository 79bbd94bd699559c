//! Provider Value Objects
//!
//! Requests are immutable once built; a request maps to exactly one attempted
//! external transaction per provider tried.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core_types::{CountryCode, Currency, ProviderCode, ReferenceId};

/// External payment status (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" | "success" | "successful" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" | "canceled" => Ok(PaymentStatus::Cancelled),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    BankTransfer,
    Card,
    Ussd,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Ussd => "ussd",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider fee schedule: `percent` of the amount plus a `fixed` part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(default)]
    pub percent: Decimal,
    #[serde(default)]
    pub fixed: Decimal,
}

impl FeeSchedule {
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        amount * self.percent + self.fixed
    }
}

/// Static description of a registered provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub code: ProviderCode,
    pub display_name: String,
    pub countries: BTreeSet<CountryCode>,
    pub methods: BTreeSet<PaymentMethod>,
    pub fees: FeeSchedule,
}

impl ProviderInfo {
    pub fn supports_country(&self, country: &CountryCode) -> bool {
        self.countries.contains(country)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bank {
    pub code: String,
    pub name: String,
    pub country: CountryCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MobileOperator {
    pub code: String,
    pub name: String,
    pub country: CountryCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub account_number: Option<String>,
    pub bank_code: Option<String>,
    pub operator_code: Option<String>,
}

impl Recipient {
    pub fn mobile(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: Some(phone.into()),
            ..Default::default()
        }
    }

    pub fn bank(
        name: impl Into<String>,
        account_number: impl Into<String>,
        bank_code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            account_number: Some(account_number.into()),
            bank_code: Some(bank_code.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub currency: Currency,
    pub country: CountryCode,
    pub method: PaymentMethod,
    pub recipient: Recipient,
    pub narration: Option<String>,
}

impl PayoutRequest {
    /// Same request with a different amount (used after conversion)
    pub fn with_amount(&self, amount: Decimal, currency: Currency) -> Self {
        Self {
            amount,
            currency,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutQuote {
    pub provider: ProviderCode,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub currency: Currency,
    pub estimated_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutResponse {
    /// Stamped by the router with the provider that served the request
    pub provider: Option<ProviderCode>,
    pub provider_reference: String,
    pub reference: ReferenceId,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub currency: Currency,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payer {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub reference: ReferenceId,
    pub amount: Decimal,
    pub currency: Currency,
    pub country: CountryCode,
    pub method: PaymentMethod,
    pub payer: Payer,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub provider: Option<ProviderCode>,
    pub provider_reference: String,
    pub reference: ReferenceId,
    pub status: PaymentStatus,
    pub payment_link: Option<String>,
    pub ussd_code: Option<String>,
    pub fee: Decimal,
    pub net_amount: Decimal,
}
