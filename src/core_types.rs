//! Core types used throughout the system
//!
//! Identifiers and codes shared by every module. Codes are normalised
//! (upper-cased, trimmed) on construction so lookups never depend on the
//! caller's casing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User ID - opaque platform user identifier.
pub type UserId = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

macro_rules! code_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(value.as_ref().trim().to_ascii_uppercase())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_id!(
    /// Wallet identifier (user wallet, hot wallet, cold wallet or holding wallet)
    WalletId
);

string_id!(
    /// Caller-supplied idempotency reference
    ///
    /// Compensation entries reuse the original reference with a suffix so the
    /// whole history of a movement can be traced from one value.
    ReferenceId
);

string_id!(
    /// Aggregator instance identifier
    InstanceId
);

impl ReferenceId {
    /// Reference used for the compensating refund of this movement
    pub fn refund(&self) -> Self {
        Self(format!("{}_refund", self.0))
    }

    /// Reference used when converted value is parked after a failed payout
    pub fn reversal(&self) -> Self {
        Self(format!("{}_reversal", self.0))
    }

    /// Reference used for the external payout leg of a settled transfer
    pub fn payout(&self) -> Self {
        Self(format!("{}_payout", self.0))
    }

    /// Reference used for auto-recharge movements
    pub fn recharge(&self) -> Self {
        Self(format!("{}_recharge", self.0))
    }
}

code_id!(
    /// Provider code, e.g. `FLUTTERWAVE`, `WAVE`
    ProviderCode
);

code_id!(
    /// ISO 3166-1 alpha-2 country code
    CountryCode
);

code_id!(
    /// ISO 4217 currency code (or stablecoin ticker)
    Currency
);

impl Currency {
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn usdc() -> Self {
        Self::new("USDC")
    }
}

/// Internal transfer ID - ULID based
///
/// Monotonic and sortable, generated without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalTransferId(ulid::Ulid);

impl InternalTransferId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for InternalTransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InternalTransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InternalTransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for InternalTransferId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InternalTransferId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
