//! Crypto-Rails: fiat to fiat conversion through a USD stablecoin leg

pub mod bridge;
pub mod error;
pub mod rates;

pub use bridge::{
    ConversionFees, ConversionPath, ConversionRequest, ConversionResponse, ConversionStatus,
    CryptoRailsBridge, PoolSnapshot,
};
pub use error::BridgeError;
pub use rates::RateTable;
