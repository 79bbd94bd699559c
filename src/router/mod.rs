//! Zone / Country Router
//!
//! Maps destination countries to zones, keeps a priority-ordered provider
//! list per zone and selects/fails over between competing rails.

pub mod collection;
pub mod error;
pub mod payout;
pub mod registry;
pub mod zone;

pub use collection::CollectionRouter;
pub use error::{ProviderFailure, RouterError};
pub use payout::{RoutedPayout, ZoneRouter};
pub use zone::Zone;
