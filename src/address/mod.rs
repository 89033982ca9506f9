//! Reverse geocoding: coordinates to a structured street address.
//!
//! Provides a file-backed cache, Nominatim lookups and a built-in
//! nearest-city fallback for offline use.

pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cache::AddressCache;
pub use resolver::{AddressResolver, ReverseGeocoder};
pub use types::{AddressSource, Placemark, ResolveError};
