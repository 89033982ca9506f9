//! Position acquisition: readings, providers and the fix-quality filter.

pub mod filter;
pub mod geo;
pub mod providers;
pub mod types;

pub use filter::{Decision, FixFilter, Rejection};
pub use geo::distance_m;
pub use providers::{EventSink, IpProvider, LocationProvider, ReplayProvider, TrackPoint};
pub use types::{AcquisitionError, AuthorizationStatus, Coordinate, ProviderEvent, Reading};
