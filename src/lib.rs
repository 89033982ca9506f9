//! MyLocations — capture your current position, turn it into a street
//! address, and keep tagged places for later.
//!
//! The core is [`location::FixFilter`], which decides reading by reading
//! whether a position fix is good enough. [`session`] drives it against a
//! [`location::LocationProvider`] and an [`address::AddressResolver`].

pub mod acquisition;
pub mod address;
pub mod clock;
pub mod config;
pub mod location;
pub mod server;
pub mod session;
pub mod store;

pub use acquisition::{AddressStatus, Snapshot, Status};
pub use config::AcquisitionConfig;
pub use session::{SessionHandle, StartOutcome};
pub use store::{Category, LocationStore, TaggedLocation};
