//! Reverse geocoder — orchestrates the fallback chain.
//!
//! Flow: Cache → Nominatim (online only) → built-in dataset → NotFound

use std::sync::Mutex;

use super::cache::AddressCache;
use super::providers;
use super::types::{Placemark, ResolveError};
use crate::location::Reading;

/// Turns a reading into a street address.
///
/// Calls block; the acquisition session runs them on the blocking pool.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, reading: &Reading) -> Result<Placemark, ResolveError>;
}

/// The default resolver with its fallback pipeline.
pub struct ReverseGeocoder {
    cache: Mutex<AddressCache>,
    offline: bool,
}

impl ReverseGeocoder {
    pub fn new(cache: AddressCache) -> Self {
        Self {
            cache: Mutex::new(cache),
            offline: false,
        }
    }

    /// Skip network lookups.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }
}

impl AddressResolver for ReverseGeocoder {
    fn resolve(&self, reading: &Reading) -> Result<Placemark, ResolveError> {
        let coord = reading.coordinate();

        // 1. Cache
        if let Some(p) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(coord) {
            return Ok(p);
        }

        // 2. Nominatim
        let mut network_error = None;
        if !self.offline {
            match providers::nominatim_reverse(coord) {
                Ok(p) => {
                    self.cache.lock().unwrap_or_else(|e| e.into_inner()).put(coord, &p);
                    return Ok(p);
                }
                Err(e @ ResolveError::Network(_)) => {
                    log::warn!("Nominatim unreachable: {}", e);
                    network_error = Some(e);
                }
                Err(e) => log::debug!("Nominatim: {}", e),
            }
        }

        // 3. Built-in dataset (always available)
        if let Some(p) = providers::builtin_nearest(coord) {
            return Ok(p);
        }

        Err(network_error.unwrap_or_else(|| ResolveError::NotFound(coord.to_string())))
    }
}
