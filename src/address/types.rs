//! Core types for reverse geocoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a placemark came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Cache,
    Nominatim,
    Builtin,
}

/// A structured street address. Every component is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placemark {
    /// House number.
    #[serde(default)]
    pub sub_thoroughfare: Option<String>,
    /// Street name.
    #[serde(default)]
    pub thoroughfare: Option<String>,
    /// City, town or village.
    #[serde(default)]
    pub locality: Option<String>,
    /// State or province.
    #[serde(default)]
    pub administrative_area: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2, upper case.
    #[serde(default)]
    pub country_code: Option<String>,
    pub source: AddressSource,
}

impl Placemark {
    pub fn empty(source: AddressSource) -> Self {
        Self {
            sub_thoroughfare: None,
            thoroughfare: None,
            locality: None,
            administrative_area: None,
            postal_code: None,
            country: None,
            country_code: None,
            source,
        }
    }

    /// True when no address component is present.
    pub fn is_empty(&self) -> bool {
        self.sub_thoroughfare.is_none()
            && self.thoroughfare.is_none()
            && self.locality.is_none()
            && self.administrative_area.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }
}

/// Reverse geocoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("network error: {0}")]
    Network(String),
    #[error("no address found near {0}")]
    NotFound(String),
    #[error("invalid geocoder response: {0}")]
    InvalidResponse(String),
    #[error("lookup interrupted: {0}")]
    Interrupted(String),
}
