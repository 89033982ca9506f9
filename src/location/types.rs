//! Core types for the acquisition subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single position sample reported by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters. Lower is better, negative is invalid.
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.latitude,
            lon: self.longitude,
        }
    }
}

/// A bare latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8}, {:.8}", self.lat, self.lon)
    }
}

/// Whether the user allowed this application to use location services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

/// Errors reported while acquiring a position.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AcquisitionError {
    /// The provider could not get a fix right now; another reading may follow shortly.
    #[error("location currently unknown")]
    LocationUnknown,
    #[error("location services denied for this application")]
    Denied,
    #[error("location services are disabled")]
    ServicesDisabled,
    #[error("no location obtained before the deadline")]
    TimedOut,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("provider stopped before a location was found")]
    Exhausted,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("acquisition session is closed")]
    SessionClosed,
}

impl AcquisitionError {
    /// Transient errors are swallowed instead of being recorded.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LocationUnknown)
    }

    /// Errors meaning the user has to change a system setting before trying again.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Denied | Self::ServicesDisabled)
    }
}

/// Something a provider delivers to the acquisition session.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Reading(Reading),
    Error(AcquisitionError),
}
