//! Acquisition tuning and on-disk settings.
//!
//! Settings live at `<data dir>/config.json`. Every field is optional in the
//! file; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Thresholds used by the fix filter and the session deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Stop as soon as a fix is at least this accurate (meters).
    pub desired_accuracy: f64,
    /// Readings older than this are treated as cached and dropped.
    #[serde(with = "secs")]
    pub max_reading_age: Duration,
    /// Give up improving once a stationary fix has not improved for this long.
    #[serde(with = "secs")]
    pub stagnation_window: Duration,
    /// Readings closer than this to the best fix count as stationary (meters).
    pub stationary_radius: f64,
    /// Stop with an error if nothing usable arrived within this time.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            desired_accuracy: 10.0,
            max_reading_age: Duration::from_secs(5),
            stagnation_window: Duration::from_secs(10),
            stationary_radius: 1.0,
            timeout: Duration::from_secs(60),
        }
    }
}

impl AcquisitionConfig {
    /// Load from `path`, falling back to defaults when the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

/// Default data directory (~/.mylocations).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mylocations")
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
