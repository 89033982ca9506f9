//! File-based reverse-geocoding cache at ~/.mylocations/geocode-cache.json.
//!
//! TTL: 30 days. Keys are coordinates rounded to 4 decimals (~11 m).

use super::types::{AddressSource, Placemark};
use crate::location::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CACHE_TTL_MS: i64 = 30 * 24 * 3600 * 1000;

#[derive(Serialize, Deserialize, Clone)]
struct CacheEntry {
    placemark: Placemark,
    timestamp: i64,
}

/// The address cache.
pub struct AddressCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl AddressCache {
    /// Load the cache stored in `dir`.
    pub fn load(dir: &Path) -> Self {
        Self::load_from(dir.join("geocode-cache.json"))
    }

    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        Self { path, entries }
    }

    fn read_file(path: &Path) -> Option<HashMap<String, CacheEntry>> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    fn key(coord: Coordinate) -> String {
        format!("{:.4},{:.4}", coord.lat, coord.lon)
    }

    /// Look up an address. Returns None if missing or expired.
    pub fn get(&self, coord: Coordinate) -> Option<Placemark> {
        let entry = self.entries.get(&Self::key(coord))?;

        let now = chrono::Utc::now().timestamp_millis();
        if now - entry.timestamp > CACHE_TTL_MS {
            return None;
        }

        Some(Placemark {
            source: AddressSource::Cache,
            ..entry.placemark.clone()
        })
    }

    /// Store an address and persist to disk.
    pub fn put(&mut self, coord: Coordinate, placemark: &Placemark) {
        let entry = CacheEntry {
            placemark: placemark.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.entries.insert(Self::key(coord), entry);
        self.persist();
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Cannot create {}: {}", parent.display(), e);
                return;
            }
        }
        match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    log::warn!("Cannot write geocode cache {}: {}", self.path.display(), e);
                }
            }
            Err(e) => log::warn!("Cannot serialize geocode cache: {}", e),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
