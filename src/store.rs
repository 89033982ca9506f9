//! Tagged locations, persisted at ~/.mylocations/locations.json.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::address::Placemark;
use crate::location::Coordinate;

/// What kind of place a tagged location is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    #[serde(rename = "No Category")]
    NoCategory,
    #[serde(rename = "Apple Store")]
    AppleStore,
    Bar,
    Bookstore,
    Club,
    #[serde(rename = "Grocery Store")]
    GroceryStore,
    #[serde(rename = "Historic Building")]
    HistoricBuilding,
    House,
    #[serde(rename = "Icecream Vendor")]
    IcecreamVendor,
    Landmark,
    Park,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::NoCategory,
        Self::AppleStore,
        Self::Bar,
        Self::Bookstore,
        Self::Club,
        Self::GroceryStore,
        Self::HistoricBuilding,
        Self::House,
        Self::IcecreamVendor,
        Self::Landmark,
        Self::Park,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoCategory => "No Category",
            Self::AppleStore => "Apple Store",
            Self::Bar => "Bar",
            Self::Bookstore => "Bookstore",
            Self::Club => "Club",
            Self::GroceryStore => "Grocery Store",
            Self::HistoricBuilding => "Historic Building",
            Self::House => "House",
            Self::IcecreamVendor => "Icecream Vendor",
            Self::Landmark => "Landmark",
            Self::Park => "Park",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = StoreError;

    /// Case-insensitive; spaces, dashes and underscores are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = |v: &str| {
            v.chars()
                .filter(|c| !matches!(c, ' ' | '-' | '_'))
                .collect::<String>()
                .to_lowercase()
        };
        let wanted = norm(s);
        Self::ALL
            .iter()
            .copied()
            .find(|c| norm(c.name()) == wanted)
            .ok_or_else(|| StoreError::UnknownCategory(s.to_string()))
    }
}

/// A location saved by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedLocation {
    pub id: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub placemark: Option<Placemark>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
}

/// Input for [`LocationStore::tag`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub coordinate: Coordinate,
    pub placemark: Option<Placemark>,
    pub category: Category,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("invalid coordinates {0}")]
    InvalidCoordinate(Coordinate),
    #[error("no tagged location with id {0}")]
    NotFound(u64),
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt location file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The tagged-location store.
pub struct LocationStore {
    path: PathBuf,
    locations: Vec<TaggedLocation>,
}

impl LocationStore {
    /// Open the store in `dir`. A missing file is an empty store.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Self::open_file(dir.join("locations.json"))
    }

    pub fn open_file(path: PathBuf) -> Result<Self, StoreError> {
        let locations = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self { path, locations })
    }

    /// Save a new location and persist. Returns the stored record.
    pub fn tag(&mut self, new: NewLocation) -> Result<TaggedLocation, StoreError> {
        if !new.coordinate.is_valid() {
            return Err(StoreError::InvalidCoordinate(new.coordinate));
        }
        let id = self.locations.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        let location = TaggedLocation {
            id,
            latitude: new.coordinate.lat,
            longitude: new.coordinate.lon,
            placemark: new.placemark,
            category: new.category,
            description: new.description.trim().to_string(),
            date: Utc::now(),
        };
        self.locations.push(location.clone());
        self.persist()?;
        log::info!("Tagged location {} ({})", id, location.category);
        Ok(location)
    }

    /// All locations, oldest first.
    pub fn list(&self) -> &[TaggedLocation] {
        &self.locations
    }

    pub fn get(&self, id: u64) -> Option<&TaggedLocation> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn remove(&mut self, id: u64) -> Result<TaggedLocation, StoreError> {
        let idx = self
            .locations
            .iter()
            .position(|l| l.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let removed = self.locations.remove(idx);
        self.persist()?;
        Ok(removed)
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.locations).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
