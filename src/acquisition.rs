//! Acquisition state for one "get my location" run.
//!
//! `Acquisition` is a plain state machine: every input (reading, provider
//! error, deadline, resolver completion) mutates it sequentially and returns
//! an [`Intent`] telling the caller what to do with the provider and the
//! resolver. The async plumbing lives in [`crate::session`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::address::{Placemark, ResolveError};
use crate::config::AcquisitionConfig;
use crate::location::{AcquisitionError, FixFilter, Reading};

/// What the session driver must do after feeding an input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intent {
    /// Detach from the provider and clear the deadline.
    pub stop: bool,
    /// Start a reverse-geocoding request.
    pub resolve: Option<Lookup>,
}

/// One reverse-geocoding request. Ids increase across sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup {
    pub id: u64,
    pub reading: Reading,
}

/// Coarse location state for front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Searching,
    Located,
    ServicesDisabled,
    Failed,
}

/// Address state, only meaningful once a location exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    Found,
    Searching,
    Error,
    NotFound,
}

/// Everything a front end needs to render the current location screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub session: u64,
    pub status: Status,
    pub updating: bool,
    pub location: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_status: Option<AddressStatus>,
    pub placemark: Option<Placemark>,
    pub resolving: bool,
    /// Lookups still running, including ones from earlier sessions.
    pub pending_lookups: usize,
    pub location_error: Option<AcquisitionError>,
    pub resolve_error: Option<ResolveError>,
}

pub struct Acquisition {
    filter: FixFilter,
    session: u64,
    updating: bool,
    location: Option<Reading>,
    placemark: Option<Placemark>,
    resolving: bool,
    location_error: Option<AcquisitionError>,
    resolve_error: Option<ResolveError>,
    next_lookup: u64,
    /// First lookup id issued by the current session.
    session_floor: u64,
    /// Id of the lookup whose result is shown.
    applied: u64,
    /// Reading of the last lookup this session issued.
    requested: Option<Reading>,
    pending: usize,
}

impl Acquisition {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            filter: FixFilter::new(config),
            session: 0,
            updating: false,
            location: None,
            placemark: None,
            resolving: false,
            location_error: None,
            resolve_error: None,
            next_lookup: 1,
            session_floor: 1,
            applied: 0,
            requested: None,
            pending: 0,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn location(&self) -> Option<&Reading> {
        self.location.as_ref()
    }

    pub fn placemark(&self) -> Option<&Placemark> {
        self.placemark.as_ref()
    }

    /// Start a new session, discarding the previous result.
    ///
    /// A lookup still running from the previous session keeps `resolving`
    /// set, so the new session waits for it before issuing its own.
    pub fn begin(&mut self) {
        self.session += 1;
        self.filter.reset();
        self.updating = true;
        self.location = None;
        self.placemark = None;
        self.location_error = None;
        self.resolve_error = None;
        self.session_floor = self.next_lookup;
        self.requested = None;
    }

    fn lookup(&mut self, reading: Reading) -> Lookup {
        let id = self.next_lookup;
        self.next_lookup += 1;
        self.pending += 1;
        self.resolving = true;
        self.requested = Some(reading);
        Lookup { id, reading }
    }

    /// End the session. Returns false if it was not running.
    ///
    /// The last location and address stay available until the next `begin`.
    pub fn halt(&mut self) -> bool {
        if !self.updating {
            return false;
        }
        self.updating = false;
        self.filter.reset();
        true
    }

    /// Record why a session could not be started.
    pub fn refuse(&mut self, err: AcquisitionError) {
        self.halt();
        self.location_error = Some(err);
    }

    pub fn on_reading(&mut self, reading: Reading, now: DateTime<Utc>) -> Intent {
        if !self.updating {
            return Intent::default();
        }

        let decision = self.filter.consider(&reading, now, self.resolving);
        if let Some(rejection) = decision.rejection {
            log::debug!("Dropped reading ({:?}): {:?}", rejection, reading);
            return Intent::default();
        }

        self.location_error = None;
        if decision.accept {
            self.location = Some(reading);
        }

        let mut intent = Intent::default();
        if decision.resolve {
            log::debug!("Going to resolve {}", reading.coordinate());
            intent.resolve = Some(self.lookup(reading));
        }
        if decision.stop {
            intent.stop = self.halt();
        }
        intent
    }

    pub fn on_error(&mut self, err: AcquisitionError) -> Intent {
        if !self.updating || err.is_transient() {
            return Intent::default();
        }
        log::info!("Location error: {}", err);
        self.location_error = Some(err);
        Intent {
            stop: self.halt(),
            resolve: None,
        }
    }

    /// The session deadline expired. Only acts if nothing usable arrived yet.
    pub fn on_timeout(&mut self) -> Intent {
        if !self.updating || self.location.is_some() {
            return Intent::default();
        }
        log::debug!("Time out");
        self.location_error = Some(AcquisitionError::TimedOut);
        Intent {
            stop: self.halt(),
            resolve: None,
        }
    }

    /// The provider closed its stream.
    pub fn on_provider_finished(&mut self) -> Intent {
        if !self.updating {
            return Intent::default();
        }
        if self.location.is_none() {
            self.location_error = Some(AcquisitionError::Exhausted);
        }
        Intent {
            stop: self.halt(),
            resolve: None,
        }
    }

    /// A reverse-geocoding request finished.
    ///
    /// Results of earlier sessions, and results older than the one already
    /// shown, are dropped. If a dropped lookup was holding back the current
    /// fix, that fix is resolved now.
    pub fn on_resolved(&mut self, id: u64, result: Result<Placemark, ResolveError>) -> Intent {
        self.pending = self.pending.saturating_sub(1);
        self.resolving = false;

        if id < self.session_floor {
            log::debug!("Dropping address of lookup {} from an earlier session", id);
            let mut intent = Intent::default();
            if let Some(reading) = self.location {
                if self.pending == 0 && self.requested != Some(reading) {
                    intent.resolve = Some(self.lookup(reading));
                }
            }
            return intent;
        }
        if id < self.applied {
            log::debug!("Dropping address of lookup {}, superseded by {}", id, self.applied);
            return Intent::default();
        }
        self.applied = id;

        match result {
            Ok(p) => {
                self.placemark = Some(p);
                self.resolve_error = None;
            }
            Err(e) => {
                log::info!("Address lookup failed: {}", e);
                self.placemark = None;
                self.resolve_error = Some(e);
            }
        }
        Intent::default()
    }

    fn status(&self) -> Status {
        if self.location.is_some() {
            return Status::Located;
        }
        match &self.location_error {
            Some(e) if e.is_authorization() => Status::ServicesDisabled,
            Some(_) => Status::Failed,
            None if self.updating => Status::Searching,
            None => Status::Idle,
        }
    }

    fn address_status(&self) -> Option<AddressStatus> {
        self.location.as_ref()?;
        Some(if self.placemark.is_some() {
            AddressStatus::Found
        } else if self.resolving {
            AddressStatus::Searching
        } else if self.resolve_error.is_some() {
            AddressStatus::Error
        } else {
            AddressStatus::NotFound
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session: self.session,
            status: self.status(),
            updating: self.updating,
            location: self.location,
            address_status: self.address_status(),
            placemark: self.placemark.clone(),
            resolving: self.resolving,
            pending_lookups: self.pending,
            location_error: self.location_error.clone(),
            resolve_error: self.resolve_error.clone(),
        }
    }
}
