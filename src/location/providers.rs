//! Location providers: recorded track replay and IP geolocation.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::types::{AcquisitionError, AuthorizationStatus, ProviderEvent, Reading};
use crate::clock::SessionClock;

/// Where a provider delivers its readings and errors.
pub type EventSink = mpsc::UnboundedSender<ProviderEvent>;

/// A source of position readings.
///
/// `start` must return promptly; readings are delivered asynchronously through
/// the sink until `stop` is called or the provider runs dry (dropping the sink).
pub trait LocationProvider: Send {
    fn services_enabled(&self) -> bool {
        true
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn request_authorization(&mut self) {}

    fn start(&mut self, desired_accuracy: f64, clock: SessionClock, sink: EventSink) -> Result<(), AcquisitionError>;

    fn stop(&mut self);
}

// ─── Track replay ────────────────────────────────────────────────

/// One entry of a recorded track file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    /// Seconds after start at which this point is emitted.
    #[serde(default)]
    pub at_secs: f64,
    /// Back-dates the reading, simulating a cached position.
    #[serde(default)]
    pub age_secs: f64,
}

/// Replays a recorded track, stamping each point with the session clock.
pub struct ReplayProvider {
    points: Vec<TrackPoint>,
    task: Option<JoinHandle<()>>,
}

impl ReplayProvider {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        Self { points, task: None }
    }

    /// Load a JSON array of track points.
    pub fn from_file(path: &Path) -> Result<Self, AcquisitionError> {
        let data = fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Provider(format!("{}: {}", path.display(), e)))?;
        let points: Vec<TrackPoint> =
            serde_json::from_str(&data).map_err(|e| AcquisitionError::InvalidResponse(e.to_string()))?;
        Ok(Self::new(points))
    }
}

impl LocationProvider for ReplayProvider {
    fn start(&mut self, _desired_accuracy: f64, clock: SessionClock, sink: EventSink) -> Result<(), AcquisitionError> {
        self.stop();
        let points = self.points.clone();
        self.task = Some(tokio::spawn(async move {
            let started = Instant::now();
            for p in points {
                tokio::time::sleep_until(started + secs(p.at_secs)).await;
                let age = chrono::Duration::from_std(secs(p.age_secs)).unwrap_or(chrono::Duration::zero());
                let reading = Reading::new(p.latitude, p.longitude, p.accuracy, clock.now() - age);
                if sink.send(ProviderEvent::Reading(reading)).is_err() {
                    return;
                }
            }
            log::debug!("Track replay finished");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

// ─── IP-based geolocation ───────────────────────────────────────

/// IP lookups are city-level at best.
pub const IP_ACCURACY_M: f64 = 5_000.0;

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Look up the current public IP's approximate position.
pub fn ip_geolocate() -> Result<(f64, f64), AcquisitionError> {
    let response = ureq::get("https://ipapi.co/json/")
        .set("User-Agent", "MyLocations/0.1")
        .timeout(Duration::from_secs(10))
        .call()
        .map_err(|e| AcquisitionError::Network(e.to_string()))?;

    let r: IpApiResult = response
        .into_json()
        .map_err(|e| AcquisitionError::InvalidResponse(e.to_string()))?;

    if r.error {
        return Err(AcquisitionError::Provider(r.reason.unwrap_or_else(|| "lookup refused".into())));
    }

    let lat = r.latitude.ok_or(AcquisitionError::LocationUnknown)?;
    let lon = r.longitude.ok_or(AcquisitionError::LocationUnknown)?;
    Ok((lat, lon))
}

/// Polls IP geolocation on a fixed interval.
pub struct IpProvider {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl IpProvider {
    pub fn new(interval: Duration) -> Self {
        Self { interval, task: None }
    }
}

impl LocationProvider for IpProvider {
    fn start(&mut self, _desired_accuracy: f64, clock: SessionClock, sink: EventSink) -> Result<(), AcquisitionError> {
        self.stop();
        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            loop {
                let event = match tokio::task::spawn_blocking(ip_geolocate).await {
                    Ok(Ok((lat, lon))) => ProviderEvent::Reading(Reading::new(lat, lon, IP_ACCURACY_M, clock.now())),
                    Ok(Err(e)) => ProviderEvent::Error(e),
                    Err(e) => ProviderEvent::Error(AcquisitionError::Provider(e.to_string())),
                };
                if sink.send(event).is_err() {
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
