//! The acquisition session task.
//!
//! One tokio task owns the provider and the [`Acquisition`] state and feeds
//! it provider events, the session deadline, resolver completions and user
//! commands, one at a time. Front ends talk to it through a cloneable
//! [`SessionHandle`] and observe it through a `watch` channel of snapshots.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::acquisition::{Acquisition, Intent, Lookup, Snapshot};
use crate::address::{AddressResolver, Placemark, ResolveError};
use crate::clock::SessionClock;
use crate::config::AcquisitionConfig;
use crate::location::{AcquisitionError, AuthorizationStatus, LocationProvider, ProviderEvent};

/// Result of asking the session to start (or toggle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    Stopped,
    /// Permission was requested; the user has to start again once granted.
    AuthorizationRequested,
}

type Reply = oneshot::Sender<Result<StartOutcome, AcquisitionError>>;

enum Command {
    Start(Reply),
    Toggle(Reply),
    Stop(oneshot::Sender<bool>),
}

/// Handle to a running session task. The task exits when every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Start acquiring. A no-op if a session is already running.
    pub async fn start(&self) -> Result<StartOutcome, AcquisitionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Start(tx))
            .map_err(|_| AcquisitionError::SessionClosed)?;
        rx.await.map_err(|_| AcquisitionError::SessionClosed)?
    }

    /// Stop if running, start otherwise.
    pub async fn toggle(&self) -> Result<StartOutcome, AcquisitionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Toggle(tx))
            .map_err(|_| AcquisitionError::SessionClosed)?;
        rx.await.map_err(|_| AcquisitionError::SessionClosed)?
    }

    /// Stop acquiring. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until the provider is detached and every address lookup,
    /// including overlapping ones, has finished.
    pub async fn settled(&self) -> Snapshot {
        let mut rx = self.snapshots.clone();
        let settled = rx
            .wait_for(|s| !s.updating && s.pending_lookups == 0)
            .await
            .map(|s| (*s).clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }
}

/// Spawn the session task on the current runtime.
pub fn spawn(
    provider: Box<dyn LocationProvider>,
    resolver: Arc<dyn AddressResolver>,
    config: AcquisitionConfig,
) -> SessionHandle {
    let acquisition = Acquisition::new(&config);
    let (snapshot_tx, snapshot_rx) = watch::channel(acquisition.snapshot());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();

    let driver = Driver {
        provider,
        resolver,
        config,
        acquisition,
        events: None,
        deadline: None,
        clock: SessionClock::new(),
        resolved_tx,
        snapshots: snapshot_tx,
    };
    tokio::spawn(driver.run(command_rx, resolved_rx));

    SessionHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
    }
}

/// Lookup id and its result.
type Resolved = (u64, Result<Placemark, ResolveError>);

struct Driver {
    provider: Box<dyn LocationProvider>,
    resolver: Arc<dyn AddressResolver>,
    config: AcquisitionConfig,
    acquisition: Acquisition,
    events: Option<mpsc::UnboundedReceiver<ProviderEvent>>,
    deadline: Option<Instant>,
    clock: SessionClock,
    resolved_tx: mpsc::UnboundedSender<Resolved>,
    snapshots: watch::Sender<Snapshot>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut resolved: mpsc::UnboundedReceiver<Resolved>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                event = next_event(&mut self.events) => {
                    let intent = match event {
                        Some(ProviderEvent::Reading(r)) => self.acquisition.on_reading(r, self.clock.now()),
                        Some(ProviderEvent::Error(e)) => self.acquisition.on_error(e),
                        None => {
                            log::debug!("Provider stream ended");
                            self.events = None;
                            self.acquisition.on_provider_finished()
                        }
                    };
                    self.apply(intent);
                }
                _ = wait_until(self.deadline) => {
                    self.deadline = None;
                    let intent = self.acquisition.on_timeout();
                    self.apply(intent);
                }
                Some((id, result)) = resolved.recv() => {
                    let intent = self.acquisition.on_resolved(id, result);
                    self.apply(intent);
                }
            }
            self.publish();
        }

        if self.acquisition.halt() {
            self.detach();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.acquisition.snapshot());
    }

    /// Replies go out after the new state is published, so a caller that
    /// awaits a command never observes the snapshot from before it.
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                let result = if self.acquisition.is_updating() {
                    Ok(StartOutcome::Started)
                } else {
                    self.start()
                };
                self.publish();
                let _ = reply.send(result);
            }
            Command::Toggle(reply) => {
                let result = if self.stop() {
                    Ok(StartOutcome::Stopped)
                } else {
                    self.start()
                };
                self.publish();
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let stopped = self.stop();
                self.publish();
                let _ = reply.send(stopped);
            }
        }
    }

    fn start(&mut self) -> Result<StartOutcome, AcquisitionError> {
        match self.provider.authorization_status() {
            AuthorizationStatus::NotDetermined => {
                self.provider.request_authorization();
                return Ok(StartOutcome::AuthorizationRequested);
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                self.acquisition.refuse(AcquisitionError::Denied);
                return Err(AcquisitionError::Denied);
            }
            AuthorizationStatus::Authorized => {}
        }
        if !self.provider.services_enabled() {
            self.acquisition.refuse(AcquisitionError::ServicesDisabled);
            return Err(AcquisitionError::ServicesDisabled);
        }

        self.acquisition.begin();
        self.clock = SessionClock::new();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.provider.start(self.config.desired_accuracy, self.clock, tx) {
            self.acquisition.refuse(e.clone());
            return Err(e);
        }
        self.events = Some(rx);
        self.deadline = Some(Instant::now() + self.config.timeout);
        log::info!("Acquisition session {} started", self.acquisition.session());
        Ok(StartOutcome::Started)
    }

    fn stop(&mut self) -> bool {
        if !self.acquisition.halt() {
            return false;
        }
        self.detach();
        true
    }

    fn detach(&mut self) {
        self.provider.stop();
        self.events = None;
        self.deadline = None;
        log::info!("Acquisition session {} stopped", self.acquisition.session());
    }

    fn apply(&mut self, intent: Intent) {
        if intent.stop {
            self.detach();
        }
        if let Some(Lookup { id, reading }) = intent.resolve {
            let resolver = Arc::clone(&self.resolver);
            let tx = self.resolved_tx.clone();
            tokio::spawn(async move {
                let result = tokio::task::spawn_blocking(move || resolver.resolve(&reading))
                    .await
                    .unwrap_or_else(|e| Err(ResolveError::Interrupted(e.to_string())));
                let _ = tx.send((id, result));
            });
        }
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<ProviderEvent>>) -> Option<ProviderEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AddressStatus, Status};
    use crate::address::AddressSource;
    use crate::location::{EventSink, Reading, ReplayProvider, TrackPoint};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubResolver {
        fn ok() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: false })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: true })
        }
    }

    impl AddressResolver for StubResolver {
        fn resolve(&self, _reading: &Reading) -> Result<Placemark, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolveError::Network("unreachable".into()));
            }
            Ok(Placemark {
                thoroughfare: Some("Infinite Loop".into()),
                locality: Some("Cupertino".into()),
                ..Placemark::empty(AddressSource::Nominatim)
            })
        }
    }

    /// Takes real time per lookup and records how many ran at once.
    /// Fixes within 10 m take longer than coarse ones.
    #[derive(Default)]
    struct SlowResolver {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl AddressResolver for SlowResolver {
        fn resolve(&self, reading: &Reading) -> Result<Placemark, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            let ms = if reading.accuracy <= 10.0 { 700 } else { 300 };
            std::thread::sleep(Duration::from_millis(ms));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Placemark {
                locality: Some(format!("acc{}", reading.accuracy)),
                ..Placemark::empty(AddressSource::Nominatim)
            })
        }
    }

    /// Emits a fixed list of events immediately and keeps the stream open.
    struct ScriptedProvider {
        status: AuthorizationStatus,
        enabled: bool,
        script: Vec<ProviderEvent>,
        requested: Arc<AtomicBool>,
        sink: Option<EventSink>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ProviderEvent>) -> Self {
            Self {
                status: AuthorizationStatus::Authorized,
                enabled: true,
                script,
                requested: Arc::new(AtomicBool::new(false)),
                sink: None,
            }
        }
    }

    impl LocationProvider for ScriptedProvider {
        fn services_enabled(&self) -> bool {
            self.enabled
        }

        fn authorization_status(&self) -> AuthorizationStatus {
            self.status
        }

        fn request_authorization(&mut self) {
            self.requested.store(true, Ordering::SeqCst);
        }

        fn start(&mut self, _desired: f64, clock: crate::clock::SessionClock, sink: EventSink) -> Result<(), AcquisitionError> {
            for event in &self.script {
                let event = match event {
                    ProviderEvent::Reading(r) => ProviderEvent::Reading(Reading { timestamp: clock.now(), ..*r }),
                    other => other.clone(),
                };
                let _ = sink.send(event);
            }
            self.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.sink = None;
        }
    }

    fn point(at_secs: f64, accuracy: f64) -> TrackPoint {
        TrackPoint { latitude: 37.3318, longitude: -122.0312, accuracy, at_secs, age_secs: 0.0 }
    }

    fn replay(points: Vec<TrackPoint>) -> Box<dyn LocationProvider> {
        Box::new(ReplayProvider::new(points))
    }

    fn reading(accuracy: f64) -> ProviderEvent {
        ProviderEvent::Reading(Reading::new(37.3318, -122.0312, accuracy, chrono::Utc::now()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaches_desired_accuracy() {
        let resolver = StubResolver::ok();
        let handle = spawn(
            replay(vec![point(0.0, 65.0), point(1.0, 30.0), point(2.0, 8.0), point(3.0, 5.0)]),
            resolver.clone(),
            AcquisitionConfig::default(),
        );

        assert_eq!(handle.start().await, Ok(StartOutcome::Started));
        let s = handle.settled().await;

        assert!(!s.updating);
        assert_eq!(s.status, Status::Located);
        assert_eq!(s.location.unwrap().accuracy, 8.0);
        assert_eq!(s.address_status, Some(AddressStatus::Found));
        assert_eq!(s.placemark.unwrap().locality.as_deref(), Some("Cupertino"));
        assert!(resolver.calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stagnation_stops_without_reaching_accuracy() {
        let points = (0..30).map(|s| point(s as f64, 50.0)).collect();
        let handle = spawn(replay(points), StubResolver::ok(), AcquisitionConfig::default());

        let started = Instant::now();
        handle.start().await.unwrap();
        let s = handle.settled().await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(11) && elapsed < Duration::from_secs(12), "{:?}", elapsed);
        assert_eq!(s.location.unwrap().accuracy, 50.0);
        assert!(s.location_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_fix() {
        let started = Instant::now();
        let handle = spawn(replay(vec![point(120.0, 5.0)]), StubResolver::ok(), AcquisitionConfig::default());
        handle.start().await.unwrap();
        let s = handle.settled().await;

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(61));
        assert_eq!(s.location_error, Some(AcquisitionError::TimedOut));
        assert_eq!(s.status, Status::Failed);
        assert!(s.location.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ignored_once_located() {
        // equal accuracy, 100 m apart each time: never better, never stationary
        let points = (0..4)
            .map(|i| TrackPoint {
                latitude: 37.3318 + i as f64 * 0.001,
                longitude: -122.0312,
                accuracy: 500.0,
                at_secs: i as f64 * 30.0,
                age_secs: 0.0,
            })
            .collect();
        let handle = spawn(replay(points), StubResolver::ok(), AcquisitionConfig::default());
        handle.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(handle.snapshot().updating);

        let s = handle.settled().await;
        assert!(s.location_error.is_none());
        assert_eq!(s.location.unwrap().latitude, 37.3318);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_and_invalid_readings_skipped() {
        let stale = TrackPoint { age_secs: 30.0, ..point(0.0, 5.0) };
        let handle = spawn(
            replay(vec![stale, point(0.5, -1.0), point(1.0, 80.0)]),
            StubResolver::ok(),
            AcquisitionConfig::default(),
        );
        handle.start().await.unwrap();
        let s = handle.settled().await;
        assert_eq!(s.location.unwrap().accuracy, 80.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_then_reading() {
        let provider = ScriptedProvider::new(vec![
            ProviderEvent::Error(AcquisitionError::LocationUnknown),
            reading(5.0),
        ]);
        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());
        handle.start().await.unwrap();
        let s = handle.settled().await;
        assert!(s.location_error.is_none());
        assert_eq!(s.location.unwrap().accuracy, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serious_error_stops() {
        let provider = ScriptedProvider::new(vec![ProviderEvent::Error(AcquisitionError::Network("down".into()))]);
        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());
        handle.start().await.unwrap();
        let s = handle.settled().await;
        assert_eq!(s.status, Status::Failed);
        assert_eq!(s.location_error, Some(AcquisitionError::Network("down".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_error_does_not_stop() {
        let provider = ScriptedProvider::new(vec![reading(65.0)]);
        let handle = spawn(Box::new(provider), StubResolver::failing(), AcquisitionConfig::default());
        handle.start().await.unwrap();

        let mut rx = handle.subscribe();
        let s = (*rx.wait_for(|s| s.resolve_error.is_some()).await.unwrap()).clone();
        assert!(s.updating);
        assert_eq!(s.address_status, Some(AddressStatus::Error));
        assert!(handle.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_requested_first() {
        let mut provider = ScriptedProvider::new(vec![reading(5.0)]);
        provider.status = AuthorizationStatus::NotDetermined;
        let requested = provider.requested.clone();

        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());
        assert_eq!(handle.start().await, Ok(StartOutcome::AuthorizationRequested));
        assert!(requested.load(Ordering::SeqCst));
        assert!(!handle.snapshot().updating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_refuses_to_start() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.status = AuthorizationStatus::Denied;
        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());
        assert_eq!(handle.start().await, Err(AcquisitionError::Denied));

        let mut rx = handle.subscribe();
        let s = (*rx.wait_for(|s| s.status == Status::ServicesDisabled).await.unwrap()).clone();
        assert!(!s.updating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_disabled() {
        let mut provider = ScriptedProvider::new(vec![]);
        provider.enabled = false;
        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());
        assert_eq!(handle.start().await, Err(AcquisitionError::ServicesDisabled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_stops_and_keeps_location() {
        let provider = ScriptedProvider::new(vec![reading(300.0)]);
        let handle = spawn(Box::new(provider), StubResolver::ok(), AcquisitionConfig::default());

        assert_eq!(handle.toggle().await, Ok(StartOutcome::Started));
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.location.is_some() && !s.resolving).await.unwrap();

        assert_eq!(handle.toggle().await, Ok(StartOutcome::Stopped));
        let s = handle.settled().await;
        assert!(!s.updating);
        assert_eq!(s.location.unwrap().accuracy, 300.0);
        assert!(!handle.stop().await, "already stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_during_lookup_keeps_single_flight() {
        let resolver = Arc::new(SlowResolver::default());
        let provider = ScriptedProvider::new(vec![reading(300.0)]);
        let handle = spawn(Box::new(provider), resolver.clone(), AcquisitionConfig::default());

        handle.start().await.unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.resolving).await.unwrap();

        assert!(handle.stop().await);
        assert_eq!(handle.start().await, Ok(StartOutcome::Started));
        let s = handle.snapshot();
        assert!(s.resolving, "previous lookup still running");
        assert_eq!(s.pending_lookups, 1);

        let s = (*rx.wait_for(|s| s.placemark.is_some()).await.unwrap()).clone();
        assert_eq!(s.placemark.unwrap().locality.as_deref(), Some("acc300"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(handle.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_waits_for_final_lookup() {
        let resolver = Arc::new(SlowResolver::default());
        // the accurate fix moved about 111 m, so its lookup overlaps the first one
        let moved = ProviderEvent::Reading(Reading::new(37.3328, -122.0312, 8.0, chrono::Utc::now()));
        let provider = ScriptedProvider::new(vec![reading(65.0), moved]);
        let handle = spawn(Box::new(provider), resolver.clone(), AcquisitionConfig::default());

        handle.start().await.unwrap();
        let s = handle.settled().await;

        assert!(!s.updating);
        assert_eq!(s.pending_lookups, 0);
        assert_eq!(s.location.unwrap().accuracy, 8.0);
        assert_eq!(s.placemark.unwrap().locality.as_deref(), Some("acc8"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }
}
