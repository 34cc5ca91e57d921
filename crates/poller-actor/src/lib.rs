use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use field_catalog::{project, Field, ProjectionError, PublishedData, CANONICAL_FIELD};
use sungrow_client::{ClientError, SungrowClient};
use types::{DeviceIdentity, Snapshot};

mod state;

pub use state::{LastError, Phase, PollerState};

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    /// Upper bound for one poll, on top of the client's own per-step timeouts.
    pub request_timeout: Duration,
    /// Delay between setup attempts while a device fails the setup check.
    pub setup_retry: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
            setup_retry: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// Device unreachable, refused or timed out.
    #[error("connection error: {0}")]
    Connection(String),
    /// Device answered with something we cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
        }
    }
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Connection(_) => ErrorKind::Connection,
            PollError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}

impl From<ClientError> for PollError {
    fn from(err: ClientError) -> Self {
        if err.is_connection() {
            PollError::Connection(err.to_string())
        } else {
            PollError::Protocol(err.to_string())
        }
    }
}

impl From<ProjectionError> for PollError {
    fn from(err: ProjectionError) -> Self {
        PollError::Protocol(err.to_string())
    }
}

/// Produces one telemetry snapshot per call.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn poll(&self) -> Result<Snapshot, PollError>;
}

#[async_trait]
impl DataSource for SungrowClient {
    async fn poll(&self) -> Result<Snapshot, PollError> {
        Ok(self.fetch_snapshot().await?)
    }
}

/// Receives the outcome of every completed cycle.
pub trait Sink: Send + Sync {
    fn publish(&self, device: &DeviceIdentity, data: &PublishedData);

    fn record_error(&self, device: &DeviceIdentity, error: &LastError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Published { fields: usize },
    Failed { kind: ErrorKind },
    /// Another cycle was already in flight; this one did nothing.
    Skipped,
}

/// Polls one device and owns its state. At most one cycle runs at a time.
pub struct DevicePoller {
    identity: DeviceIdentity,
    source: Arc<dyn DataSource>,
    sink: Arc<dyn Sink>,
    config: ActorConfig,
    state: RwLock<PollerState>,
    in_flight: Mutex<()>,
}

impl DevicePoller {
    pub fn new(
        identity: DeviceIdentity,
        source: Arc<dyn DataSource>,
        sink: Arc<dyn Sink>,
        config: ActorConfig,
    ) -> Self {
        Self {
            state: RwLock::new(PollerState::new(identity.clone())),
            identity,
            source,
            sink,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> PollerState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn published(&self) -> Option<PublishedData> {
        self.state().published
    }

    pub fn is_active(&self) -> bool {
        self.state().phase == Phase::Active
    }

    /// Runs the setup check: one poll whose response must contain the
    /// canonical field. On success the first read is published.
    pub async fn setup(&self) -> Result<usize, PollError> {
        let _guard = self.in_flight.lock().await;
        self.cycle_locked().await
    }

    /// One scheduled cycle. Dropped rather than queued if a cycle is in flight.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            self.update_state(|state| state.skipped = state.skipped.saturating_add(1));
            metrics::counter!(
                "sungrow_poll_cycles_total",
                "device" => self.identity.address.clone(),
                "outcome" => "skipped"
            )
            .increment(1);
            debug!(address = %self.identity.address, "poll already in flight, tick dropped");
            return CycleOutcome::Skipped;
        };

        match self.cycle_locked().await {
            Ok(fields) => CycleOutcome::Published { fields },
            Err(err) => CycleOutcome::Failed { kind: err.kind() },
        }
    }

    /// Manual refresh; same guard as the scheduled cycle.
    pub async fn trigger(&self) -> CycleOutcome {
        info!(address = %self.identity.address, "manual refresh requested");
        self.poll_cycle().await
    }

    /// Retries setup until it succeeds, then polls on a fixed interval until shutdown.
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) {
        while !self.is_active() {
            if *shutdown.borrow() {
                return;
            }
            if let Err(err) = self.setup().await {
                warn!(
                    address = %self.identity.address,
                    name = %self.identity.name,
                    error = %err,
                    retry_ms = self.config.setup_retry.as_millis(),
                    "device setup failed"
                );
                tokio::select! {
                    _ = sleep(self.config.setup_retry) => {},
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(address = %self.identity.address, "poller shutdown requested");
                            return;
                        }
                    }
                }
            }
        }

        info!(address = %self.identity.address, name = %self.identity.name, "device active");
        self.run(shutdown).await;
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; setup already produced the first read.
        ticker.tick().await;

        loop {
            if *shutdown.borrow() {
                info!(address = %self.identity.address, "poller shutdown requested");
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(address = %self.identity.address, "poller shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    async fn cycle_locked(&self) -> Result<usize, PollError> {
        let started = Instant::now();
        let gated = !self.is_active();

        let result = self.fetch().await.and_then(|snapshot| {
            if gated && !snapshot.contains(CANONICAL_FIELD.as_str()) {
                return Err(PollError::Protocol(format!(
                    "response lacks {CANONICAL_FIELD}, not a supported inverter"
                )));
            }
            Ok(project(&snapshot, &Field::ALL)?)
        });
        let elapsed = started.elapsed();
        metrics::histogram!(
            "sungrow_poll_duration_seconds",
            "device" => self.identity.address.clone()
        )
        .record(elapsed.as_secs_f64());

        match result {
            Ok(data) => {
                let fields = data.len();
                self.sink.publish(&self.identity, &data);
                self.update_state(|state| state.record_success(data, unix_ms()));
                metrics::counter!(
                    "sungrow_poll_cycles_total",
                    "device" => self.identity.address.clone(),
                    "outcome" => "published"
                )
                .increment(1);
                info!(
                    address = %self.identity.address,
                    fields,
                    elapsed_ms = elapsed.as_millis(),
                    "poll cycle complete"
                );
                Ok(fields)
            }
            Err(err) => {
                let last_error = LastError::new(&err, unix_ms());
                self.sink.record_error(&self.identity, &last_error);
                self.update_state(|state| state.record_failure(last_error));
                metrics::counter!(
                    "sungrow_poll_cycles_total",
                    "device" => self.identity.address.clone(),
                    "outcome" => "failed"
                )
                .increment(1);
                warn!(
                    address = %self.identity.address,
                    error = %err,
                    elapsed_ms = elapsed.as_millis(),
                    "poll cycle failed, keeping last published data"
                );
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Snapshot, PollError> {
        match timeout(self.config.request_timeout, self.source.poll()).await {
            Ok(result) => result,
            Err(_) => Err(PollError::Connection(format!(
                "poll timed out after {}ms",
                self.config.request_timeout.as_millis()
            ))),
        }
    }

    fn update_state(&self, apply: impl FnOnce(&mut PollerState)) {
        match self.state.write() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
