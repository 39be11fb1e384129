//! Location sources
//!
//! A source produces [`Fix`] values and publishes them to a
//! [`LocationBroadcaster`]. Two sources are provided: a deterministic
//! simulator for hosts without a location provider, and a device source that
//! platform callbacks feed from any thread.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{broadcaster::LocationBroadcaster, config::LocationConfig, geo, models::Fix};

/// Simulated boat speed, about 3 knots
pub const SIM_SPEED_MPS: f64 = 1.5;
/// Spiral radius growth in degrees per second
pub const SIM_RADIUS_DEG_PER_SEC: f64 = 0.0002;
/// Spiral angular velocity in radians per second
pub const SIM_ANGLE_RAD_PER_SEC: f64 = 0.5;

pub trait LocationSource: Send {
    /// Begin publishing fixes. Calling `start` on a running source does nothing.
    ///
    /// Failing to start is not an error: a warning is logged and the source
    /// produces no fixes.
    fn start(&mut self, broadcaster: &LocationBroadcaster);

    /// Stop publishing. Idempotent; no fix is published after this returns.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Drops fixes that arrive too soon or too close to the last accepted one
#[derive(Debug, Clone)]
pub struct FixFilter {
    min_interval: TimeDelta,
    min_distance_m: f64,
    last: Option<Fix>,
}

impl FixFilter {
    pub fn new(min_interval: Duration, min_distance_m: f64) -> Self {
        Self {
            min_interval: TimeDelta::from_std(min_interval).unwrap_or(TimeDelta::MAX),
            min_distance_m,
            last: None,
        }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(config.min_interval, config.min_distance_m)
    }

    /// Returns true and remembers `fix` when both thresholds are met.
    /// The first fix is always accepted.
    pub fn accept(&mut self, fix: &Fix) -> bool {
        if let Some(last) = &self.last {
            // A provider clock that steps backwards does not hold fixes back
            let elapsed = fix.timestamp - last.timestamp;
            if elapsed >= TimeDelta::zero() && elapsed < self.min_interval {
                return false;
            }
            if geo::distance_m(last.position(), fix.position()) < self.min_distance_m {
                return false;
            }
        }
        self.last = Some(*fix);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for FixFilter {
    fn default() -> Self {
        Self::from_config(&LocationConfig::default())
    }
}

/// Permission to publish, shared by a source and its task.
///
/// Fixes are published while the lock is held, so once [`Gate::close`]
/// returns no observer is running a callback for this source and none will.
#[derive(Clone)]
struct Gate(Arc<parking_lot::Mutex<bool>>);

impl Gate {
    fn open() -> Self {
        Self(Arc::new(parking_lot::Mutex::new(true)))
    }

    fn close(&self) {
        *self.0.lock() = false;
    }

    /// Returns false when the gate was closed and `fix` was dropped.
    fn publish(&self, broadcaster: &LocationBroadcaster, fix: Fix) -> bool {
        let open = self.0.lock();
        if *open {
            broadcaster.publish(fix);
        }
        *open
    }
}

/// Running task plus the token and gate that stop it
#[derive(Default)]
struct Worker {
    token: Option<CancellationToken>,
    gate: Option<Gate>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.close();
        }
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        // Nothing can be published past the closed gate; the task winds down
        // on its own
        self.handle.take();
    }
}

/// Outward spiral around a fixed origin, one fix per tick
pub struct SimulatedSource {
    origin: (f64, f64),
    tick: Duration,
    filter: FixFilter,
    worker: Worker,
}

impl SimulatedSource {
    pub fn new(origin: (f64, f64), filter: FixFilter) -> Self {
        Self {
            origin,
            tick: Duration::from_secs(1),
            filter,
            worker: Worker::default(),
        }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(
            (config.origin_lat, config.origin_lon),
            FixFilter::from_config(config),
        )
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Position on the spiral `elapsed_secs` after start
    pub fn position_at(origin: (f64, f64), elapsed_secs: f64) -> (f64, f64) {
        let radius = SIM_RADIUS_DEG_PER_SEC * elapsed_secs;
        let angle = SIM_ANGLE_RAD_PER_SEC * elapsed_secs;
        (
            origin.0 + radius * angle.cos(),
            origin.1 + radius * angle.sin(),
        )
    }

    async fn run(
        origin: (f64, f64),
        tick: Duration,
        mut filter: FixFilter,
        broadcaster: LocationBroadcaster,
        token: CancellationToken,
        gate: Gate,
    ) {
        let started = tokio::time::Instant::now();
        let started_wall = Utc::now();
        let mut ticker = tokio::time::interval(tick);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    let (lat, lon) = Self::position_at(origin, elapsed.as_secs_f64());
                    let timestamp = started_wall
                        + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero());

                    match Fix::new(lat, lon, SIM_SPEED_MPS, timestamp) {
                        Ok(fix) if filter.accept(&fix) => {
                            if !gate.publish(&broadcaster, fix) {
                                break;
                            }
                        }
                        Ok(_) => debug!("Simulated fix filtered"),
                        Err(e) => warn!("Simulated fix rejected: {}", e),
                    }
                }
            }
        }
        debug!("Simulated location task finished");
    }
}

impl LocationSource for SimulatedSource {
    fn start(&mut self, broadcaster: &LocationBroadcaster) {
        if self.worker.is_running() {
            return;
        }
        self.worker.stop();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Simulated location unavailable, no fixes will be produced: {}", e);
                return;
            }
        };

        let token = CancellationToken::new();
        let gate = Gate::open();
        let mut filter = self.filter.clone();
        filter.reset();
        self.worker.handle = Some(runtime.spawn(Self::run(
            self.origin,
            self.tick,
            filter,
            broadcaster.clone(),
            token.clone(),
            gate.clone(),
        )));
        self.worker.token = Some(token);
        self.worker.gate = Some(gate);
        info!(
            "Simulated location enabled: spiral around {:.6}, {:.6}",
            self.origin.0, self.origin.1
        );
    }

    fn stop(&mut self) {
        if self.worker.is_running() {
            info!("Stopping simulated location");
        }
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

/// One reading as reported by the platform location provider
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres per second, `None` when the provider has no speed
    pub speed_mps: Option<f64>,
    /// Provider timestamp, defaults to the time of marshalling
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Location(RawReading),
    Status { kind: String, status: String },
}

/// Thread-safe handle that platform callbacks push into.
///
/// Sending never blocks, so it is safe to call from a provider's own thread.
#[derive(Debug, Clone)]
pub struct DeviceFeed {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceFeed {
    /// Returns false once the owning [`DeviceSource`] has been dropped.
    pub fn push(&self, reading: RawReading) -> bool {
        self.tx.send(DeviceEvent::Location(reading)).is_ok()
    }

    pub fn status(&self, kind: impl Into<String>, status: impl Into<String>) -> bool {
        self.tx
            .send(DeviceEvent::Status {
                kind: kind.into(),
                status: status.into(),
            })
            .is_ok()
    }
}

/// Source fed by a platform location provider through a [`DeviceFeed`]
pub struct DeviceSource {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<DeviceEvent>>>,
    filter: FixFilter,
    worker: Worker,
}

impl DeviceSource {
    pub fn new(filter: FixFilter) -> (Self, DeviceFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx: Arc::new(Mutex::new(rx)),
            filter,
            worker: Worker::default(),
        };
        (source, DeviceFeed { tx })
    }

    fn to_fix(reading: RawReading) -> Result<Fix, crate::errors::TrackerError> {
        Fix::new(
            reading.latitude,
            reading.longitude,
            reading.speed_mps.unwrap_or(0.0),
            reading.timestamp.unwrap_or_else(Utc::now),
        )
    }

    async fn run(
        rx: Arc<Mutex<mpsc::UnboundedReceiver<DeviceEvent>>>,
        mut filter: FixFilter,
        broadcaster: LocationBroadcaster,
        token: CancellationToken,
        gate: Gate,
    ) {
        let mut rx = tokio::select! {
            _ = token.cancelled() => return,
            guard = rx.lock() => guard,
        };

        // Readings queued while stopped are stale
        let mut stale = 0usize;
        while rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Discarded {} readings queued while stopped", stale);
        }

        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                info!("Device location feed closed, no further fixes");
                break;
            };

            match event {
                DeviceEvent::Location(reading) => match Self::to_fix(reading) {
                    Ok(fix) if filter.accept(&fix) => {
                        if !gate.publish(&broadcaster, fix) {
                            break;
                        }
                    }
                    Ok(_) => debug!("Device fix filtered"),
                    Err(e) => warn!("Dropping device reading: {}", e),
                },
                DeviceEvent::Status { kind, status } => {
                    if status == "provider-enabled" || status == "provider-disabled" {
                        info!("GPS status: {} -> {}", kind, status);
                    } else {
                        debug!("GPS status: {} -> {}", kind, status);
                    }
                }
            }
        }
    }
}

impl LocationSource for DeviceSource {
    fn start(&mut self, broadcaster: &LocationBroadcaster) {
        if self.worker.is_running() {
            return;
        }
        self.worker.stop();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Device location unavailable, no fixes will be produced: {}", e);
                return;
            }
        };

        let token = CancellationToken::new();
        let gate = Gate::open();
        let mut filter = self.filter.clone();
        filter.reset();
        self.worker.handle = Some(runtime.spawn(Self::run(
            Arc::clone(&self.rx),
            filter,
            broadcaster.clone(),
            token.clone(),
            gate.clone(),
        )));
        self.worker.token = Some(token);
        self.worker.gate = Some(gate);
        info!("Device location started");
    }

    fn stop(&mut self) {
        if self.worker.is_running() {
            info!("Stopping device location");
        }
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}
