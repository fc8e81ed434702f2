//! [`RangingDeviceController`] – connection state machine for the 2-D scanner.
//!
//! ```text
//! Disconnected ─connect()─▶ Connecting ─▶ Ready ─scan()─▶ Scanning ─┬─▶ Ready
//!                                                                  └─▶ ReconnectPending
//! ReconnectPending ─close, backoff, connect()─┬─▶ Ready        (Recovered)
//!                                             └─▶ Disconnected (Lost, permanent)
//! ```
//!
//! Ranging is optional for the platform: a device that cannot be brought
//! back after one reconnect attempt is disabled for the rest of the run and
//! the loop carries on without it.

use std::fmt;
use std::thread;
use std::time::Duration;

use scout_hal::device::{DeviceHandle, DeviceHealth, HealthStatus, Peripheral};
use scout_types::{ErrorClass, ScanResult, ScoutError};
use tracing::{info, warn};

/// Raw measurements buffered per sweep.
pub const DEFAULT_MAX_BUFFER: usize = 6000;

/// Pause between closing a faulted device and reopening it.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Returns closer than this trigger the proximity alert.
pub const DEFAULT_PROXIMITY_THRESHOLD_MM: f32 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Scanning,
    ReconnectPending,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Scanning => "scanning",
            ConnectionState::ReconnectPending => "reconnect-pending",
        };
        f.write_str(s)
    }
}

/// Whether the loop can use ranging this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingAvailability {
    /// No connection has been established.
    Absent,
    /// The device is ready to scan.
    Connected,
    /// The device failed to recover and is disabled for the run.
    Degraded,
}

/// Result of one [`RangingDeviceController::scan`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A full sweep was captured.
    Sweep(ScanResult),
    /// A protocol error occurred and the single reconnect succeeded.  The
    /// caller skips persistence for this cycle.
    Recovered { error: ScoutError },
    /// The device could not be recovered; ranging is off for the run.
    Lost { error: ScoutError },
}

/// Owns the scanner handle and drives its connection lifecycle.
pub struct RangingDeviceController<P: Peripheral<Sample = ScanResult>> {
    handle: DeviceHandle<P>,
    state: ConnectionState,
    disabled: bool,
    backoff: Duration,
    reconnect_attempts: u32,
}

impl<P: Peripheral<Sample = ScanResult>> RangingDeviceController<P> {
    pub fn new(device: P) -> Self {
        Self {
            handle: DeviceHandle::new(device),
            state: ConnectionState::Disconnected,
            disabled: false,
            backoff: DEFAULT_RECONNECT_BACKOFF,
            reconnect_attempts: 0,
        }
    }

    /// Override the reconnect backoff (default one second).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn handle(&self) -> &DeviceHandle<P> {
        &self.handle
    }

    /// Total reconnect attempts made over the run.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn availability(&self) -> RangingAvailability {
        if self.disabled {
            RangingAvailability::Degraded
        } else if self.state == ConnectionState::Ready {
            RangingAvailability::Connected
        } else {
            RangingAvailability::Absent
        }
    }

    /// Open the device and read its health.
    ///
    /// A device reporting [`HealthStatus::Error`] is closed again and the
    /// connect fails.
    ///
    /// # Errors
    ///
    /// Returns a recoverable error and stays `Disconnected` on failure; the
    /// caller may retry or proceed without ranging.
    pub fn connect(&mut self) -> Result<DeviceHealth, ScoutError> {
        if self.disabled {
            return Err(self.unavailable("ranging disabled for this run"));
        }
        self.state = ConnectionState::Connecting;
        match self.handle.open() {
            Ok(health) if health.status == HealthStatus::Error => {
                if let Err(e) = self.handle.close() {
                    warn!(device = self.handle.id(), error = %e, "ranging device close after health error failed");
                }
                self.state = ConnectionState::Disconnected;
                Err(self.unavailable(&format!(
                    "device reports health error code {}",
                    health.error_code
                )))
            }
            Ok(health) => {
                if health.status == HealthStatus::Warning {
                    warn!(device = self.handle.id(), code = health.error_code, "ranging device health warning");
                }
                info!(device = self.handle.id(), status = ?health.status, code = health.error_code, "ranging device connected");
                self.state = ConnectionState::Ready;
                Ok(health)
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Capture one sweep.
    ///
    /// On a protocol error the controller closes the device, waits the
    /// backoff, and makes exactly one reconnect attempt before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::DeviceUnavailable`] when called outside `Ready`.
    pub fn scan(&mut self, max_buffer: usize) -> Result<ScanOutcome, ScoutError> {
        if self.state != ConnectionState::Ready {
            return Err(self.unavailable(&format!("scan requested while {}", self.state)));
        }
        self.state = ConnectionState::Scanning;
        match self.handle.read(max_buffer) {
            Ok(sweep) => {
                self.state = ConnectionState::Ready;
                Ok(ScanOutcome::Sweep(sweep))
            }
            Err(e) if e.class() == ErrorClass::DeviceRecoverable => Ok(self.recover(e)),
            Err(e) => {
                warn!(error = %e, "unexpected ranging error; disabling ranging");
                self.disable();
                Ok(ScanOutcome::Lost { error: e })
            }
        }
    }

    /// Close the device.  Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Err(e) = self.handle.close() {
            warn!(error = %e, "ranging device close failed");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn recover(&mut self, error: ScoutError) -> ScanOutcome {
        warn!(error = %error, "ranging protocol error; reconnecting");
        self.state = ConnectionState::ReconnectPending;
        if let Err(e) = self.handle.close() {
            warn!(error = %e, "ranging device close failed before reconnect");
        }
        thread::sleep(self.backoff);
        self.reconnect_attempts += 1;
        match self.connect() {
            Ok(_) => ScanOutcome::Recovered { error },
            Err(e) => {
                warn!(error = %e, "ranging reconnect failed; continuing without ranging");
                self.disable();
                ScanOutcome::Lost { error: e }
            }
        }
    }

    fn disable(&mut self) {
        self.release();
        self.disabled = true;
    }

    fn unavailable(&self, details: &str) -> ScoutError {
        ScoutError::DeviceUnavailable {
            component: self.handle.id().to_string(),
            details: details.to_string(),
        }
    }
}

/// Decides whether a sweep warrants the proximity alert.
#[derive(Debug, Clone, Copy)]
pub struct ProximityPolicy {
    threshold_mm: f32,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PROXIMITY_THRESHOLD_MM)
    }
}

impl ProximityPolicy {
    pub fn new(threshold_mm: f32) -> Self {
        Self { threshold_mm }
    }

    pub fn threshold_mm(&self) -> f32 {
        self.threshold_mm
    }

    /// The closest distance when it lies under the threshold, else `None`.
    /// An empty sweep has a minimum of `+inf` and never breaches.
    pub fn breach(&self, scan: &ScanResult) -> Option<f32> {
        let min = scan.min_distance();
        (min < self.threshold_mm).then_some(min)
    }
}
