//! [`DeviceHandle`] – owned, reconnectable handle to one physical peripheral.
//!
//! A vendor driver implements [`Peripheral`]; the controller that manages the
//! device owns a [`DeviceHandle`] around it.  The handle tracks whether the
//! device is open, caches the last health report, and closes the device when
//! dropped so that every exit path releases the hardware.

use scout_types::ScoutError;
use tracing::{debug, warn};

/// Coarse health status reported by a device after it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Good,
    Warning,
    Error,
}

/// Health report read from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHealth {
    pub status: HealthStatus,
    /// Vendor-specific error code (`0` when healthy).
    pub error_code: u16,
}

impl DeviceHealth {
    pub fn good() -> Self {
        Self {
            status: HealthStatus::Good,
            error_code: 0,
        }
    }
}

/// A physical peripheral driven by a vendor driver.
///
/// Implementations must bound every blocking call with a device-level
/// timeout; none may block indefinitely.
pub trait Peripheral: Send {
    /// What one [`read`][Peripheral::read] produces (a sweep, a frame, …).
    type Sample;

    /// Stable identifier, e.g. `"lidar"` or `"front_camera"`.
    fn id(&self) -> &str;

    /// Open the underlying port or bus.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::DeviceUnavailable`] when the device cannot be
    /// reached.
    fn open(&mut self) -> Result<(), ScoutError>;

    /// Query the device's self-reported health.
    fn health(&mut self) -> Result<DeviceHealth, ScoutError>;

    /// Acquire one sample, buffering at most `max_buffer` raw measurements.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::DeviceProtocol`] on a framing, checksum or
    /// timeout error the device may recover from after a reconnect.
    fn read(&mut self, max_buffer: usize) -> Result<Self::Sample, ScoutError>;

    /// Stop the device and release the port.
    fn close(&mut self) -> Result<(), ScoutError>;
}

/// Owns a [`Peripheral`] and manages its open/closed lifecycle.
pub struct DeviceHandle<P: Peripheral> {
    device: P,
    is_open: bool,
    last_health: Option<DeviceHealth>,
    open_count: u32,
}

impl<P: Peripheral> DeviceHandle<P> {
    /// Wrap `device`.  The device is not opened until [`open`][Self::open].
    pub fn new(device: P) -> Self {
        Self {
            device,
            is_open: false,
            last_health: None,
            open_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        self.device.id()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Health read during the most recent successful [`open`][Self::open].
    pub fn last_health(&self) -> Option<DeviceHealth> {
        self.last_health
    }

    /// Number of successful opens over the handle's lifetime.
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn device(&self) -> &P {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut P {
        &mut self.device
    }

    /// Open the device and read its health.
    ///
    /// An already-open handle is closed first so the call always yields a
    /// fresh connection.  If the health query fails the device is closed
    /// again and the error returned.
    pub fn open(&mut self) -> Result<DeviceHealth, ScoutError> {
        if self.is_open {
            self.close()?;
        }
        self.device.open()?;
        self.is_open = true;
        match self.device.health() {
            Ok(health) => {
                debug!(device = self.device.id(), ?health, "device opened");
                self.last_health = Some(health);
                self.open_count += 1;
                Ok(health)
            }
            Err(e) => {
                if let Err(close_err) = self.close() {
                    warn!(device = self.device.id(), error = %close_err, "device close after failed health read failed");
                }
                Err(e)
            }
        }
    }

    /// Read one sample from an open device.
    pub fn read(&mut self, max_buffer: usize) -> Result<P::Sample, ScoutError> {
        if !self.is_open {
            return Err(ScoutError::DeviceUnavailable {
                component: self.device.id().to_string(),
                details: "device is not open".to_string(),
            });
        }
        self.device.read(max_buffer)
    }

    /// Close the device.  Closing a closed handle is a no-op.
    ///
    /// The handle is marked closed even when the driver reports an error, so
    /// a later [`open`][Self::open] starts from a clean state.
    pub fn close(&mut self) -> Result<(), ScoutError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.device.close()
    }
}

impl<P: Peripheral> Drop for DeviceHandle<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(device = self.device.id(), error = %e, "device close on drop failed");
        }
    }
}
