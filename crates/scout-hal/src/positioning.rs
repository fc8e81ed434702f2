//! Satellite positioning receiver contract.
//!
//! Sentence parsing belongs to the driver; the fusion loop only sees a
//! decoded [`SatelliteReading`] or nothing.

use std::time::Duration;

use scout_types::ScoutError;

/// A decoded recommended-minimum position report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Receiver status flag: `true` for an active fix, `false` for void.
    pub active: bool,
}

impl SatelliteReading {
    /// Active status with both coordinates non-zero.
    pub fn is_valid_fix(&self) -> bool {
        self.active && self.latitude != 0.0 && self.longitude != 0.0
    }
}

/// A positioning stream that yields at most one reading per call.
pub trait SatelliteReceiver: Send {
    /// Read the next position report, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no position sentence arrived in time.
    ///
    /// # Errors
    ///
    /// Returns an error on a port or decoding failure.
    fn read_position(&mut self, timeout: Duration) -> Result<Option<SatelliteReading>, ScoutError>;
}
