//! In-process simulated drivers for headless runs and CI without hardware.
//!
//! Each driver implements the same contract as its physical counterpart and
//! can be scripted with a queue of outcomes, so recovery paths (protocol
//! errors, failed reconnects, missing fixes) are reproducible.
//!
//! # Example
//!
//! ```rust
//! use scout_hal::device::DeviceHandle;
//! use scout_hal::sim::SimLidar;
//! use scout_types::{RangingSample, ScanResult};
//!
//! let lidar = SimLidar::new("lidar")
//!     .with_sweep(Ok(ScanResult::from(vec![RangingSample::new(0.0, 250.0, 15)])));
//! let mut handle = DeviceHandle::new(lidar);
//! handle.open().unwrap();
//! assert_eq!(handle.read(6000).unwrap().min_distance(), 250.0);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use scout_types::{RangingSample, ScanResult, ScoutError, TemperatureReading};

use crate::camera::CameraFrame;
use crate::device::{DeviceHealth, Peripheral};
use crate::positioning::{SatelliteReading, SatelliteReceiver};
use crate::relay::Relay;
use crate::thermal::ThermalSensor;

// ────────────────────────────────────────────────────────────────────────────
// Lidar
// ────────────────────────────────────────────────────────────────────────────

/// A scripted 2-D ranging scanner.
///
/// Sweeps are served from the script in order; once it is exhausted the
/// scanner returns a synthetic ring of returns at [`SimLidar::RING_MM`].
pub struct SimLidar {
    id: String,
    sweeps: VecDeque<Result<ScanResult, ScoutError>>,
    opens: VecDeque<Result<(), ScoutError>>,
    health: DeviceHealth,
    open_calls: usize,
    close_calls: usize,
}

impl SimLidar {
    /// Distance of the synthetic ring sweep, in millimetres.
    pub const RING_MM: f32 = 1500.0;

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sweeps: VecDeque::new(),
            opens: VecDeque::new(),
            health: DeviceHealth::good(),
            open_calls: 0,
            close_calls: 0,
        }
    }

    /// Queue the outcome of the next unscripted `read`.
    pub fn with_sweep(mut self, sweep: Result<ScanResult, ScoutError>) -> Self {
        self.sweeps.push_back(sweep);
        self
    }

    /// Queue the outcome of the next `open` (default: success).
    pub fn with_open(mut self, result: Result<(), ScoutError>) -> Self {
        self.opens.push_back(result);
        self
    }

    pub fn with_health(mut self, health: DeviceHealth) -> Self {
        self.health = health;
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    /// Protocol error as the vendor driver reports a corrupted descriptor.
    pub fn protocol_error(details: &str) -> ScoutError {
        ScoutError::DeviceProtocol {
            component: "lidar".to_string(),
            details: details.to_string(),
        }
    }

    fn ring(max_buffer: usize) -> ScanResult {
        let n = max_buffer.min(360);
        (0..n)
            .map(|i| RangingSample::new(i as f32 * 360.0 / n as f32, Self::RING_MM, 15))
            .collect::<Vec<_>>()
            .into()
    }
}

impl Peripheral for SimLidar {
    type Sample = ScanResult;

    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), ScoutError> {
        self.open_calls += 1;
        self.opens.pop_front().unwrap_or(Ok(()))
    }

    fn health(&mut self) -> Result<DeviceHealth, ScoutError> {
        Ok(self.health)
    }

    fn read(&mut self, max_buffer: usize) -> Result<ScanResult, ScoutError> {
        match self.sweeps.pop_front() {
            Some(sweep) => sweep,
            None => Ok(Self::ring(max_buffer)),
        }
    }

    fn close(&mut self) -> Result<(), ScoutError> {
        self.close_calls += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera returning black frames of a fixed size.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    failures: usize,
    released: Arc<AtomicUsize>,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            failures: 0,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `n` captures with a protocol error.
    pub fn failing(mut self, n: usize) -> Self {
        self.failures = n;
        self
    }

    /// Counter incremented every time the camera is closed.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }
}

impl Peripheral for SimCamera {
    type Sample = CameraFrame;

    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), ScoutError> {
        Ok(())
    }

    fn health(&mut self) -> Result<DeviceHealth, ScoutError> {
        Ok(DeviceHealth::good())
    }

    fn read(&mut self, _max_buffer: usize) -> Result<CameraFrame, ScoutError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ScoutError::DeviceProtocol {
                component: self.id.clone(),
                details: "frame buffer timeout".to_string(),
            });
        }
        Ok(CameraFrame::blank(self.width, self.height))
    }

    fn close(&mut self) -> Result<(), ScoutError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Buzzer
// ────────────────────────────────────────────────────────────────────────────

/// A simulated buzzer that counts how many times it was switched on.
pub struct SimBuzzer {
    id: String,
    state: bool,
    pulses: Arc<AtomicUsize>,
}

impl SimBuzzer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: false,
            pulses: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared off→on transition counter.
    pub fn pulse_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pulses)
    }
}

impl Relay for SimBuzzer {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, active: bool) -> Result<(), ScoutError> {
        if active && !self.state {
            self.pulses.fetch_add(1, Ordering::SeqCst);
        }
        self.state = active;
        Ok(())
    }

    fn state(&self) -> bool {
        self.state
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Thermal sensor
// ────────────────────────────────────────────────────────────────────────────

/// A thermal sensor that always reports the same temperatures.
pub struct SimThermal {
    reading: TemperatureReading,
}

impl SimThermal {
    pub fn new(ambient_c: f32, object_c: f32) -> Self {
        Self {
            reading: TemperatureReading {
                ambient_c,
                object_c,
            },
        }
    }
}

impl ThermalSensor for SimThermal {
    fn id(&self) -> &str {
        "thermal"
    }

    fn read(&mut self) -> Result<TemperatureReading, ScoutError> {
        Ok(self.reading)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Satellite receiver
// ────────────────────────────────────────────────────────────────────────────

/// A scripted positioning stream.  Reports no sentence once the script is
/// exhausted, i.e. the platform is indoors.
#[derive(Default)]
pub struct SimSatellite {
    readings: VecDeque<Result<Option<SatelliteReading>, ScoutError>>,
}

impl SimSatellite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reading(mut self, reading: Result<Option<SatelliteReading>, ScoutError>) -> Self {
        self.readings.push_back(reading);
        self
    }
}

impl SatelliteReceiver for SimSatellite {
    fn read_position(&mut self, _timeout: Duration) -> Result<Option<SatelliteReading>, ScoutError> {
        self.readings.pop_front().unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceHandle;

    #[test]
    fn sim_lidar_serves_script_then_ring() {
        let lidar = SimLidar::new("lidar").with_sweep(Err(SimLidar::protocol_error("crc")));
        let mut handle = DeviceHandle::new(lidar);
        handle.open().unwrap();
        assert!(handle.read(6000).is_err());
        let ring = handle.read(6000).unwrap();
        assert_eq!(ring.point_count(), 360);
        assert_eq!(ring.min_distance(), SimLidar::RING_MM);
    }

    #[test]
    fn sim_lidar_scripted_open_failure() {
        let lidar = SimLidar::new("lidar").with_open(Err(ScoutError::DeviceUnavailable {
            component: "lidar".into(),
            details: "/dev/ttyUSB0 missing".into(),
        }));
        let mut handle = DeviceHandle::new(lidar);
        assert!(handle.open().is_err());
        assert!(handle.open().is_ok());
        assert_eq!(handle.device().open_calls(), 2);
    }

    #[test]
    fn sim_buzzer_counts_rising_edges() {
        let mut buzzer = SimBuzzer::new("buzzer");
        let pulses = buzzer.pulse_counter();
        buzzer.set_state(true).unwrap();
        buzzer.set_state(true).unwrap();
        buzzer.set_state(false).unwrap();
        buzzer.set_state(true).unwrap();
        assert_eq!(pulses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sim_camera_fails_then_recovers() {
        let mut handle = DeviceHandle::new(SimCamera::new("cam", 8, 6).failing(1));
        handle.open().unwrap();
        assert!(handle.read(0).is_err());
        let frame = handle.read(0).unwrap();
        assert_eq!((frame.width, frame.height), (8, 6));
    }

    #[test]
    fn sim_camera_release_is_counted_on_drop() {
        let camera = SimCamera::new("cam", 2, 2);
        let released = camera.release_counter();
        {
            let mut handle = DeviceHandle::new(camera);
            handle.open().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sim_satellite_defaults_to_no_sentence() {
        let mut gps = SimSatellite::new();
        assert_eq!(gps.read_position(Duration::from_secs(1)).unwrap(), None);
    }
}
