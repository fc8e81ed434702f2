//! [`FusionLoop`] – the perceive, annotate, detect, persist cycle.
//!
//! Each cycle, in a fixed order:
//!
//! 1. **Temperature** – best effort; a failed read renders as "Unavailable".
//! 2. **Ranging** – one sweep when the scanner is connected, then the
//!    proximity alert if anything is inside the threshold.
//! 3. **Location** – satellite fix or IP fallback via [`LocationResolver`].
//! 4. **Frame** – capture, overlay ranging points and the text summary.
//! 5. **Detection** – one detector call and the detection alert.
//! 6. **Image** – stored through the [`ImageSink`]; an uploaded image gets an
//!    attachment record.
//! 7. **Records** – location and path log, each independently best effort.
//! 8. **Sleep** – the cycle interval, cut short by a shutdown request.
//!
//! A cycle in which the scanner had to be reconnected (or was lost) skips
//! steps 6 and 7.  Any other cycle failure plays the error pattern and waits
//! out the cool-down before the next cycle.  Authentication failure and a
//! shutdown request end the run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use scout_hal::sim::{SimBuzzer, SimCamera, SimLidar, SimSatellite};
//! use scout_perception::{DetectionGate, HttpIpGeolocator, LocationResolver,
//!     RangingDeviceController, ScriptedDetector};
//! use scout_runtime::alert::AlertController;
//! use scout_runtime::fusion_loop::{FusionLoop, FusionLoopConfig, Peripherals};
//! use scout_runtime::storage::LocalImageSink;
//! use scout_runtime::sync_client::{HttpTransport, SyncClient, DEFAULT_BACKEND_URL,
//!     DEFAULT_REQUEST_TIMEOUT};
//!
//! let peripherals = Peripherals {
//!     ranging: RangingDeviceController::new(SimLidar::new("lidar")),
//!     camera: SimCamera::new("camera", 640, 480),
//!     thermal: None,
//!     location: LocationResolver::new(
//!         Box::new(SimSatellite::new()),
//!         Box::new(HttpIpGeolocator::new("https://ipinfo.io/json", DEFAULT_REQUEST_TIMEOUT).unwrap()),
//!     ),
//!     detection: DetectionGate::new(Box::new(ScriptedDetector::new())),
//!     alerts: AlertController::new(Box::new(SimBuzzer::new("buzzer"))),
//! };
//! let sync = SyncClient::new(Box::new(
//!     HttpTransport::new(DEFAULT_BACKEND_URL, DEFAULT_REQUEST_TIMEOUT).unwrap(),
//! ));
//! let mut fusion = FusionLoop::new(
//!     FusionLoopConfig::default(),
//!     peripherals,
//!     sync,
//!     Box::new(LocalImageSink::new("/tmp")),
//!     Arc::new(AtomicBool::new(false)),
//! );
//! fusion.start("ops@example.com", "secret").unwrap();
//! let summary = fusion.run().unwrap();
//! println!("{} cycles", summary.cycles);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use scout_hal::camera::{Camera, CameraFrame};
use scout_hal::device::{DeviceHandle, Peripheral};
use scout_hal::thermal::ThermalSensor;
use scout_perception::annotate::{DEFAULT_SCALE_PX_PER_MM, FrameAnnotator};
use scout_perception::ranging::{DEFAULT_MAX_BUFFER, DEFAULT_PROXIMITY_THRESHOLD_MM};
use scout_perception::{
    DetectionGate, LocationResolver, ProximityPolicy, RangingAvailability,
    RangingDeviceController, ScanOutcome,
};
use scout_types::{
    DetectionSet, LocationFix, PathLogEntry, ScanResult, ScoutError, Session, TemperatureReading,
};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::alert::{AlertController, AlertPattern};
use crate::storage::{ImageSink, StoredImage};
use crate::sync_client::{SyncClient, SyncOutcome};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const PATH_LOG_DESCRIPTION: &str = "Automatic path log entry";

/// `obstacles` value logged when the detector could not be reached.
pub const OBSTACLES_UNAVAILABLE: &str = "unavailable";

/// Granularity at which sleeps notice a shutdown request.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`FusionLoop`].
#[derive(Debug, Clone)]
pub struct FusionLoopConfig {
    /// Pause after a completed cycle.
    pub cycle_interval: Duration,
    /// Pause after a failed cycle.
    pub error_cooldown: Duration,
    /// Raw measurements buffered per ranging sweep.
    pub max_buffer: usize,
    pub proximity_threshold_mm: f32,
    pub scale_px_per_mm: f32,
    pub jpeg_quality: u8,
    pub proximity_alert: AlertPattern,
    pub detection_alert: AlertPattern,
    pub error_alert: AlertPattern,
    /// Stop after this many cycles.  `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for FusionLoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5),
            error_cooldown: Duration::from_secs(5),
            max_buffer: DEFAULT_MAX_BUFFER,
            proximity_threshold_mm: DEFAULT_PROXIMITY_THRESHOLD_MM,
            scale_px_per_mm: DEFAULT_SCALE_PX_PER_MM,
            jpeg_quality: 90,
            proximity_alert: AlertPattern::PROXIMITY,
            detection_alert: AlertPattern::DETECTION,
            error_alert: AlertPattern::ERROR,
            max_cycles: None,
        }
    }
}

/// The devices and capabilities the loop drives.
pub struct Peripherals<L: Peripheral<Sample = ScanResult>, C: Camera> {
    pub ranging: RangingDeviceController<L>,
    pub camera: C,
    pub thermal: Option<Box<dyn ThermalSensor>>,
    pub location: LocationResolver,
    pub detection: DetectionGate,
    pub alerts: AlertController,
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycle output
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of steps 6 and 7.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceReport {
    pub image: Option<StoredImage>,
    pub image_reference: SyncOutcome,
    pub location: SyncOutcome,
    pub path_log: SyncOutcome,
}

/// Everything one cycle sensed and produced.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub cycle: u64,
    pub temperature: Option<TemperatureReading>,
    pub scan: Option<ScanResult>,
    pub fix: Option<LocationFix>,
    /// `None` when the detector was unavailable.
    pub detections: Option<DetectionSet>,
    /// Raw sample count of this cycle's sweep; `0` without one.
    pub point_count: usize,
    pub annotated_frame: CameraFrame,
    /// `None` when persistence was skipped after a ranging fault.
    pub persistence: Option<PersistenceReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// FusionLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct FusionLoop<L: Peripheral<Sample = ScanResult>, C: Camera> {
    config: FusionLoopConfig,
    ranging: RangingDeviceController<L>,
    camera: DeviceHandle<C>,
    thermal: Option<Box<dyn ThermalSensor>>,
    location: LocationResolver,
    annotator: FrameAnnotator,
    detection: DetectionGate,
    proximity: ProximityPolicy,
    alerts: AlertController,
    sync: SyncClient,
    images: Box<dyn ImageSink>,
    shutdown: Arc<AtomicBool>,
    cycle: u64,
    released: bool,
}

impl<L: Peripheral<Sample = ScanResult>, C: Camera> FusionLoop<L, C> {
    pub fn new(
        config: FusionLoopConfig,
        peripherals: Peripherals<L, C>,
        sync: SyncClient,
        images: Box<dyn ImageSink>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let Peripherals {
            ranging,
            camera,
            thermal,
            location,
            detection,
            alerts,
        } = peripherals;
        Self {
            annotator: FrameAnnotator::new(config.scale_px_per_mm),
            proximity: ProximityPolicy::new(config.proximity_threshold_mm),
            config,
            ranging,
            camera: DeviceHandle::new(camera),
            thermal,
            location,
            detection,
            alerts,
            sync,
            images,
            shutdown,
            cycle: 0,
            released: false,
        }
    }

    pub fn config(&self) -> &FusionLoopConfig {
        &self.config
    }

    pub fn ranging(&self) -> &RangingDeviceController<L> {
        &self.ranging
    }

    pub fn camera(&self) -> &DeviceHandle<C> {
        &self.camera
    }

    pub fn session(&self) -> Option<&Session> {
        self.sync.session()
    }

    /// Shared flag that stops the run when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Authenticate, then bring up the scanner and the camera.
    ///
    /// Nothing is opened when authentication fails.  A scanner that cannot be
    /// connected leaves ranging absent for the run; a camera that cannot be
    /// opened is retried at every capture.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Interrupted`] without contacting the backend if
    /// shutdown was already requested, and [`ScoutError::Auth`] when the
    /// backend refuses the credentials.
    pub fn start(&mut self, email: &str, password: &str) -> Result<Session, ScoutError> {
        self.check_shutdown()?;
        let session = self.sync.authenticate(email, password)?;

        if let Err(e) = self.ranging.connect() {
            warn!(error = %e, "ranging unavailable; continuing without it");
        }
        if let Err(e) = self.camera.open() {
            warn!(camera = self.camera.id(), error = %e, "camera failed to open");
        }
        Ok(session)
    }

    /// Run cycles until shutdown, a terminal error, or `max_cycles`.
    ///
    /// Peripherals are released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Auth`] if [`start`][Self::start] has not
    /// succeeded, or any other terminal error raised by a cycle.
    pub fn run(&mut self) -> Result<RunSummary, ScoutError> {
        let result = self.run_cycles();
        self.shutdown();
        result
    }

    fn run_cycles(&mut self) -> Result<RunSummary, ScoutError> {
        let user_id = match self.sync.session() {
            Some(session) => session.user_id.clone(),
            None => return Err(ScoutError::Auth("run started without a session".into())),
        };
        let run_id = Uuid::new_v4();
        let span = info_span!("fusion_loop", %run_id, %user_id);
        let _enter = span.enter();
        info!(ranging = ?self.ranging.availability(), "fusion loop started");

        let mut summary = RunSummary::default();
        loop {
            if self.shutdown_requested() {
                info!("shutdown requested");
                break;
            }
            if self.limit_reached(summary.cycles) {
                break;
            }
            summary.cycles += 1;
            match self.run_cycle() {
                Ok(record) => {
                    debug!(
                        cycle = record.cycle,
                        points = record.point_count,
                        persisted = record.persistence.is_some(),
                        "cycle complete"
                    );
                    if !self.limit_reached(summary.cycles) {
                        self.pause(self.config.cycle_interval);
                    }
                }
                Err(ScoutError::Interrupted) => {
                    info!("cycle interrupted by shutdown request");
                    break;
                }
                Err(e) if e.is_terminal() => {
                    error!(error = %e, "terminal error; stopping");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    error!(error = %e, class = ?e.class(), "cycle failed");
                    self.alerts.play(self.config.error_alert);
                    self.pause(self.config.error_cooldown);
                }
            }
        }
        info!(cycles = summary.cycles, failed = summary.failed_cycles, "fusion loop finished");
        Ok(summary)
    }

    /// Release the scanner and the camera and silence the buzzer.  Runs at
    /// most once; also invoked on drop.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.ranging.release();
        if let Err(e) = self.camera.close() {
            warn!(camera = self.camera.id(), error = %e, "camera close failed");
        }
        self.alerts.silence();
        info!("shutdown complete");
    }

    // -------------------------------------------------------------------------
    // One cycle
    // -------------------------------------------------------------------------

    /// Execute steps 1–7 once.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Interrupted`] when a shutdown is requested
    /// between steps, or the capture error when no frame could be taken.
    pub fn run_cycle(&mut self) -> Result<CycleRecord, ScoutError> {
        self.cycle += 1;
        let span = info_span!("cycle", n = self.cycle);
        let _enter = span.enter();

        // ── 1. Temperature ────────────────────────────────────────────────────
        let temperature = self.read_temperature();

        // ── 2. Ranging ────────────────────────────────────────────────────────
        let (scan, ranging_faulted) = self.sweep();
        let point_count = scan.as_ref().map_or(0, ScanResult::point_count);
        self.check_shutdown()?;

        // ── 3. Location ───────────────────────────────────────────────────────
        let fix = self.location.resolve();
        self.check_shutdown()?;

        // ── 4. Frame ──────────────────────────────────────────────────────────
        let mut frame = self.capture()?;
        if let Some(scan) = &scan {
            frame = self.annotator.project_ranging(frame, scan);
        }
        let frame = self
            .annotator
            .overlay_text(frame, temperature.as_ref(), fix.as_ref());
        self.check_shutdown()?;

        // ── 5. Detection ──────────────────────────────────────────────────────
        let detections = match self.detection.detect(&frame) {
            Ok(verdict) => {
                if verdict.alert {
                    self.alerts.play(self.config.detection_alert);
                }
                Some(verdict.detections)
            }
            Err(e) => {
                warn!(error = %e, "detection unavailable this cycle");
                None
            }
        };
        self.check_shutdown()?;

        // ── 6–7. Persistence ──────────────────────────────────────────────────
        let persistence = if ranging_faulted {
            info!("skipping persistence after ranging fault");
            None
        } else {
            Some(self.persist(&frame, fix.as_ref(), detections.as_ref(), point_count))
        };

        Ok(CycleRecord {
            cycle: self.cycle,
            temperature,
            scan,
            fix,
            detections,
            point_count,
            annotated_frame: frame,
            persistence,
        })
    }

    fn read_temperature(&mut self) -> Option<TemperatureReading> {
        let sensor = self.thermal.as_mut()?;
        match sensor.read() {
            Ok(reading) => {
                info!(ambient_c = reading.ambient_c, object_c = reading.object_c, "temperature");
                Some(reading)
            }
            Err(e) => {
                warn!(sensor = sensor.id(), error = %e, "temperature read failed");
                None
            }
        }
    }

    /// The sweep, if any, and whether the scanner faulted this cycle.
    fn sweep(&mut self) -> (Option<ScanResult>, bool) {
        if self.ranging.availability() != RangingAvailability::Connected {
            return (None, false);
        }
        match self.ranging.scan(self.config.max_buffer) {
            Ok(ScanOutcome::Sweep(scan)) => {
                info!(points = scan.point_count(), "ranging sweep complete");
                if let Some(distance_mm) = self.proximity.breach(&scan) {
                    warn!(distance_mm, threshold_mm = self.proximity.threshold_mm(), "object within proximity threshold");
                    self.alerts.play(self.config.proximity_alert);
                }
                (Some(scan), false)
            }
            Ok(ScanOutcome::Recovered { error }) => {
                warn!(error = %error, "ranging recovered after reconnect");
                (None, true)
            }
            Ok(ScanOutcome::Lost { error }) => {
                warn!(error = %error, "ranging lost for the rest of the run");
                (None, true)
            }
            Err(e) => {
                warn!(error = %e, "ranging scan refused");
                (None, false)
            }
        }
    }

    fn capture(&mut self) -> Result<CameraFrame, ScoutError> {
        if !self.camera.is_open() {
            self.camera.open()?;
        }
        match self.camera.read(1) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                // Reopen on the next cycle.
                if let Err(close_err) = self.camera.close() {
                    warn!(camera = self.camera.id(), error = %close_err, "camera close after read fault failed");
                }
                Err(e)
            }
        }
    }

    fn persist(
        &mut self,
        frame: &CameraFrame,
        fix: Option<&LocationFix>,
        detections: Option<&DetectionSet>,
        point_count: usize,
    ) -> PersistenceReport {
        let image = match frame
            .to_jpeg(self.config.jpeg_quality)
            .and_then(|jpeg| self.images.store(&jpeg, Local::now()))
        {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(error = %e, "image not persisted");
                None
            }
        };
        let image_reference = self
            .sync
            .save_image_reference(image.as_ref().and_then(|i| i.url.as_deref()));
        let location = self.sync.save_location(fix);
        let path_log = self.sync.save_path_log(&PathLogEntry {
            location: fix.map(LocationFix::location_string),
            description: PATH_LOG_DESCRIPTION.to_string(),
            miles: 0.0,
            obstacles: detections.map_or_else(
                || OBSTACLES_UNAVAILABLE.to_string(),
                DetectionSet::obstacles_string,
            ),
            steps: point_count,
        });
        PersistenceReport {
            image,
            image_reference,
            location,
            path_log,
        }
    }

    // -------------------------------------------------------------------------
    // Run control
    // -------------------------------------------------------------------------

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn check_shutdown(&self) -> Result<(), ScoutError> {
        if self.shutdown_requested() {
            Err(ScoutError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn limit_reached(&self, cycles: u64) -> bool {
        self.config.max_cycles.is_some_and(|max| cycles >= max)
    }

    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.shutdown_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}

impl<L: Peripheral<Sample = ScanResult>, C: Camera> Drop for FusionLoop<L, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
