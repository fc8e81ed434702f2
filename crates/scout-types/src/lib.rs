use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One return from a ranging sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangingSample {
    /// Bearing of the return, degrees in `[0, 360)`.
    pub angle_deg: f32,
    /// Distance to the target in millimetres (`>= 0`).
    pub distance_mm: f32,
    /// Signal quality reported by the scanner.
    pub quality: u8,
}

impl RangingSample {
    pub fn new(angle_deg: f32, distance_mm: f32, quality: u8) -> Self {
        Self {
            angle_deg,
            distance_mm,
            quality,
        }
    }
}

/// All samples captured during one sweep, in acquisition order.
///
/// Samples are neither sorted nor deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    samples: Vec<RangingSample>,
}

impl ScanResult {
    pub fn new(samples: Vec<RangingSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[RangingSample] {
        &self.samples
    }

    /// Raw number of samples in the sweep, independent of how many of them
    /// end up drawn on a frame.
    pub fn point_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Closest return in millimetres, or `f32::INFINITY` for an empty sweep.
    pub fn min_distance(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| s.distance_mm)
            .fold(f32::INFINITY, f32::min)
    }
}

impl From<Vec<RangingSample>> for ScanResult {
    fn from(samples: Vec<RangingSample>) -> Self {
        Self::new(samples)
    }
}

/// Where a [`LocationFix`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationSource {
    Satellite,
    IpGeolocation,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSource::Satellite => write!(f, "Satellite"),
            LocationSource::IpGeolocation => write!(f, "IpGeolocation"),
        }
    }
}

/// A resolved latitude/longitude estimate with a labelled source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
}

impl LocationFix {
    /// Build a satellite fix. A reading of exactly `(0.0, 0.0)` is what a
    /// receiver without a lock reports, so it yields `None`.
    pub fn satellite(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude == 0.0 && longitude == 0.0 {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            source: LocationSource::Satellite,
        })
    }

    pub fn ip_geolocation(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            source: LocationSource::IpGeolocation,
        }
    }

    /// `"lat,lng"` as stored by the backend, e.g. `"40.0,-73.0"`.
    pub fn location_string(&self) -> String {
        format!("{:?},{:?}", self.latitude, self.longitude)
    }
}

/// Reading from the contactless thermal sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub ambient_c: f32,
    pub object_c: f32,
}

/// Pixel-space box `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Ordered detector output for one frame. An empty set means "nothing
/// detected", which is a valid result and never stands in for a detector
/// failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.detections.iter().map(|d| d.label.clone()).collect()
    }

    /// Label list in the `['a', 'b']` form the path-log backend stores.
    pub fn obstacles_string(&self) -> String {
        let quoted: Vec<String> = self
            .detections
            .iter()
            .map(|d| format!("'{}'", d.label))
            .collect();
        format!("[{}]", quoted.join(", "))
    }
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

/// Authenticated context for every backend write made during one run.
#[derive(Clone)]
pub struct Session {
    pub user_id: String,
    pub token: String,
    pub issued: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("issued", &self.issued)
            .finish()
    }
}

/// Body of `POST /api/log/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLogEntry {
    pub location: Option<String>,
    pub description: String,
    pub miles: f64,
    pub obstacles: String,
    pub steps: usize,
}

/// How the fusion loop reacts to an error at a step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Ends the run (no session, or unusable configuration).
    Fatal,
    /// The ranging device may come back after a reconnect.
    DeviceRecoverable,
    /// Degrades the current cycle only.
    CycleSoft,
    /// Operator asked the run to stop.
    Interrupt,
}

/// Global error type spanning device faults, backend failures and run control.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoutError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error on {component}: {details}")]
    DeviceProtocol { component: String, details: String },

    #[error("Device {component} unavailable: {details}")]
    DeviceUnavailable { component: String, details: String },

    #[error("Sensor {0} unavailable")]
    SensorUnavailable(String),

    #[error("Detection unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Image storage error: {0}")]
    Storage(String),

    #[error("Interrupted by operator")]
    Interrupted,
}

impl ScoutError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScoutError::Auth(_) | ScoutError::Config(_) => ErrorClass::Fatal,
            ScoutError::DeviceProtocol { .. } => ErrorClass::DeviceRecoverable,
            ScoutError::Interrupted => ErrorClass::Interrupt,
            ScoutError::DeviceUnavailable { .. }
            | ScoutError::SensorUnavailable(_)
            | ScoutError::DetectionUnavailable(_)
            | ScoutError::Transport(_)
            | ScoutError::Backend { .. }
            | ScoutError::Storage(_) => ErrorClass::CycleSoft,
        }
    }

    /// `true` for errors that must end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal | ErrorClass::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> Detection {
        Detection {
            label: label.to_string(),
            bbox: BoundingBox {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 10.0,
                y_max: 10.0,
            },
            confidence: 0.9,
        }
    }

    #[test]
    fn empty_scan_min_distance_is_infinite() {
        let scan = ScanResult::default();
        assert!(scan.min_distance().is_infinite());
        assert_eq!(scan.point_count(), 0);
    }

    #[test]
    fn min_distance_picks_closest_sample() {
        let scan = ScanResult::from(vec![
            RangingSample::new(0.0, 500.0, 15),
            RangingSample::new(90.0, 250.0, 15),
            RangingSample::new(180.0, 800.0, 15),
        ]);
        assert_eq!(scan.min_distance(), 250.0);
        assert_eq!(scan.point_count(), 3);
    }

    #[test]
    fn satellite_fix_rejects_null_island() {
        assert!(LocationFix::satellite(0.0, 0.0).is_none());
        let fix = LocationFix::satellite(0.0, 12.5).unwrap();
        assert_eq!(fix.source, LocationSource::Satellite);
    }

    #[test]
    fn location_string_keeps_trailing_decimal() {
        let fix = LocationFix::ip_geolocation(40.0, -73.0);
        assert_eq!(fix.location_string(), "40.0,-73.0");
        let fix = LocationFix::ip_geolocation(40.7128, -74.006);
        assert_eq!(fix.location_string(), "40.7128,-74.006");
    }

    #[test]
    fn obstacles_string_lists_labels_in_order() {
        let set = DetectionSet::from(vec![detection("person"), detection("cone")]);
        assert_eq!(set.obstacles_string(), "['person', 'cone']");
        assert_eq!(set.labels(), vec!["person", "cone"]);
        assert_eq!(DetectionSet::default().obstacles_string(), "[]");
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            user_id: "u-1".to_string(),
            token: "eyJ-secret".to_string(),
            issued: Utc::now(),
        };
        let dbg = format!("{session:?}");
        assert!(!dbg.contains("eyJ-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn error_classes() {
        assert_eq!(ScoutError::Auth("401".into()).class(), ErrorClass::Fatal);
        assert_eq!(
            ScoutError::DeviceProtocol {
                component: "lidar".into(),
                details: "bad descriptor".into()
            }
            .class(),
            ErrorClass::DeviceRecoverable
        );
        assert_eq!(
            ScoutError::Backend {
                status: 500,
                body: String::new()
            }
            .class(),
            ErrorClass::CycleSoft
        );
        assert!(ScoutError::Interrupted.is_terminal());
        assert!(!ScoutError::Storage("disk full".into()).is_terminal());
    }

    #[test]
    fn path_log_entry_serializes_wire_names() {
        let entry = PathLogEntry {
            location: None,
            description: "Automatic path log entry".to_string(),
            miles: 0.0,
            obstacles: "[]".to_string(),
            steps: 0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["location"].is_null());
        assert_eq!(json["steps"], 0);
        assert_eq!(json["obstacles"], "[]");
    }
}
