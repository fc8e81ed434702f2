//! [`DetectionGate`] – one detector invocation per cycle plus the alert
//! decision.
//!
//! "Nothing detected" and "detector unavailable" are different outcomes: the
//! first is an empty [`DetectionSet`], the second an
//! [`ScoutError::DetectionUnavailable`] that the loop logs as a soft failure.

use std::collections::VecDeque;
use std::time::Duration;

use scout_hal::camera::CameraFrame;
use scout_types::{BoundingBox, Detection, DetectionSet, ScoutError};
use serde::Deserialize;
use tracing::{debug, info};

/// An object detector over RGB frames.
pub trait Detector: Send {
    /// Run inference on `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error when the model cannot be invoked; an empty result is
    /// `Ok` with an empty set.
    fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionSet, ScoutError>;
}

/// Detections for one frame and whether they warrant the detection alert.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionVerdict {
    pub detections: DetectionSet,
    pub alert: bool,
}

pub struct DetectionGate {
    detector: Box<dyn Detector>,
    min_confidence: f32,
}

impl DetectionGate {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self {
            detector,
            min_confidence: 0.0,
        }
    }

    /// Drop detections scoring below `min_confidence`.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Invoke the detector once and classify the result.
    ///
    /// # Errors
    ///
    /// Any detector failure is returned as
    /// [`ScoutError::DetectionUnavailable`], never as an empty set.
    pub fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionVerdict, ScoutError> {
        let raw = self.detector.detect(frame).map_err(|e| match e {
            ScoutError::DetectionUnavailable(_) => e,
            other => ScoutError::DetectionUnavailable(other.to_string()),
        })?;
        let kept: Vec<Detection> = raw
            .detections()
            .iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .cloned()
            .collect();
        let detections = DetectionSet::new(kept);
        let alert = !detections.is_empty();
        if alert {
            info!(labels = ?detections.labels(), "objects detected");
        } else {
            debug!("no objects detected");
        }
        Ok(DetectionVerdict { detections, alert })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP inference endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the inference server's response, in the `xyxy` layout.
#[derive(Deserialize)]
struct InferenceRow {
    name: String,
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
    confidence: f32,
}

/// Detector served over HTTP: the frame is POSTed as `image/jpeg` and the
/// server answers with a JSON array of `xyxy` rows.
pub struct HttpDetector {
    url: String,
    client: reqwest::blocking::Client,
    jpeg_quality: u8,
}

impl HttpDetector {
    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScoutError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build detector client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
            jpeg_quality: 90,
        })
    }
}

impl Detector for HttpDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionSet, ScoutError> {
        let jpeg = frame
            .to_jpeg(self.jpeg_quality)
            .map_err(|e| ScoutError::DetectionUnavailable(e.to_string()))?;
        let rows: Vec<InferenceRow> = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| ScoutError::DetectionUnavailable(format!("inference request failed: {e}")))?;
        Ok(rows.into_iter().map(InferenceRow::into_detection).collect::<Vec<_>>().into())
    }
}

impl InferenceRow {
    fn into_detection(self) -> Detection {
        Detection {
            label: self.name,
            bbox: BoundingBox {
                x_min: self.xmin,
                y_min: self.ymin,
                x_max: self.xmax,
                y_max: self.ymax,
            },
            confidence: self.confidence,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted detector
// ─────────────────────────────────────────────────────────────────────────────

/// A detector that replays queued results, then reports nothing detected.
/// Used by simulated runs and tests.
#[derive(Default)]
pub struct ScriptedDetector {
    results: VecDeque<Result<DetectionSet, ScoutError>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: Result<DetectionSet, ScoutError>) -> Self {
        self.results.push_back(result);
        self
    }

    /// Queue a result containing one detection per label.
    pub fn with_labels(self, labels: &[&str]) -> Self {
        let set: DetectionSet = labels
            .iter()
            .map(|label| Detection {
                label: label.to_string(),
                bbox: BoundingBox {
                    x_min: 0.0,
                    y_min: 0.0,
                    x_max: 1.0,
                    y_max: 1.0,
                },
                confidence: 1.0,
            })
            .collect::<Vec<_>>()
            .into();
        self.with_result(Ok(set))
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &CameraFrame) -> Result<DetectionSet, ScoutError> {
        self.results.pop_front().unwrap_or_else(|| Ok(DetectionSet::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> CameraFrame {
        CameraFrame::blank(8, 8)
    }

    #[test]
    fn empty_result_is_not_an_error_and_does_not_alert() {
        let mut gate = DetectionGate::new(Box::new(ScriptedDetector::new()));
        let verdict = gate.detect(&frame()).unwrap();
        assert!(verdict.detections.is_empty());
        assert!(!verdict.alert);
    }

    #[test]
    fn non_empty_result_alerts_and_keeps_order() {
        let detector = ScriptedDetector::new().with_labels(&["person", "cone"]);
        let mut gate = DetectionGate::new(Box::new(detector));
        let verdict = gate.detect(&frame()).unwrap();
        assert!(verdict.alert);
        assert_eq!(verdict.detections.labels(), vec!["person", "cone"]);
    }

    #[test]
    fn detector_failure_propagates_as_unavailable() {
        let detector = ScriptedDetector::new().with_result(Err(ScoutError::Transport("refused".into())));
        let mut gate = DetectionGate::new(Box::new(detector));
        let err = gate.detect(&frame()).unwrap_err();
        assert!(matches!(err, ScoutError::DetectionUnavailable(ref msg) if msg.contains("refused")));
    }

    #[test]
    fn low_confidence_detections_are_filtered() {
        let mut set: Vec<Detection> = Vec::new();
        for (label, confidence) in [("person", 0.9), ("cone", 0.2)] {
            set.push(Detection {
                label: label.into(),
                bbox: BoundingBox {
                    x_min: 0.0,
                    y_min: 0.0,
                    x_max: 2.0,
                    y_max: 2.0,
                },
                confidence,
            });
        }
        let detector = ScriptedDetector::new().with_result(Ok(set.into()));
        let mut gate = DetectionGate::new(Box::new(detector)).with_min_confidence(0.5);
        let verdict = gate.detect(&frame()).unwrap();
        assert_eq!(verdict.detections.labels(), vec!["person"]);
    }

    #[test]
    fn inference_rows_map_to_detections() {
        let rows: Vec<InferenceRow> = serde_json::from_str(
            r#"[{"name":"person","xmin":1.0,"ymin":2.0,"xmax":30.0,"ymax":40.0,"confidence":0.87,"class":0}]"#,
        )
        .unwrap();
        let detections: Vec<Detection> = rows.into_iter().map(InferenceRow::into_detection).collect();
        assert_eq!(detections[0].label, "person");
        assert_eq!(detections[0].bbox.x_max, 30.0);
    }
}
