//! `scout-perception` – turns raw peripheral output into the per-cycle view
//! of the world.
//!
//! # Modules
//!
//! - [`ranging`] – [`RangingDeviceController`][ranging::RangingDeviceController]:
//!   the connect/scan/reconnect state machine around the 2-D scanner, plus the
//!   [`ProximityPolicy`][ranging::ProximityPolicy].
//! - [`location`] – [`LocationResolver`][location::LocationResolver]: hard
//!   preference between a satellite fix and an IP-geolocation fallback.
//! - [`annotate`] – [`FrameAnnotator`][annotate::FrameAnnotator]: draws
//!   ranging points and sensor text onto a captured frame.
//! - [`detection`] – [`DetectionGate`][detection::DetectionGate]: runs the
//!   object detector once per cycle and decides whether to alert.

pub mod annotate;
pub mod detection;
mod font;
pub mod location;
pub mod ranging;

pub use annotate::FrameAnnotator;
pub use detection::{DetectionGate, DetectionVerdict, Detector, HttpDetector, ScriptedDetector};
pub use location::{HttpIpGeolocator, IpGeolocator, LocationResolver};
pub use ranging::{
    ConnectionState, ProximityPolicy, RangingAvailability, RangingDeviceController, ScanOutcome,
};
