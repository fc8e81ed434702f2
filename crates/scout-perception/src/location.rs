//! [`LocationResolver`] – satellite fix first, IP geolocation otherwise.
//!
//! The preference is decided fresh every cycle because the platform moves
//! between indoor and outdoor zones.  There is no blending between sources.
//! A missing fix is a normal outcome: the cycle carries on with its location
//! fields marked unavailable.

use std::time::Duration;

use scout_hal::positioning::{SatelliteReading, SatelliteReceiver};
use scout_types::{LocationFix, ScoutError};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// How long one positioning read may wait for a sentence.
pub const DEFAULT_POSITION_TIMEOUT: Duration = Duration::from_secs(1);

/// Public "where am I" endpoint used for the indoor fallback.
pub const DEFAULT_IP_GEOLOCATION_URL: &str = "https://ipinfo.io/json";

/// Degraded location source that is reachable indoors.
pub trait IpGeolocator: Send {
    /// Return `(latitude, longitude)` for the current network egress.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Transport`] when the lookup cannot be made or
    /// the response carries no coordinates.
    fn locate(&mut self) -> Result<(f64, f64), ScoutError>;
}

/// Arbitrates between the satellite receiver and the IP fallback.
pub struct LocationResolver {
    satellite: Box<dyn SatelliteReceiver>,
    fallback: Box<dyn IpGeolocator>,
    read_timeout: Duration,
}

impl LocationResolver {
    pub fn new(satellite: Box<dyn SatelliteReceiver>, fallback: Box<dyn IpGeolocator>) -> Self {
        Self {
            satellite,
            fallback,
            read_timeout: DEFAULT_POSITION_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// `true` iff the receiver currently reports an active, non-zero fix.
    ///
    /// Read and decode failures count as indoors; they are never returned.
    pub fn is_outdoor(&mut self) -> bool {
        self.read_valid_fix().is_some()
    }

    /// Resolve this cycle's location, or `None` when neither source has one.
    ///
    /// The reading that decides "outdoor" is the one reported, so a single
    /// positioning read is made per call.
    pub fn resolve(&mut self) -> Option<LocationFix> {
        if let Some(fix) = self
            .read_valid_fix()
            .and_then(|r| LocationFix::satellite(r.latitude, r.longitude))
        {
            info!(lat = fix.latitude, lng = fix.longitude, source = %fix.source, "location resolved");
            return Some(fix);
        }

        match self.fallback.locate() {
            Ok((lat, lng)) => {
                let fix = LocationFix::ip_geolocation(lat, lng);
                info!(lat, lng, source = %fix.source, "location resolved");
                Some(fix)
            }
            Err(e) => {
                warn!(error = %e, "IP geolocation failed; location unavailable");
                None
            }
        }
    }

    fn read_valid_fix(&mut self) -> Option<SatelliteReading> {
        match self.satellite.read_position(self.read_timeout) {
            Ok(Some(reading)) if reading.is_valid_fix() => Some(reading),
            Ok(Some(reading)) => {
                debug!(?reading, "satellite reading is not a valid fix");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "positioning read failed; assuming indoors");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP fallback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
}

/// Looks up the egress IP's coordinates from an ipinfo-style endpoint that
/// answers `{"loc": "lat,lng", …}`.
pub struct HttpIpGeolocator {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpIpGeolocator {
    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScoutError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build geolocation client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl IpGeolocator for HttpIpGeolocator {
    fn locate(&mut self) -> Result<(f64, f64), ScoutError> {
        let response: IpInfoResponse = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| ScoutError::Transport(format!("geolocation lookup failed: {e}")))?;
        response
            .loc
            .as_deref()
            .and_then(parse_lat_lng)
            .ok_or_else(|| ScoutError::Transport("geolocation response has no coordinates".into()))
    }
}

/// Parse `"lat,lng"` into a coordinate pair.
fn parse_lat_lng(raw: &str) -> Option<(f64, f64)> {
    let (lat, lng) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
}
