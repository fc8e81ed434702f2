//! [`SyncClient`] – authenticated, best-effort persistence to the backend.
//!
//! Authentication happens once per run and is the only call whose failure
//! is fatal.  Every save is independent: a failed location save never stops
//! the path-log save that follows it.
//!
//! # Endpoints
//!
//! | Call | Path | Success |
//! |---|---|---|
//! | [`SyncClient::authenticate`] | `POST /api/user/login` | `200` |
//! | [`SyncClient::save_location`] | `POST /api/location/create` | `200`/`201` |
//! | [`SyncClient::save_image_reference`] | `POST /api/attachment/create` | `200`/`201` |
//! | [`SyncClient::save_path_log`] | `POST /api/log/create` | `200`/`201` |

use std::time::Duration;

use chrono::{Local, Utc};
use scout_types::{LocationFix, PathLogEntry, ScoutError, Session};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:6001";

/// Upper bound on every backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const LOGIN_PATH: &str = "/api/user/login";
const LOCATION_PATH: &str = "/api/location/create";
const ATTACHMENT_PATH: &str = "/api/attachment/create";
const PATH_LOG_PATH: &str = "/api/log/create";

// ─────────────────────────────────────────────────────────────────────────────
// Transport seam
// ─────────────────────────────────────────────────────────────────────────────

/// Status and raw body of one backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// JSON-over-HTTP POST to the backend.
pub trait Transport: Send {
    /// POST `body` to `path`, attaching `Authorization: Bearer` when `bearer`
    /// is set.  Any HTTP status is `Ok`; only I/O failures are errors.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Transport`] if the request cannot be completed.
    fn post_json(
        &mut self,
        path: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<TransportResponse, ScoutError>;
}

/// Blocking `reqwest` transport rooted at a base URL.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScoutError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build backend client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &mut self,
        path: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<TransportResponse, ScoutError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|e| ScoutError::Transport(format!("POST {path} failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ScoutError::Transport(format!("reading {path} response failed: {e}")))?;
        Ok(TransportResponse { status, body })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncClient
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to one best-effort save.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The backend accepted the record.
    Sent,
    /// Nothing to send; no request was made.
    Skipped,
    /// The request failed or was rejected.  Already logged.
    Failed(ScoutError),
}

impl SyncOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SyncOutcome::Sent)
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    user: Option<LoginUser>,
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct LoginUser {
    #[serde(rename = "_id")]
    id: Option<String>,
}

pub struct SyncClient {
    transport: Box<dyn Transport>,
    session: Option<Session>,
}

impl SyncClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Log in and keep the session for every later save.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Auth`] for any status other than `200`, an
    /// unreachable backend, or a response missing `user._id`/`accessToken`.
    pub fn authenticate(&mut self, email: &str, password: &str) -> Result<Session, ScoutError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .transport
            .post_json(LOGIN_PATH, None, &body)
            .map_err(|e| ScoutError::Auth(e.to_string()))?;
        if response.status != 200 {
            return Err(ScoutError::Auth(format!(
                "login returned HTTP {}: {}",
                response.status, response.body
            )));
        }
        let parsed: LoginResponse = serde_json::from_str(&response.body)
            .map_err(|e| ScoutError::Auth(format!("malformed login response: {e}")))?;
        let user_id = parsed
            .user
            .and_then(|u| u.id)
            .ok_or_else(|| ScoutError::Auth("login response has no user id".into()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScoutError::Auth("login response has no access token".into()))?;

        let session = Session {
            user_id,
            token,
            issued: Utc::now(),
        };
        info!(user_id = %session.user_id, "authenticated");
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Save the cycle's position.  `None` is skipped.
    pub fn save_location(&mut self, fix: Option<&LocationFix>) -> SyncOutcome {
        let Some(fix) = fix else {
            info!("no location data to save");
            return SyncOutcome::Skipped;
        };
        let body = json!({
            "location": fix.location_string(),
            "title": format!("Auto-location {}", Local::now().format("%Y-%m-%d %H:%M")),
        });
        self.post("location", LOCATION_PATH, &body)
    }

    /// Record an uploaded image.  `None` or an empty URL is skipped.
    pub fn save_image_reference(&mut self, url: Option<&str>) -> SyncOutcome {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            info!("no image URL to save");
            return SyncOutcome::Skipped;
        };
        let key = url.rsplit('/').next().unwrap_or(url);
        let body = json!({
            "url": url,
            "key": key,
            "mimeType": "image/jpeg",
        });
        self.post("image reference", ATTACHMENT_PATH, &body)
    }

    pub fn save_path_log(&mut self, entry: &PathLogEntry) -> SyncOutcome {
        match serde_json::to_value(entry) {
            Ok(body) => self.post("path log", PATH_LOG_PATH, &body),
            Err(e) => {
                warn!(error = %e, "failed to encode path log");
                SyncOutcome::Failed(ScoutError::Transport(e.to_string()))
            }
        }
    }

    fn post(&mut self, what: &str, path: &str, body: &Value) -> SyncOutcome {
        let Some(token) = self.session.as_ref().map(|s| s.token.clone()) else {
            warn!(record = what, "not authenticated; dropping record");
            return SyncOutcome::Failed(ScoutError::Auth("no session".into()));
        };
        match self.transport.post_json(path, Some(&token), body) {
            Ok(r) if r.status == 200 || r.status == 201 => {
                info!(record = what, status = r.status, "saved");
                SyncOutcome::Sent
            }
            Ok(r) => {
                warn!(record = what, status = r.status, body = %r.body, "backend rejected record");
                SyncOutcome::Failed(ScoutError::Backend {
                    status: r.status,
                    body: r.body,
                })
            }
            Err(e) => {
                warn!(record = what, error = %e, "failed to save record");
                SyncOutcome::Failed(e)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording transport (tests)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// One request as seen by [`RecordingTransport`].
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub path: String,
        pub bearer: Option<String>,
        pub body: Value,
    }

    /// Answers each path with a fixed status (default `201`) and records
    /// every request into a shared log.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        pub log: Arc<Mutex<Vec<Recorded>>>,
        statuses: HashMap<String, u16>,
        login_body: Option<String>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default().with_login(
                200,
                r#"{"user":{"_id":"u-42"},"accessToken":"tok-abc"}"#,
            )
        }

        pub fn with_status(mut self, path: &str, status: u16) -> Self {
            self.statuses.insert(path.to_string(), status);
            self
        }

        pub fn with_login(mut self, status: u16, body: &str) -> Self {
            self.statuses.insert(LOGIN_PATH.to_string(), status);
            self.login_body = Some(body.to_string());
            self
        }

        pub fn paths(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|r| r.path.clone()).collect()
        }

        pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.path == path)
                .cloned()
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn post_json(
            &mut self,
            path: &str,
            bearer: Option<&str>,
            body: &Value,
        ) -> Result<TransportResponse, ScoutError> {
            self.log.lock().unwrap().push(Recorded {
                path: path.to_string(),
                bearer: bearer.map(str::to_string),
                body: body.clone(),
            });
            let status = self.statuses.get(path).copied().unwrap_or(201);
            let body = if path == LOGIN_PATH {
                self.login_body.clone().unwrap_or_default()
            } else {
                r#"{"message":"ok"}"#.to_string()
            };
            Ok(TransportResponse { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingTransport;
    use super::*;

    fn authed(transport: RecordingTransport) -> SyncClient {
        let mut client = SyncClient::new(Box::new(transport));
        client.authenticate("ops@example.com", "hunter2").unwrap();
        client
    }

    fn entry() -> PathLogEntry {
        PathLogEntry {
            location: Some("40.0,-73.0".into()),
            description: "Automatic path log entry".into(),
            miles: 0.0,
            obstacles: "['person']".into(),
            steps: 3,
        }
    }

    #[test]
    fn authenticate_builds_session() {
        let transport = RecordingTransport::new();
        let mut client = SyncClient::new(Box::new(transport.clone()));
        let session = client.authenticate("ops@example.com", "hunter2").unwrap();
        assert_eq!(session.user_id, "u-42");
        assert_eq!(session.token, "tok-abc");
        let login = &transport.requests_to(LOGIN_PATH)[0];
        assert_eq!(login.bearer, None);
        assert_eq!(login.body["email"], "ops@example.com");
    }

    #[test]
    fn authenticate_rejects_non_200() {
        let transport = RecordingTransport::new().with_login(401, r#"{"error":"bad credentials"}"#);
        let mut client = SyncClient::new(Box::new(transport));
        let err = client.authenticate("a", "b").unwrap_err();
        assert!(matches!(err, ScoutError::Auth(ref m) if m.contains("401")));
        assert!(client.session().is_none());
    }

    #[test]
    fn authenticate_rejects_201() {
        let transport = RecordingTransport::new().with_login(201, r#"{"user":{"_id":"u"},"accessToken":"t"}"#);
        let mut client = SyncClient::new(Box::new(transport));
        assert!(client.authenticate("a", "b").is_err());
    }

    #[test]
    fn authenticate_requires_token_and_user() {
        let transport = RecordingTransport::new().with_login(200, r#"{"user":{"_id":"u"}}"#);
        let mut client = SyncClient::new(Box::new(transport));
        assert!(matches!(client.authenticate("a", "b"), Err(ScoutError::Auth(_))));

        let transport = RecordingTransport::new().with_login(200, r#"{"accessToken":"t"}"#);
        let mut client = SyncClient::new(Box::new(transport));
        assert!(matches!(client.authenticate("a", "b"), Err(ScoutError::Auth(_))));
    }

    #[test]
    fn location_body_and_bearer() {
        let transport = RecordingTransport::new();
        let mut client = authed(transport.clone());
        let fix = LocationFix::ip_geolocation(40.0, -73.0);
        assert_eq!(client.save_location(Some(&fix)), SyncOutcome::Sent);
        let sent = &transport.requests_to(LOCATION_PATH)[0];
        assert_eq!(sent.bearer.as_deref(), Some("tok-abc"));
        assert_eq!(sent.body["location"], "40.0,-73.0");
        let title = sent.body["title"].as_str().unwrap();
        assert!(title.starts_with("Auto-location "));
        assert_eq!(title.len(), "Auto-location 2024-01-01 12:00".len());
    }

    #[test]
    fn missing_inputs_skip_without_request() {
        let transport = RecordingTransport::new();
        let mut client = authed(transport.clone());
        assert_eq!(client.save_location(None), SyncOutcome::Skipped);
        assert_eq!(client.save_image_reference(None), SyncOutcome::Skipped);
        assert_eq!(client.save_image_reference(Some("")), SyncOutcome::Skipped);
        assert_eq!(transport.paths(), vec![LOGIN_PATH.to_string()]);
    }

    #[test]
    fn image_reference_key_is_last_segment() {
        let transport = RecordingTransport::new();
        let mut client = authed(transport.clone());
        let url = "https://scout.s3.eu-west-1.amazonaws.com/image_20240101120000.jpg";
        assert!(client.save_image_reference(Some(url)).is_sent());
        let sent = &transport.requests_to(ATTACHMENT_PATH)[0];
        assert_eq!(sent.body["key"], "image_20240101120000.jpg");
        assert_eq!(sent.body["mimeType"], "image/jpeg");
        assert_eq!(sent.body["url"], url);
    }

    #[test]
    fn failed_location_does_not_block_path_log() {
        let transport = RecordingTransport::new().with_status(LOCATION_PATH, 500);
        let mut client = authed(transport.clone());
        let fix = LocationFix::ip_geolocation(40.0, -73.0);
        let outcome = client.save_location(Some(&fix));
        assert!(matches!(outcome, SyncOutcome::Failed(ScoutError::Backend { status: 500, .. })));
        assert!(client.save_path_log(&entry()).is_sent());
        assert_eq!(transport.requests_to(PATH_LOG_PATH).len(), 1);
    }

    #[test]
    fn path_log_wire_shape() {
        let transport = RecordingTransport::new();
        let mut client = authed(transport.clone());
        client.save_path_log(&entry());
        let body = &transport.requests_to(PATH_LOG_PATH)[0].body;
        assert_eq!(body["description"], "Automatic path log entry");
        assert_eq!(body["miles"], 0.0);
        assert_eq!(body["obstacles"], "['person']");
        assert_eq!(body["steps"], 3);
    }

    #[test]
    fn saves_without_session_fail_locally() {
        let transport = RecordingTransport::new();
        let mut client = SyncClient::new(Box::new(transport.clone()));
        assert!(matches!(client.save_path_log(&entry()), SyncOutcome::Failed(ScoutError::Auth(_))));
        assert!(transport.paths().is_empty());
    }

    #[test]
    fn http_transport_trims_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:6001/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(transport.base_url(), DEFAULT_BACKEND_URL);
    }
}
