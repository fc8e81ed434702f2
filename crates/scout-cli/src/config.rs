//! Configuration vault – reads/writes `~/.scout/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_runtime::storage::{ObjectStoreCredentials, ObjectStoreTarget};
use scout_runtime::FusionLoopConfig;
use zeroize::Zeroizing;

/// Persisted configuration stored in `~/.scout/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the logging backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Timeout applied to every HTTP call (backend, geolocation, upload).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,

    /// Stop after this many cycles; absent runs until Ctrl-C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,

    #[serde(default = "default_proximity_threshold_mm")]
    pub proximity_threshold_mm: f32,

    /// Ranging overlay scale, pixels per millimetre.
    #[serde(default = "default_scale_px_per_mm")]
    pub scale_px_per_mm: f32,

    /// Where frames are written when no bucket is configured.
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Object-detection endpoint.  Empty disables detection.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detector_url: String,

    #[serde(default)]
    pub min_confidence: f32,

    #[serde(default = "default_geolocation_url")]
    pub geolocation_url: String,

    /// Last account used; offered as the default at the login prompt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub s3_bucket: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aws_region: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aws_access_key_id: String,

    /// Stored as plain text; the file is created owner-only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aws_secret_access_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cycle_interval_secs", &self.cycle_interval_secs)
            .field("error_cooldown_secs", &self.error_cooldown_secs)
            .field("max_cycles", &self.max_cycles)
            .field("proximity_threshold_mm", &self.proximity_threshold_mm)
            .field("scale_px_per_mm", &self.scale_px_per_mm)
            .field("image_dir", &self.image_dir)
            .field("detector_url", &self.detector_url)
            .field("min_confidence", &self.min_confidence)
            .field("geolocation_url", &self.geolocation_url)
            .field("email", &self.email)
            .field("s3_bucket", &self.s3_bucket)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field(
                "aws_secret_access_key",
                if self.aws_secret_access_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

fn default_backend_url() -> String {
    scout_runtime::sync_client::DEFAULT_BACKEND_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_cycle_interval_secs() -> u64 {
    5
}
fn default_error_cooldown_secs() -> u64 {
    5
}
fn default_proximity_threshold_mm() -> f32 {
    scout_perception::ranging::DEFAULT_PROXIMITY_THRESHOLD_MM
}
fn default_scale_px_per_mm() -> f32 {
    scout_perception::annotate::DEFAULT_SCALE_PX_PER_MM
}
fn default_image_dir() -> PathBuf {
    PathBuf::from(scout_runtime::storage::DEFAULT_IMAGE_DIR)
}
fn default_geolocation_url() -> String {
    scout_perception::location::DEFAULT_IP_GEOLOCATION_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            cycle_interval_secs: default_cycle_interval_secs(),
            error_cooldown_secs: default_error_cooldown_secs(),
            max_cycles: None,
            proximity_threshold_mm: default_proximity_threshold_mm(),
            scale_px_per_mm: default_scale_px_per_mm(),
            image_dir: default_image_dir(),
            detector_url: String::new(),
            min_confidence: 0.0,
            geolocation_url: default_geolocation_url(),
            email: String::new(),
            s3_bucket: String::new(),
            aws_region: String::new(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn loop_config(&self) -> FusionLoopConfig {
        FusionLoopConfig {
            cycle_interval: Duration::from_secs(self.cycle_interval_secs),
            error_cooldown: Duration::from_secs(self.error_cooldown_secs),
            proximity_threshold_mm: self.proximity_threshold_mm,
            scale_px_per_mm: self.scale_px_per_mm,
            max_cycles: self.max_cycles,
            ..FusionLoopConfig::default()
        }
    }

    /// Upload target, or `None` when no bucket is configured.
    ///
    /// Credentials are attached only when both halves of the key pair are
    /// present.
    pub fn object_store_target(&self) -> Result<Option<ObjectStoreTarget>, String> {
        if self.s3_bucket.is_empty() {
            return Ok(None);
        }
        if self.aws_region.is_empty() {
            return Err(format!(
                "bucket {} is configured but AWS_REGION is not set",
                self.s3_bucket
            ));
        }
        let credentials = (!self.aws_access_key_id.is_empty()
            && !self.aws_secret_access_key.is_empty())
        .then(|| ObjectStoreCredentials {
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: Zeroizing::new(self.aws_secret_access_key.clone()),
        });
        Ok(Some(ObjectStoreTarget {
            bucket: self.s3_bucket.clone(),
            region: self.aws_region.clone(),
            credentials,
        }))
    }
}

/// Return the path to `~/.scout/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".scout").join("config.toml")
}

/// Load the config with environment overrides applied.  A missing file
/// yields the defaults.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file as written.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SCOUT_BACKEND_URL` | `backend_url` |
/// | `SCOUT_CYCLE_INTERVAL_SECS` | `cycle_interval_secs` |
/// | `SCOUT_PROXIMITY_THRESHOLD_MM` | `proximity_threshold_mm` |
/// | `SCOUT_IMAGE_DIR` | `image_dir` |
/// | `SCOUT_DETECTOR_URL` | `detector_url` |
/// | `SCOUT_MAX_CYCLES` | `max_cycles` |
/// | `S3_BUCKET_NAME` | `s3_bucket` |
/// | `AWS_REGION` | `aws_region` |
/// | `AWS_ACCESS_KEY_ID` | `aws_access_key_id` |
/// | `AWS_SECRET_ACCESS_KEY` | `aws_secret_access_key` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SCOUT_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Ok(v) = std::env::var("SCOUT_CYCLE_INTERVAL_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.cycle_interval_secs = secs;
    }
    if let Ok(v) = std::env::var("SCOUT_PROXIMITY_THRESHOLD_MM")
        && let Ok(mm) = v.parse::<f32>()
        && mm.is_finite()
        && mm > 0.0
    {
        cfg.proximity_threshold_mm = mm;
    }
    if let Ok(v) = std::env::var("SCOUT_IMAGE_DIR") {
        cfg.image_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SCOUT_DETECTOR_URL") {
        cfg.detector_url = v;
    }
    if let Ok(v) = std::env::var("SCOUT_MAX_CYCLES")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.max_cycles = Some(n);
    }
    if let Ok(v) = std::env::var("S3_BUCKET_NAME") {
        cfg.s3_bucket = v;
    }
    if let Ok(v) = std::env::var("AWS_REGION") {
        cfg.aws_region = v;
    }
    if let Ok(v) = std::env::var("AWS_ACCESS_KEY_ID") {
        cfg.aws_access_key_id = v;
    }
    if let Ok(v) = std::env::var("AWS_SECRET_ACCESS_KEY") {
        cfg.aws_secret_access_key = v;
    }
}

/// Save the config to disk, creating `~/.scout/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret_key() {
        let mut cfg = Config::default();
        cfg.aws_secret_access_key = "wJalrXUtnFEMI-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("wJalrXUtnFEMI-secret"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn debug_shows_not_set_for_empty_secret() {
        let debug_str = format!("{:?}", Config::default());
        assert!(debug_str.contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.backend_url, "http://localhost:6001");
        assert_eq!(loaded.request_timeout_secs, 10);
        assert_eq!(loaded.cycle_interval_secs, 5);
        assert_eq!(loaded.proximity_threshold_mm, 300.0);
        assert_eq!(loaded.image_dir, PathBuf::from("/tmp"));
        assert!(loaded.max_cycles.is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backend_url = \"http://robot:6001\"\nmax_cycles = 3\n").unwrap();
        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.backend_url, "http://robot:6001");
        assert_eq!(loaded.max_cycles, Some(3));
        assert_eq!(loaded.error_cooldown_secs, 5);
    }

    #[test]
    fn config_path_points_to_scout_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".scout"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn loop_config_carries_intervals() {
        let mut cfg = Config::default();
        cfg.cycle_interval_secs = 2;
        cfg.max_cycles = Some(4);
        let lc = cfg.loop_config();
        assert_eq!(lc.cycle_interval, Duration::from_secs(2));
        assert_eq!(lc.error_cooldown, Duration::from_secs(5));
        assert_eq!(lc.max_cycles, Some(4));
        assert_eq!(lc.max_buffer, 6000);
    }

    #[test]
    fn object_store_target_requires_bucket_and_region() {
        let mut cfg = Config::default();
        assert!(cfg.object_store_target().unwrap().is_none());

        cfg.s3_bucket = "scout-frames".into();
        assert!(cfg.object_store_target().is_err());

        cfg.aws_region = "eu-west-1".into();
        let target = cfg.object_store_target().unwrap().unwrap();
        assert!(target.credentials.is_none());
        assert_eq!(target.host(), "scout-frames.s3.eu-west-1.amazonaws.com");

        cfg.aws_access_key_id = "AKID".into();
        cfg.aws_secret_access_key = "secret".into();
        let target = cfg.object_store_target().unwrap().unwrap();
        assert_eq!(target.credentials.unwrap().access_key_id, "AKID");
    }

    #[test]
    fn apply_env_overrides_changes_backend_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SCOUT_BACKEND_URL", "http://robot-host:6001") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.backend_url, "http://robot-host:6001");
        unsafe { std::env::remove_var("SCOUT_BACKEND_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_cycle_interval() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SCOUT_CYCLE_INTERVAL_SECS", "12") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.cycle_interval_secs, 12);
        unsafe { std::env::remove_var("SCOUT_CYCLE_INTERVAL_SECS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_threshold() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SCOUT_PROXIMITY_THRESHOLD_MM", "close") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.proximity_threshold_mm, 300.0);
        unsafe { std::env::set_var("SCOUT_PROXIMITY_THRESHOLD_MM", "-5") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.proximity_threshold_mm, 300.0);
        unsafe { std::env::remove_var("SCOUT_PROXIMITY_THRESHOLD_MM") };
    }

    #[test]
    fn apply_env_overrides_changes_image_dir() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SCOUT_IMAGE_DIR", "/var/lib/scout") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.image_dir, PathBuf::from("/var/lib/scout"));
        unsafe { std::env::remove_var("SCOUT_IMAGE_DIR") };
    }
}
