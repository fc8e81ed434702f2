//! Image persistence: local disk, or upload to an S3 bucket.
//!
//! Only an upload produces a public URL, and only a URL is worth an
//! attachment record on the backend.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use scout_types::ScoutError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zeroize::Zeroizing;

pub const DEFAULT_IMAGE_DIR: &str = "/tmp";

/// Where one annotated frame ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// File name, `image_YYYYmmddHHMMSS.jpg`.
    pub key: String,
    pub path: PathBuf,
    /// Public URL when the image was uploaded.
    pub url: Option<String>,
}

pub trait ImageSink: Send {
    /// Persist an encoded JPEG captured at `taken_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::Storage`] when the image cannot be written or
    /// uploaded.
    fn store(&mut self, jpeg: &[u8], taken_at: DateTime<Local>) -> Result<StoredImage, ScoutError>;
}

pub fn image_key(taken_at: DateTime<Local>) -> String {
    format!("image_{}.jpg", taken_at.format("%Y%m%d%H%M%S"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Local directory
// ─────────────────────────────────────────────────────────────────────────────

pub struct LocalImageSink {
    dir: PathBuf,
}

impl LocalImageSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSink for LocalImageSink {
    fn store(&mut self, jpeg: &[u8], taken_at: DateTime<Local>) -> Result<StoredImage, ScoutError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ScoutError::Storage(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let key = image_key(taken_at);
        let path = self.dir.join(&key);
        fs::write(&path, jpeg)
            .map_err(|e| ScoutError::Storage(format!("cannot write {}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = jpeg.len(), "image saved");
        Ok(StoredImage {
            key,
            path,
            url: None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// S3 bucket
// ─────────────────────────────────────────────────────────────────────────────

/// Access key pair used to sign uploads.
#[derive(Clone)]
pub struct ObjectStoreCredentials {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
}

impl fmt::Debug for ObjectStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStoreTarget {
    pub bucket: String,
    pub region: String,
    /// Without credentials the PUT is sent unsigned, which only succeeds on
    /// buckets whose policy allows anonymous writes.
    pub credentials: Option<ObjectStoreCredentials>,
}

impl ObjectStoreTarget {
    pub fn host(&self) -> String {
        format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
    }

    /// Public URL of `key` in this bucket.
    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.host(), key)
    }
}

/// Writes the frame locally, then PUTs it to the bucket.
pub struct ObjectStoreSink {
    staging: LocalImageSink,
    target: ObjectStoreTarget,
    client: reqwest::blocking::Client,
}

impl ObjectStoreSink {
    /// # Errors
    ///
    /// Returns [`ScoutError::Config`] if the HTTP client cannot be built.
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        target: ObjectStoreTarget,
        timeout: Duration,
    ) -> Result<Self, ScoutError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoutError::Config(format!("failed to build upload client: {e}")))?;
        Ok(Self {
            staging: LocalImageSink::new(staging_dir),
            target,
            client,
        })
    }

    pub fn target(&self) -> &ObjectStoreTarget {
        &self.target
    }
}

impl ImageSink for ObjectStoreSink {
    fn store(&mut self, jpeg: &[u8], taken_at: DateTime<Local>) -> Result<StoredImage, ScoutError> {
        let mut stored = self.staging.store(jpeg, taken_at)?;
        let url = self.target.object_url(&stored.key);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg");
        if let Some(credentials) = &self.target.credentials {
            let signed = sign_put(&self.target, credentials, &stored.key, jpeg, Utc::now())?;
            request = request
                .header("x-amz-date", signed.amz_date)
                .header("x-amz-content-sha256", signed.payload_hash)
                .header(reqwest::header::AUTHORIZATION, signed.authorization);
        } else {
            debug!(bucket = %self.target.bucket, "uploading without credentials");
        }

        request
            .body(jpeg.to_vec())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScoutError::Storage(format!("upload of {} failed: {e}", stored.key)))?;

        info!(url = %url, "image uploaded");
        stored.url = Some(url);
        Ok(stored)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AWS Signature Version 4 (single-chunk PUT)
// ─────────────────────────────────────────────────────────────────────────────

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedHeaders {
    amz_date: String,
    payload_hash: String,
    authorization: String,
}

fn sign_put(
    target: &ObjectStoreTarget,
    credentials: &ObjectStoreCredentials,
    key: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedHeaders, ScoutError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(payload));

    // Keys are `image_<digits>.jpg`, which need no URI escaping.
    let canonical_request = format!(
        "PUT\n/{key}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
        host = target.host(),
    );
    let scope = format!("{date_stamp}/{}/s3/aws4_request", target.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = signing_key(&credentials.secret_access_key, &date_stamp, &target.region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
        payload_hash,
    })
}

fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<[u8; 32], ScoutError> {
    let secret = Zeroizing::new(format!("AWS4{secret}"));
    let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], ScoutError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ScoutError::Storage(format!("signing key rejected: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn taken_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn target(credentials: Option<ObjectStoreCredentials>) -> ObjectStoreTarget {
        ObjectStoreTarget {
            bucket: "scout-frames".into(),
            region: "eu-west-1".into(),
            credentials,
        }
    }

    fn credentials() -> ObjectStoreCredentials {
        ObjectStoreCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: Zeroizing::new("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into()),
        }
    }

    #[test]
    fn image_key_format() {
        assert_eq!(image_key(taken_at()), "image_20240309140507.jpg");
    }

    #[test]
    fn local_sink_writes_file_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = LocalImageSink::new(dir.path().join("frames"));
        let stored = sink.store(&[0xFF, 0xD8, 0xFF], taken_at()).unwrap();
        assert_eq!(stored.url, None);
        assert_eq!(stored.key, "image_20240309140507.jpg");
        assert_eq!(fs::read(&stored.path).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn local_sink_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let mut sink = LocalImageSink::new(&blocker);
        let err = sink.store(&[1, 2, 3], taken_at()).unwrap_err();
        assert!(matches!(err, ScoutError::Storage(_)));
    }

    #[test]
    fn object_url_format() {
        assert_eq!(
            target(None).object_url("image_20240309140507.jpg"),
            "https://scout-frames.s3.eu-west-1.amazonaws.com/image_20240309140507.jpg"
        );
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let dbg = format!("{:?}", credentials());
        assert!(dbg.contains("AKIDEXAMPLE"));
        assert!(!dbg.contains("EXAMPLEKEY"));
    }

    #[test]
    fn hmac_matches_rfc4231_case_1() {
        let mac = hmac_sha256(&[0x0b; 20], b"Hi There").unwrap();
        assert_eq!(
            hex::encode(mac),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn hmac_hashes_keys_longer_than_one_block() {
        // RFC 4231 test case 6: 131-byte key.
        let mac = hmac_sha256(
            &[0xaa; 131],
            b"Test Using Larger Than Block-Size Key - Hash Key First",
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn signing_key_matches_aws_reference() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signed_put_headers_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let signed = sign_put(&target(Some(credentials())), &credentials(), "image_1.jpg", b"jpeg", now).unwrap();
        assert_eq!(signed.amz_date, "20240309T140507Z");
        assert_eq!(signed.payload_hash, hex::encode(Sha256::digest(b"jpeg")));
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240309/eu-west-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
        let again = sign_put(&target(Some(credentials())), &credentials(), "image_1.jpg", b"jpeg", now).unwrap();
        assert_eq!(signed, again);
    }
}
