//! S3 filesystem configuration.
//!
//! Provides [`S3FsConfig`] for configuring a mounted S3 filesystem: the
//! credentials and endpoint handed to the storage adapter, and the transfer
//! and listing knobs used by the core. Values are loaded from environment
//! variables and can be overridden by the key/value map passed when a
//! filesystem is opened.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{S3FsError, S3FsResult};

/// Environment-map key for the access key.
pub const ACCESS_KEY: &str = "access_key";
/// Environment-map key for the secret key.
pub const SECRET_KEY: &str = "secret_key";
/// Environment-map key for the endpoint override.
pub const ENDPOINT: &str = "endpoint";
/// Environment-map key for path-style addressing.
pub const PATH_STYLE_ACCESS: &str = "path_style_access";
/// Environment-map key for the region.
pub const REGION: &str = "region";
/// Environment-map key for the multipart chunk size in bytes.
pub const UPLOAD_CHUNK_SIZE: &str = "upload_chunk_size";
/// Environment-map key for the part worker pool size.
pub const UPLOAD_MAX_THREADS: &str = "upload_max_threads";

/// Default multipart chunk size (8 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// S3 filesystem configuration.
///
/// # Examples
///
/// ```
/// use ruststack_s3fs_core::config::S3FsConfig;
///
/// let config = S3FsConfig::builder()
///     .endpoint(Some("localhost:4566".to_owned()))
///     .path_style_access(true)
///     .build();
/// assert_eq!(config.max_keys, 1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3FsConfig {
    /// Access key credential.
    #[builder(default)]
    pub access_key: Option<String>,

    /// Secret key credential.
    #[builder(default)]
    pub secret_key: Option<String>,

    /// Endpoint host override (e.g. `"localhost:4566"`).
    #[builder(default)]
    pub endpoint: Option<String>,

    /// Whether to address buckets in the path rather than the host name.
    #[builder(default = false)]
    pub path_style_access: bool,

    /// Region the storage client signs requests for.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,

    /// Multipart part size in bytes; `0` disables splitting.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Maximum number of part requests in flight for one transfer.
    #[builder(default = 8)]
    pub max_concurrency: usize,

    /// Page size requested from the store when listing.
    #[builder(default = 1000)]
    pub max_keys: usize,

    /// Default tracing filter (e.g. `"info"`, `"debug"`) used when `RUST_LOG`
    /// is unset.
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for S3FsConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            endpoint: None,
            path_style_access: false,
            region: String::from("us-east-1"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: 8,
            max_keys: 1000,
            log_level: String::from("info"),
        }
    }
}

impl S3FsConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3FS_ACCESS_KEY` / `AWS_ACCESS_KEY_ID` | *(unset)* |
    /// | `S3FS_SECRET_KEY` / `AWS_SECRET_ACCESS_KEY` | *(unset)* |
    /// | `S3FS_ENDPOINT` | *(unset)* |
    /// | `S3FS_PATH_STYLE_ACCESS` | `false` |
    /// | `S3FS_REGION` / `AWS_REGION` | `us-east-1` |
    /// | `S3FS_CHUNK_SIZE` | `8388608` |
    /// | `S3FS_MAX_CONCURRENCY` | `8` |
    /// | `S3FS_MAX_KEYS` | `1000` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_any(&["S3FS_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]) {
            config.access_key = Some(v);
        }
        if let Some(v) = env_any(&["S3FS_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]) {
            config.secret_key = Some(v);
        }
        if let Ok(v) = std::env::var("S3FS_ENDPOINT") {
            config.endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("S3FS_PATH_STYLE_ACCESS") {
            config.path_style_access = parse_bool(&v);
        }
        if let Some(v) = env_any(&["S3FS_REGION", "AWS_REGION"]) {
            config.region = v;
        }
        if let Ok(v) = std::env::var("S3FS_CHUNK_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                config.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("S3FS_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("S3FS_MAX_KEYS") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_keys = n;
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Overlay the key/value map supplied when opening a filesystem.
    ///
    /// Entries in `env` take precedence over values already present.
    /// Unrecognized keys are ignored.
    #[must_use]
    pub fn with_env_map<S: std::hash::BuildHasher>(
        mut self,
        env: &HashMap<String, String, S>,
    ) -> Self {
        if let Some(v) = env.get(ACCESS_KEY) {
            self.access_key = Some(v.clone());
        }
        if let Some(v) = env.get(SECRET_KEY) {
            self.secret_key = Some(v.clone());
        }
        if let Some(v) = env.get(ENDPOINT) {
            self.endpoint = Some(v.clone());
        }
        if let Some(v) = env.get(PATH_STYLE_ACCESS) {
            self.path_style_access = parse_bool(v);
        }
        if let Some(v) = env.get(REGION) {
            self.region.clone_from(v);
        }
        if let Some(n) = env.get(UPLOAD_CHUNK_SIZE).and_then(|v| v.parse().ok()) {
            self.chunk_size = n;
        }
        if let Some(n) = env.get(UPLOAD_MAX_THREADS).and_then(|v| v.parse().ok()) {
            self.max_concurrency = n;
        }
        self
    }

    /// Check the numeric settings.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] when `max_concurrency` or
    /// `max_keys` is zero.
    pub fn validate(&self) -> S3FsResult<()> {
        if self.max_concurrency == 0 {
            return Err(S3FsError::invalid_argument(
                "max_concurrency must be greater than zero",
            ));
        }
        if self.max_keys == 0 {
            return Err(S3FsError::invalid_argument(
                "max_keys must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The credential identity used to key open filesystems.
    #[must_use]
    pub fn credential_identity(&self) -> &str {
        self.access_key.as_deref().unwrap_or("")
    }
}

/// Read the first set variable among `names`.
fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
