//! The mounted filesystem instance.
//!
//! An [`S3FileSystem`] ties one endpoint and credential identity to a
//! storage handle. Paths keep a shared reference to the filesystem that
//! created them; equality of paths is scoped by that identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::info;

use crate::config::S3FsConfig;
use crate::error::{S3FsError, S3FsResult};
use crate::path::S3Path;
use crate::provider::Registry;
use crate::storage::ObjectStorage;
use crate::transfer::MultipartOptions;
use crate::uri::S3_SCHEME;
use crate::utils::SEPARATOR;

/// Registry key of an open filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSystemKey {
    /// URI scheme, always `s3`.
    pub scheme: String,
    /// Endpoint host; empty for the default endpoint.
    pub host: String,
    /// Credential identity (the access key, or empty).
    pub access_key: String,
}

impl FileSystemKey {
    /// Build the key for `host` opened with `config`'s credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, config: &S3FsConfig) -> Self {
        Self {
            scheme: S3_SCHEME.to_owned(),
            host: host.into(),
            access_key: config.credential_identity().to_owned(),
        }
    }
}

/// A hierarchical view over the buckets of one endpoint.
pub struct S3FileSystem {
    key: FileSystemKey,
    storage: Arc<dyn ObjectStorage>,
    config: S3FsConfig,
    closed: AtomicBool,
    registry: Weak<Registry>,
}

impl std::fmt::Debug for S3FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FileSystem")
            .field("key", &self.key)
            .field("storage", &self.storage)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl S3FileSystem {
    /// Create a standalone filesystem that is not tracked by any provider.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        storage: Arc<dyn ObjectStorage>,
        config: S3FsConfig,
    ) -> Arc<Self> {
        Self::registered(FileSystemKey::new(endpoint, &config), storage, config, Weak::new())
    }

    pub(crate) fn registered(
        key: FileSystemKey,
        storage: Arc<dyn ObjectStorage>,
        config: S3FsConfig,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        info!(scheme = %key.scheme, host = %key.host, "opened filesystem");
        Arc::new(Self {
            key,
            storage,
            config,
            closed: AtomicBool::new(false),
            registry,
        })
    }

    /// The registry key of this filesystem.
    #[must_use]
    pub fn key(&self) -> &FileSystemKey {
        &self.key
    }

    /// The endpoint host; empty for the default endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.key.host
    }

    /// The URI of the filesystem root, e.g. `s3://localhost:4566/`.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}://{}/", self.key.scheme, self.key.host)
    }

    /// The storage collaborator.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// The configuration the filesystem was opened with.
    #[must_use]
    pub fn config(&self) -> &S3FsConfig {
        &self.config
    }

    /// The path separator.
    #[must_use]
    pub fn separator(&self) -> &'static str {
        SEPARATOR
    }

    /// Transfer options derived from the configuration.
    #[must_use]
    pub fn multipart_options(&self) -> MultipartOptions {
        MultipartOptions::from_config(&self.config)
    }

    /// Whether [`close`](Self::close) has not been called yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Fail with [`S3FsError::ClosedFileSystem`] once the filesystem is closed.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::ClosedFileSystem`] after [`close`](Self::close).
    pub fn ensure_open(&self) -> S3FsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(S3FsError::ClosedFileSystem { uri: self.uri() })
        }
    }

    /// Close the filesystem and release its registry slot.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(&self.key, |_, fs| std::ptr::eq(Arc::as_ptr(fs), self));
        }
        info!(uri = %self.uri(), "closed filesystem");
    }

    /// Build a path by joining `first` and `more` with the separator.
    #[must_use]
    pub fn path(self: &Arc<Self>, first: &str, more: &[&str]) -> S3Path {
        S3Path::parse(self, first, more)
    }

    /// One absolute path per bucket visible to the credentials.
    ///
    /// # Errors
    ///
    /// Propagates storage failures and [`S3FsError::ClosedFileSystem`].
    pub async fn root_directories(self: &Arc<Self>) -> S3FsResult<Vec<S3Path>> {
        self.ensure_open()?;
        let buckets = self.storage.list_buckets().await?;
        Ok(buckets
            .iter()
            .map(|bucket| S3Path::from_bucket_key(self, bucket, ""))
            .collect())
    }
}
