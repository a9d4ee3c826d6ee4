//! File attributes synthesized from object metadata.
//!
//! Object stores know nothing of directories, so the kind of an entry is
//! derived from the key shape: a key ending with the separator is a
//! directory, anything else is a regular file. [`AttributeResolver::read`]
//! additionally recognizes directories that exist only as a shared key
//! prefix, with no marker object behind them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::trace;

use crate::error::{S3FsError, S3FsResult};
use crate::storage::{ListRequest, ObjectMetadata, ObjectStorage};
use crate::utils::SEPARATOR;

// ---------------------------------------------------------------------------
// BasicFileAttributes
// ---------------------------------------------------------------------------

/// The attribute view every resolved path offers.
pub trait BasicFileAttributes {
    /// Last modification time.
    fn last_modified_time(&self) -> DateTime<Utc>;

    /// Last access time; object stores do not track it separately.
    fn last_access_time(&self) -> DateTime<Utc> {
        self.last_modified_time()
    }

    /// Creation time; object stores do not track it separately.
    fn creation_time(&self) -> DateTime<Utc> {
        self.last_modified_time()
    }

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Whether the entry is a directory.
    fn is_directory(&self) -> bool;

    /// Whether the entry is a regular file.
    fn is_regular_file(&self) -> bool;

    /// Always `false`: object stores have no symbolic links.
    fn is_symbolic_link(&self) -> bool {
        false
    }

    /// Always `false`.
    fn is_other(&self) -> bool {
        false
    }

    /// A key uniquely identifying the entry.
    fn file_key(&self) -> &str;
}

// ---------------------------------------------------------------------------
// S3FileAttributes
// ---------------------------------------------------------------------------

/// Attributes of one bucket entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3FileAttributes {
    key: String,
    last_modified: DateTime<Utc>,
    size: u64,
    is_directory: bool,
}

impl S3FileAttributes {
    /// Attributes of a regular file.
    #[must_use]
    pub fn file(key: impl Into<String>, last_modified: DateTime<Utc>, size: u64) -> Self {
        Self {
            key: key.into(),
            last_modified,
            size,
            is_directory: false,
        }
    }

    /// Attributes of a directory. Directories always report size zero.
    #[must_use]
    pub fn directory(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
            size: 0,
            is_directory: true,
        }
    }
}

impl BasicFileAttributes for S3FileAttributes {
    fn last_modified_time(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_directory(&self) -> bool {
        self.is_directory
    }

    fn is_regular_file(&self) -> bool {
        !self.is_directory
    }

    fn file_key(&self) -> &str {
        &self.key
    }
}

/// Render a timestamp the way attribute summaries show it.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for S3FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S3FileAttributes {{ key: {}, last_modified: {}, size: {}, is_directory: {}, is_regular_file: {} }}",
            self.key,
            format_timestamp(&self.last_modified),
            self.size,
            self.is_directory(),
            self.is_regular_file(),
        )
    }
}

// ---------------------------------------------------------------------------
// AttributeResolver
// ---------------------------------------------------------------------------

/// Synthesizes [`S3FileAttributes`] from store metadata.
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    storage: Arc<dyn ObjectStorage>,
}

impl AttributeResolver {
    /// Create a resolver over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Map one metadata record to attributes.
    ///
    /// A key ending with the separator is a directory: size zero, and the
    /// marker object's timestamp when `metadata` is present (the epoch
    /// otherwise). Any other key is a regular file carrying the metadata's
    /// size and timestamp.
    #[must_use]
    pub fn from_metadata(key: &str, metadata: Option<&ObjectMetadata>) -> S3FileAttributes {
        let last_modified = metadata.map_or(DateTime::<Utc>::UNIX_EPOCH, |m| m.last_modified);
        if key.ends_with(SEPARATOR) {
            S3FileAttributes::directory(key, last_modified)
        } else {
            S3FileAttributes::file(key, last_modified, metadata.map_or(0, |m| m.size))
        }
    }

    /// Resolve the attributes of `bucket`/`key` against the store.
    ///
    /// Lookup order: the bucket root, the object itself, a `key/` marker
    /// object, then any object under `key/`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::NotFound`] when none of the probes match, and
    /// propagates every other storage failure unchanged.
    pub async fn read(&self, bucket: &str, key: &str) -> S3FsResult<S3FileAttributes> {
        let base = key.trim_end_matches(SEPARATOR);
        if base.is_empty() {
            self.storage
                .list_objects(&ListRequest::new(bucket, "").with_max_keys(1))
                .await?;
            return Ok(S3FileAttributes::directory(SEPARATOR, DateTime::<Utc>::UNIX_EPOCH));
        }

        if !key.ends_with(SEPARATOR) {
            match self.storage.head_object(bucket, base).await {
                Ok(metadata) => return Ok(Self::from_metadata(base, Some(&metadata))),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let dir_key = format!("{base}{SEPARATOR}");
        match self.storage.head_object(bucket, &dir_key).await {
            Ok(metadata) => {
                trace!(bucket, key = %dir_key, "resolved directory marker");
                return Ok(Self::from_metadata(&dir_key, Some(&metadata)));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let page = self
            .storage
            .list_objects(&ListRequest::new(bucket, dir_key.as_str()).with_max_keys(1))
            .await?;
        if page.is_empty() {
            return Err(S3FsError::not_found(bucket, key));
        }
        trace!(bucket, key = %dir_key, "resolved virtual directory");
        Ok(Self::from_metadata(&dir_key, None))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::storage::InMemoryStorage;

    fn summary_contains_all(attrs: &S3FileAttributes) {
        let print = attrs.to_string();
        assert!(print.contains(&attrs.is_regular_file().to_string()));
        assert!(print.contains(&attrs.is_directory().to_string()));
        assert!(print.contains(&attrs.size().to_string()));
        assert!(print.contains(&format_timestamp(&attrs.last_modified_time())));
        assert!(print.contains(attrs.file_key()));
    }

    #[test]
    fn test_should_print_basic_info_in_summary() {
        let ts = Utc.timestamp_opt(100, 0).single().expect("test timestamp");
        summary_contains_all(&S3FileAttributes::file("a key", ts, 10));
        let ts = Utc.timestamp_opt(472_931, 0).single().expect("test timestamp");
        summary_contains_all(&S3FileAttributes::file("another complex key", ts, 138_713));
        summary_contains_all(&S3FileAttributes::directory("a dir/", ts));
    }

    #[test]
    fn test_should_map_key_shape_to_kind() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).single().expect("test timestamp");
        let meta = ObjectMetadata {
            key: "ignored".to_owned(),
            size: 42,
            last_modified: ts,
            etag: None,
        };

        let file = AttributeResolver::from_metadata("dir/file", Some(&meta));
        assert!(file.is_regular_file());
        assert!(!file.is_directory());
        assert_eq!(file.size(), 42);
        assert_eq!(file.last_modified_time(), ts);

        let dir = AttributeResolver::from_metadata("dir/", Some(&meta));
        assert!(dir.is_directory());
        assert!(!dir.is_regular_file());
        assert_eq!(dir.size(), 0);
        assert_eq!(dir.last_modified_time(), ts);
        assert!(!dir.is_symbolic_link());
        assert!(!dir.is_other());

        let virtual_dir = AttributeResolver::from_metadata("dir/", None);
        assert_eq!(virtual_dir.last_modified_time(), DateTime::<Utc>::UNIX_EPOCH);
    }

    fn resolver(keys: &[&str]) -> AttributeResolver {
        let storage = InMemoryStorage::new();
        storage.create_bucket("bucket");
        for key in keys {
            storage.put_bytes("bucket", key, bytes::Bytes::from_static(b"12345"));
        }
        AttributeResolver::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn test_should_read_regular_file() {
        let attrs = resolver(&["dir/file"])
            .read("bucket", "dir/file")
            .await
            .expect("test read");
        assert!(attrs.is_regular_file());
        assert_eq!(attrs.size(), 5);
        assert_eq!(attrs.file_key(), "dir/file");
    }

    #[tokio::test]
    async fn test_should_read_directory_marker() {
        let storage = InMemoryStorage::new();
        storage.put_directory("bucket", "dir");
        let attrs = AttributeResolver::new(Arc::new(storage))
            .read("bucket", "dir")
            .await
            .expect("test read");
        assert!(attrs.is_directory());
        assert_eq!(attrs.file_key(), "dir/");
        assert_ne!(attrs.last_modified_time(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_should_infer_directory_without_marker() {
        let resolver = resolver(&["dir/sub/file"]);
        let attrs = resolver.read("bucket", "dir").await.expect("test read");
        assert!(attrs.is_directory());
        assert_eq!(attrs.size(), 0);
        assert_eq!(attrs.last_modified_time(), DateTime::<Utc>::UNIX_EPOCH);
        assert!(resolver.read("bucket", "dir/sub/").await.is_ok());
    }

    #[tokio::test]
    async fn test_should_treat_bucket_root_as_directory() {
        let attrs = resolver(&[]).read("bucket", "").await.expect("test read");
        assert!(attrs.is_directory());
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_entry() {
        let resolver = resolver(&["dir/file"]);
        let err = resolver.read("bucket", "dir/fil").await.expect_err("test missing");
        assert!(err.is_not_found());
        assert!(resolver.read("missing-bucket", "").await.is_err());
    }
}
