//! Storage collaborator interface.
//!
//! The filesystem core never talks to a concrete S3 client. Everything it
//! needs from the store is expressed by [`ObjectStorage`]: metadata fetch,
//! paginated delimiter listing, single-shot object calls, and the
//! part-oriented multipart capabilities. [`memory::InMemoryStorage`] is a
//! deterministic implementation used by tests and embedders; the
//! `ruststack-s3fs-aws` crate provides the SDK-backed one.

pub mod memory;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{S3FsError, S3FsResult};

pub use memory::InMemoryStorage;

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// Metadata for a single object, as reported by `HEAD` or a listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// The object key.
    pub key: String,
    /// Content length in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Entity tag, when the store reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Parameters of one paginated listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Bucket to list.
    pub bucket: String,
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Grouping delimiter; `None` lists the whole subtree flat.
    pub delimiter: Option<String>,
    /// Cursor returned by the previous truncated page.
    pub continuation_token: Option<String>,
    /// Maximum number of entries (keys plus common prefixes) per page.
    pub max_keys: usize,
}

impl ListRequest {
    /// Create a request for the first page under `prefix`.
    #[must_use]
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            delimiter: None,
            continuation_token: None,
            max_keys: 1000,
        }
    }

    /// Group keys on `delimiter`.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Continue from a previous page.
    #[must_use]
    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    /// Limit the page size.
    #[must_use]
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }
}

/// One page of a delimiter listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// The prefix that was listed.
    pub prefix: String,
    /// The delimiter that was applied.
    pub delimiter: Option<String>,
    /// Direct keys under the prefix, in key order.
    pub objects: Vec<ObjectMetadata>,
    /// One level of grouped sub-prefixes, each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// Cursor for the next page; present whenever `is_truncated` is set.
    pub next_continuation_token: Option<String>,
    /// Whether more entries follow this page.
    pub is_truncated: bool,
}

impl ListingPage {
    /// Iterate over the direct keys of this page.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }

    /// Number of entries (keys plus common prefixes) on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len() + self.common_prefixes.len()
    }

    /// Whether the page carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the page invariants.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::Internal`] if a truncated page has no
    /// continuation token or the page repeats a key.
    pub fn validate(&self) -> S3FsResult<()> {
        if self.is_truncated
            && self
                .next_continuation_token
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(anyhow::anyhow!(
                "truncated listing of prefix {:?} carries no continuation token",
                self.prefix
            )
            .into());
        }
        let mut seen = std::collections::HashSet::with_capacity(self.objects.len());
        if let Some(dup) = self.keys().find(|k| !seen.insert(*k)) {
            return Err(anyhow::anyhow!("listing repeats key {dup:?}").into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

/// Identity of an initiated multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultipartHandle {
    /// Target bucket.
    pub bucket: String,
    /// Target key.
    pub key: String,
    /// Store-issued session identifier.
    pub upload_id: String,
}

/// A finished part, as submitted at completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part index.
    pub part_number: u32,
    /// ETag the store returned for the part.
    pub etag: String,
}

// ---------------------------------------------------------------------------
// CannedAcl
// ---------------------------------------------------------------------------

/// Coarse access-control setting passed through to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CannedAcl {
    /// Owner gets `FULL_CONTROL`; no one else has access (default).
    #[default]
    Private,
    /// The `AllUsers` group gets `READ` access.
    PublicRead,
    /// The `AllUsers` group gets `READ` and `WRITE` access.
    PublicReadWrite,
    /// The `AuthenticatedUsers` group gets `READ` access.
    AuthenticatedRead,
    /// Bucket owner gets `READ` access.
    BucketOwnerRead,
    /// Both the object owner and the bucket owner get `FULL_CONTROL`.
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Return the header value of the canned ACL.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
            Self::BucketOwnerRead => "bucket-owner-read",
            Self::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CannedAcl {
    type Err = S3FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            "bucket-owner-read" => Ok(Self::BucketOwnerRead),
            "bucket-owner-full-control" => Ok(Self::BucketOwnerFullControl),
            _ => Err(S3FsError::invalid_argument(format!("unknown canned ACL: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectStorage
// ---------------------------------------------------------------------------

/// The capabilities the filesystem core requires from an object store.
///
/// Implementations must report a missing bucket or key as
/// [`S3FsError::NotFound`]; the attribute resolver relies on it to probe
/// for directory markers.
#[async_trait]
pub trait ObjectStorage: Send + Sync + fmt::Debug {
    /// Fetch the metadata of one object.
    async fn head_object(&self, bucket: &str, key: &str) -> S3FsResult<ObjectMetadata>;

    /// Fetch one page of a listing.
    async fn list_objects(&self, request: &ListRequest) -> S3FsResult<ListingPage>;

    /// Read an object, optionally limited to the half-open byte `range`.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> S3FsResult<Bytes>;

    /// Write an object in a single call. Returns its ETag.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<String>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> S3FsResult<()>;

    /// Copy an object server-side in a single call.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<()>;

    /// List the buckets visible to the caller.
    async fn list_buckets(&self) -> S3FsResult<Vec<String>>;

    /// Open a multipart session against `bucket`/`key`.
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<MultipartHandle>;

    /// Upload one part's payload. `range` is the part's position in the
    /// final object. Returns the part ETag.
    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        data: Bytes,
    ) -> S3FsResult<String>;

    /// Fill one part from a byte range of an existing object. Returns the
    /// part ETag.
    async fn copy_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        source_bucket: &str,
        source_key: &str,
    ) -> S3FsResult<String>;

    /// Assemble the listed parts into the target object.
    async fn complete_multipart_upload(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> S3FsResult<()>;

    /// Discard a session and every part uploaded to it.
    async fn abort_multipart_upload(&self, handle: &MultipartHandle) -> S3FsResult<()>;
}
