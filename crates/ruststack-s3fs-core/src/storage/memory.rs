//! In-memory implementation of [`ObjectStorage`].
//!
//! Buckets are kept in a [`DashMap`] of sorted [`BTreeMap`]s so listings come
//! out in key order without an extra sort. Pending multipart sessions live in
//! a second map keyed by upload ID. Every listing page is capped at the
//! storage page limit regardless of what the caller asks for, which lets
//! tests force pagination with a small number of keys.

use std::collections::BTreeMap;
use std::ops::{Bound, Range};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use super::{
    CannedAcl, CompletedPart, ListRequest, ListingPage, MultipartHandle, ObjectMetadata,
    ObjectStorage,
};
use crate::error::{S3FsError, S3FsResult};
use crate::utils::{
    SEPARATOR, compute_etag, compute_multipart_etag, decode_continuation_token,
    encode_continuation_token, generate_upload_id,
};

/// Default maximum number of entries returned by one listing page.
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Stored entries
// ---------------------------------------------------------------------------

/// One stored object.
#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    acl: CannedAcl,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("size", &self.data.len())
            .field("etag", &self.etag)
            .field("acl", &self.acl)
            .finish_non_exhaustive()
    }
}

impl StoredObject {
    fn new(data: Bytes, etag: String, acl: CannedAcl) -> Self {
        Self {
            data,
            etag,
            last_modified: Utc::now(),
            acl,
        }
    }

    fn metadata(&self, key: &str) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_owned(),
            size: self.data.len() as u64,
            last_modified: self.last_modified,
            etag: Some(self.etag.clone()),
        }
    }
}

/// One uploaded part of a pending session.
#[derive(Debug, Clone)]
struct StoredPart {
    range: Range<u64>,
    data: Bytes,
    etag: String,
}

/// A multipart session that has been initiated but not completed.
#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    acl: CannedAcl,
    parts: BTreeMap<u32, StoredPart>,
}

// ---------------------------------------------------------------------------
// InMemoryStorage
// ---------------------------------------------------------------------------

/// Thread-safe in-memory object store.
pub struct InMemoryStorage {
    /// Bucket name -> (key -> object).
    buckets: DashMap<String, BTreeMap<String, StoredObject>>,
    /// Upload ID -> pending session.
    uploads: DashMap<String, PendingUpload>,
    /// Hard cap on the entries of one listing page.
    page_limit: usize,
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("buckets_count", &self.buckets.len())
            .field("uploads_count", &self.uploads.len())
            .field("page_limit", &self.page_limit)
            .finish()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create an empty store with the default page limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_limit(DEFAULT_PAGE_LIMIT)
    }

    /// Create an empty store whose listing pages never exceed `page_limit`
    /// entries. A limit of zero is treated as one.
    #[must_use]
    pub fn with_page_limit(page_limit: usize) -> Self {
        debug!(page_limit, "creating InMemoryStorage");
        Self {
            buckets: DashMap::new(),
            uploads: DashMap::new(),
            page_limit: page_limit.max(1),
        }
    }

    /// Create `bucket` if it does not exist yet.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.entry(bucket.to_owned()).or_default();
        trace!(bucket, "created bucket");
    }

    /// Store `data` under `bucket`/`key`, creating the bucket on demand.
    pub fn put_bytes(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        let etag = compute_etag(&data);
        self.buckets
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), StoredObject::new(data, etag, CannedAcl::default()));
        trace!(bucket, key, "stored object");
    }

    /// Store an empty directory marker object for `dir` (a trailing
    /// separator is appended when missing).
    pub fn put_directory(&self, bucket: &str, dir: &str) {
        let key = if dir.ends_with(SEPARATOR) {
            dir.to_owned()
        } else {
            format!("{dir}{SEPARATOR}")
        };
        self.put_bytes(bucket, &key, Bytes::new());
    }

    /// Number of objects in `bucket` (zero for a missing bucket).
    #[must_use]
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, |objects| objects.len())
    }

    /// Raw content of `bucket`/`key`, if present.
    #[must_use]
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).map(|o| o.data.clone()))
    }

    /// ACL recorded for `bucket`/`key`, if present.
    #[must_use]
    pub fn object_acl(&self, bucket: &str, key: &str) -> Option<CannedAcl> {
        self.buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).map(|o| o.acl))
    }

    /// Number of multipart sessions that are neither completed nor aborted.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn read_object(&self, bucket: &str, key: &str) -> S3FsResult<StoredObject> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| S3FsError::not_found(bucket, ""))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| S3FsError::not_found(bucket, key))
    }

    fn write_object(&self, bucket: &str, key: &str, object: StoredObject) -> S3FsResult<()> {
        let mut objects = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| S3FsError::not_found(bucket, ""))?;
        objects.insert(key.to_owned(), object);
        Ok(())
    }

    fn store_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        data: Bytes,
    ) -> S3FsResult<String> {
        if part_number == 0 {
            return Err(S3FsError::invalid_argument("part numbers start at 1"));
        }
        if range.end.saturating_sub(range.start) != data.len() as u64 {
            return Err(S3FsError::invalid_argument(format!(
                "part {part_number} carries {} bytes for range {range:?}",
                data.len()
            )));
        }
        let mut upload = self
            .uploads
            .get_mut(&handle.upload_id)
            .ok_or_else(|| S3FsError::not_found(&handle.bucket, &handle.key))?;
        let etag = compute_etag(&data);
        let size = data.len();
        upload.parts.insert(
            part_number,
            StoredPart {
                range,
                data,
                etag: etag.clone(),
            },
        );
        trace!(
            upload_id = %handle.upload_id,
            part_number,
            size,
            "stored part data"
        );
        Ok(etag)
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Produce one page of a delimiter listing over `objects`.
///
/// Keys and newly-seen common prefixes both count towards `limit`. When an
/// entry remains after the page is full, the page is truncated and the
/// continuation token encodes the last emitted entry.
fn list_page(
    objects: &BTreeMap<String, StoredObject>,
    prefix: &str,
    delimiter: Option<&str>,
    start_after: Option<&str>,
    limit: usize,
) -> ListingPage {
    let delimiter = delimiter.filter(|d| !d.is_empty());
    let lower = match start_after {
        Some(marker) if marker >= prefix => Bound::Excluded(marker),
        _ => Bound::Included(prefix),
    };
    // A marker that is itself a common prefix means its whole subtree was
    // already reported on the previous page.
    let skip_subtree = start_after.filter(|marker| {
        delimiter.is_some_and(|d| marker.strip_prefix(prefix).is_some_and(|rest| rest.contains(d)))
    });

    let mut page = ListingPage {
        prefix: prefix.to_owned(),
        delimiter: delimiter.map(str::to_owned),
        ..ListingPage::default()
    };
    let mut last_entry: Option<String> = None;

    for (key, object) in objects.range::<str, _>((lower, Bound::Unbounded)) {
        let Some(rest) = key.strip_prefix(prefix) else {
            break;
        };
        if skip_subtree.is_some_and(|marker| key.starts_with(marker)) {
            continue;
        }

        let common_prefix = delimiter
            .and_then(|d| rest.find(d).map(|pos| format!("{prefix}{}", &rest[..pos + d.len()])));
        if let Some(cp) = &common_prefix {
            if page.common_prefixes.last() == Some(cp) {
                continue;
            }
        }

        if page.len() == limit {
            page.is_truncated = true;
            break;
        }

        match common_prefix {
            Some(cp) => {
                last_entry = Some(cp.clone());
                page.common_prefixes.push(cp);
            }
            None => {
                last_entry = Some(key.clone());
                page.objects.push(object.metadata(key));
            }
        }
    }

    if page.is_truncated {
        page.next_continuation_token = last_entry.as_deref().map(encode_continuation_token);
    }
    page
}

// ---------------------------------------------------------------------------
// ObjectStorage
// ---------------------------------------------------------------------------

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn head_object(&self, bucket: &str, key: &str) -> S3FsResult<ObjectMetadata> {
        self.read_object(bucket, key).map(|o| o.metadata(key))
    }

    async fn list_objects(&self, request: &ListRequest) -> S3FsResult<ListingPage> {
        let start_after = request
            .continuation_token
            .as_deref()
            .map(decode_continuation_token)
            .transpose()?;
        let limit = if request.max_keys == 0 {
            self.page_limit
        } else {
            request.max_keys.min(self.page_limit)
        };

        let objects = self
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| S3FsError::not_found(&request.bucket, ""))?;
        let page = list_page(
            &objects,
            &request.prefix,
            request.delimiter.as_deref(),
            start_after.as_deref(),
            limit,
        );
        debug!(
            bucket = %request.bucket,
            prefix = %request.prefix,
            keys = page.objects.len(),
            common_prefixes = page.common_prefixes.len(),
            is_truncated = page.is_truncated,
            "list_objects completed"
        );
        Ok(page)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> S3FsResult<Bytes> {
        let object = self.read_object(bucket, key)?;
        let Some(range) = range else {
            return Ok(object.data);
        };
        let len = object.data.len() as u64;
        if range.start > range.end || range.end > len {
            return Err(S3FsError::invalid_argument(format!(
                "range {range:?} outside object of {len} bytes"
            )));
        }
        let start = usize::try_from(range.start).map_err(anyhow::Error::from)?;
        let end = usize::try_from(range.end).map_err(anyhow::Error::from)?;
        Ok(object.data.slice(start..end))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<String> {
        let etag = compute_etag(&data);
        let size = data.len();
        self.write_object(
            bucket,
            key,
            StoredObject::new(data, etag.clone(), acl.unwrap_or_default()),
        )?;
        trace!(bucket, key, size, "put_object completed");
        Ok(etag)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> S3FsResult<()> {
        let mut objects = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| S3FsError::not_found(bucket, ""))?;
        if objects.remove(key).is_some() {
            trace!(bucket, key, "deleted object");
        }
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<()> {
        let source = self.read_object(source_bucket, source_key)?;
        let size = source.data.len();
        self.write_object(
            target_bucket,
            target_key,
            StoredObject::new(source.data, source.etag, acl.unwrap_or_default()),
        )?;
        debug!(
            source_bucket,
            source_key, target_bucket, target_key, size, "copy_object completed"
        );
        Ok(())
    }

    async fn list_buckets(&self) -> S3FsResult<Vec<String>> {
        let mut names: Vec<String> = self.buckets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<MultipartHandle> {
        if !self.buckets.contains_key(bucket) {
            return Err(S3FsError::not_found(bucket, ""));
        }
        let upload_id = generate_upload_id();
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                acl: acl.unwrap_or_default(),
                parts: BTreeMap::new(),
            },
        );
        debug!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        Ok(MultipartHandle {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        data: Bytes,
    ) -> S3FsResult<String> {
        self.store_part(handle, part_number, range, data)
    }

    async fn copy_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        source_bucket: &str,
        source_key: &str,
    ) -> S3FsResult<String> {
        let data = self
            .get_object(source_bucket, source_key, Some(range.clone()))
            .await?;
        self.store_part(handle, part_number, range, data)
    }

    async fn complete_multipart_upload(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> S3FsResult<()> {
        let (_, upload) = self
            .uploads
            .remove(&handle.upload_id)
            .ok_or_else(|| S3FsError::not_found(&handle.bucket, &handle.key))?;

        let assembled = assemble_parts(&upload, parts);
        let (data, etags) = match assembled {
            Ok(ok) => ok,
            Err(e) => {
                // A rejected completion leaves the session open, as S3 does.
                self.uploads.insert(handle.upload_id.clone(), upload);
                return Err(e);
            }
        };

        let size = data.len();
        let etag = compute_multipart_etag(&etags);
        self.write_object(
            &upload.bucket,
            &upload.key,
            StoredObject::new(data, etag, upload.acl),
        )?;
        debug!(
            bucket = %upload.bucket,
            key = %upload.key,
            upload_id = %handle.upload_id,
            size,
            parts = parts.len(),
            "completed multipart upload"
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, handle: &MultipartHandle) -> S3FsResult<()> {
        let (_, upload) = self
            .uploads
            .remove(&handle.upload_id)
            .ok_or_else(|| S3FsError::not_found(&handle.bucket, &handle.key))?;
        debug!(
            bucket = %upload.bucket,
            key = %upload.key,
            upload_id = %handle.upload_id,
            parts = upload.parts.len(),
            "aborted multipart upload"
        );
        Ok(())
    }
}

/// Concatenate the submitted parts of `upload`.
///
/// Parts must be listed in strictly ascending order, match the stored ETags,
/// and cover the object contiguously from offset zero.
fn assemble_parts(
    upload: &PendingUpload,
    parts: &[CompletedPart],
) -> S3FsResult<(Bytes, Vec<String>)> {
    if parts.is_empty() {
        return Err(S3FsError::invalid_argument(
            "a multipart upload needs at least one part",
        ));
    }
    let mut combined = BytesMut::new();
    let mut etags = Vec::with_capacity(parts.len());
    let mut expected_offset = 0_u64;
    let mut previous = 0_u32;

    for part in parts {
        if part.part_number <= previous {
            return Err(S3FsError::invalid_argument(format!(
                "part {} is out of order",
                part.part_number
            )));
        }
        previous = part.part_number;

        let stored = upload.parts.get(&part.part_number).ok_or_else(|| {
            S3FsError::invalid_argument(format!("part {} was never uploaded", part.part_number))
        })?;
        if stored.etag.trim_matches('"') != part.etag.trim_matches('"') {
            return Err(S3FsError::invalid_argument(format!(
                "ETag mismatch for part {}",
                part.part_number
            )));
        }
        if stored.range.start != expected_offset {
            return Err(S3FsError::invalid_argument(format!(
                "part {} starts at {} but {expected_offset} was expected",
                part.part_number, stored.range.start
            )));
        }
        expected_offset = stored.range.end;
        combined.extend_from_slice(&stored.data);
        etags.push(stored.etag.clone());
    }

    Ok((combined.freeze(), etags))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with(keys: &[&str]) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        storage.create_bucket("bucket");
        for key in keys {
            storage.put_bytes("bucket", key, Bytes::from_static(b"data"));
        }
        storage
    }

    async fn list_all(
        storage: &InMemoryStorage,
        prefix: &str,
        max_keys: usize,
    ) -> (Vec<String>, Vec<String>, usize) {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        let mut pages = 0;
        let mut token = None;
        loop {
            let req = ListRequest::new("bucket", prefix)
                .with_delimiter("/")
                .with_continuation_token(token)
                .with_max_keys(max_keys);
            let page = storage
                .list_objects(&req)
                .await
                .unwrap_or_else(|e| panic!("list failed: {e}"));
            page.validate().expect("test page invariants");
            pages += 1;
            keys.extend(page.keys().map(str::to_owned));
            prefixes.extend(page.common_prefixes.iter().cloned());
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
        }
        (keys, prefixes, pages)
    }

    #[tokio::test]
    async fn test_should_group_children_into_common_prefixes() {
        let storage = storage_with(&["dir/file1", "dir/sub/a", "dir/sub/b", "dir/zz", "other"]);
        let (keys, prefixes, _) = list_all(&storage, "dir/", 1000).await;
        assert_eq!(keys, vec!["dir/file1", "dir/zz"]);
        assert_eq!(prefixes, vec!["dir/sub/"]);
    }

    #[tokio::test]
    async fn test_should_count_common_prefixes_towards_page_size() {
        let storage = storage_with(&["a/1", "a/2", "b/1", "c", "d/1"]);
        let (keys, prefixes, pages) = list_all(&storage, "", 1).await;
        assert_eq!(keys, vec!["c"]);
        assert_eq!(prefixes, vec!["a/", "b/", "d/"]);
        assert_eq!(pages, 4);
    }

    #[tokio::test]
    async fn test_should_cap_pages_at_storage_limit() {
        let storage = InMemoryStorage::with_page_limit(2);
        storage.create_bucket("bucket");
        for i in 0..5 {
            storage.put_bytes("bucket", &format!("k{i}"), Bytes::new());
        }
        let req = ListRequest::new("bucket", "").with_max_keys(1000);
        let page = storage.list_objects(&req).await.expect("test list");
        assert_eq!(page.objects.len(), 2);
        assert!(page.is_truncated);
        assert!(page.next_continuation_token.is_some());
    }

    #[tokio::test]
    async fn test_should_list_marker_key_then_its_children() {
        let storage = storage_with(&["dir/", "dir/a", "dir/b"]);
        let (keys, _, pages) = list_all(&storage, "dir/", 1).await;
        assert_eq!(keys, vec!["dir/", "dir/a", "dir/b"]);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_bucket() {
        let storage = InMemoryStorage::new();
        let err = storage
            .list_objects(&ListRequest::new("nope", ""))
            .await
            .expect_err("test missing bucket");
        assert!(err.is_not_found());
        assert!(storage.head_object("nope", "k").await.is_err());
    }

    #[tokio::test]
    async fn test_should_read_object_with_range() {
        let storage = storage_with(&[]);
        storage.put_bytes("bucket", "k", Bytes::from_static(b"0123456789"));
        let data = storage
            .get_object("bucket", "k", Some(2..5))
            .await
            .expect("test range read");
        assert_eq!(&data[..], b"234");
        assert!(storage.get_object("bucket", "k", Some(5..11)).await.is_err());
    }

    #[tokio::test]
    async fn test_should_copy_object_with_acl() {
        let storage = storage_with(&["src"]);
        storage
            .copy_object("bucket", "src", "bucket", "dst", Some(CannedAcl::PublicRead))
            .await
            .expect("test copy");
        assert_eq!(storage.object_bytes("bucket", "dst").as_deref(), Some(&b"data"[..]));
        assert_eq!(storage.object_acl("bucket", "dst"), Some(CannedAcl::PublicRead));
    }

    #[tokio::test]
    async fn test_should_complete_multipart_upload() {
        let storage = storage_with(&[]);
        let handle = storage
            .initiate_multipart_upload("bucket", "big", None)
            .await
            .expect("test initiate");
        let e2 = storage
            .upload_part(&handle, 2, 3..6, Bytes::from_static(b"def"))
            .await
            .expect("test part 2");
        let e1 = storage
            .upload_part(&handle, 1, 0..3, Bytes::from_static(b"abc"))
            .await
            .expect("test part 1");
        storage
            .complete_multipart_upload(
                &handle,
                &[
                    CompletedPart { part_number: 1, etag: e1 },
                    CompletedPart { part_number: 2, etag: e2 },
                ],
            )
            .await
            .expect("test complete");

        assert_eq!(storage.object_bytes("bucket", "big").as_deref(), Some(&b"abcdef"[..]));
        assert_eq!(storage.pending_uploads(), 0);
        let meta = storage.head_object("bucket", "big").await.expect("test head");
        assert!(meta.etag.is_some_and(|e| e.ends_with("-2\"")));
    }

    #[tokio::test]
    async fn test_should_reject_completion_with_gap() {
        let storage = storage_with(&[]);
        let handle = storage
            .initiate_multipart_upload("bucket", "big", None)
            .await
            .expect("test initiate");
        let e1 = storage
            .upload_part(&handle, 1, 0..3, Bytes::from_static(b"abc"))
            .await
            .expect("test part 1");
        let e3 = storage
            .upload_part(&handle, 3, 6..9, Bytes::from_static(b"ghi"))
            .await
            .expect("test part 3");
        let err = storage
            .complete_multipart_upload(
                &handle,
                &[
                    CompletedPart { part_number: 1, etag: e1 },
                    CompletedPart { part_number: 3, etag: e3 },
                ],
            )
            .await
            .expect_err("test gap");
        assert!(matches!(err, S3FsError::InvalidArgument { .. }));
        assert_eq!(storage.pending_uploads(), 1);
        assert!(storage.object_bytes("bucket", "big").is_none());
    }

    #[tokio::test]
    async fn test_should_abort_multipart_upload() {
        let storage = storage_with(&[]);
        let handle = storage
            .initiate_multipart_upload("bucket", "big", None)
            .await
            .expect("test initiate");
        storage
            .upload_part(&handle, 1, 0..3, Bytes::from_static(b"abc"))
            .await
            .expect("test part");
        storage.abort_multipart_upload(&handle).await.expect("test abort");
        assert_eq!(storage.pending_uploads(), 0);
        assert!(storage.abort_multipart_upload(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_should_reject_part_length_mismatch() {
        let storage = storage_with(&[]);
        let handle = storage
            .initiate_multipart_upload("bucket", "big", None)
            .await
            .expect("test initiate");
        let err = storage
            .upload_part(&handle, 1, 0..10, Bytes::from_static(b"abc"))
            .await
            .expect_err("test mismatch");
        assert!(matches!(err, S3FsError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_should_list_buckets_sorted() {
        let storage = InMemoryStorage::new();
        storage.create_bucket("zeta");
        storage.create_bucket("alpha");
        assert_eq!(
            storage.list_buckets().await.expect("test list buckets"),
            vec!["alpha", "zeta"]
        );
    }

    #[test]
    fn test_should_create_default_storage() {
        let storage = InMemoryStorage::default();
        assert_eq!(storage.page_limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(storage.pending_uploads(), 0);
        assert_eq!(storage.object_count("bucket"), 0);
    }
}
