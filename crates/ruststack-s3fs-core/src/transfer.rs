//! Copy and upload with multipart splitting.
//!
//! Objects up to the chunk size move in one request. Larger ones go through
//! a [`TransferSession`]: the byte range `[0, size)` is cut into consecutive
//! chunk-sized parts, the parts are sent through a bounded pool, and the
//! session is completed with the ordered part list. Any part or completion
//! failure aborts the session exactly once before the original cause is
//! surfaced as [`S3FsError::TransferFailed`].

use std::future::Future;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace, warn};

use crate::config::{DEFAULT_CHUNK_SIZE, S3FsConfig};
use crate::error::{S3FsError, S3FsResult};
use crate::path::S3Path;
use crate::storage::{CannedAcl, CompletedPart, MultipartHandle, ObjectStorage};

// ---------------------------------------------------------------------------
// Options and planning
// ---------------------------------------------------------------------------

/// Knobs of one copy or upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartOptions {
    /// Part size in bytes; `0` disables splitting.
    pub chunk_size: u64,
    /// Maximum number of part requests in flight.
    pub max_concurrency: usize,
}

impl Default for MultipartOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: 8,
        }
    }
}

impl MultipartOptions {
    /// Options taken from a filesystem configuration.
    #[must_use]
    pub fn from_config(config: &S3FsConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_concurrency: config.max_concurrency,
        }
    }

    /// Replace the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Replace the worker pool size.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Whether an object of `size` bytes is split into parts.
    #[must_use]
    pub fn splits(&self, size: u64) -> bool {
        self.chunk_size > 0 && size > self.chunk_size
    }
}

/// One planned part: its 1-based number and byte range in the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based part number.
    pub part_number: u32,
    /// Half-open byte range.
    pub range: Range<u64>,
}

impl PartPlan {
    /// Length of the part in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Whether the part is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cut `[0, size)` into `ceil(size / chunk_size)` consecutive parts.
///
/// Every part is `chunk_size` long except the last, which holds the
/// remainder.
///
/// # Errors
///
/// Returns [`S3FsError::InvalidArgument`] for a zero chunk size or when the
/// part count does not fit a part number.
///
/// # Examples
///
/// ```
/// use ruststack_s3fs_core::transfer::plan_parts;
///
/// const MIB: u64 = 1024 * 1024;
/// let parts = plan_parts(17 * MIB, 5 * MIB).unwrap();
/// assert_eq!(parts.len(), 4);
/// assert_eq!(parts[3].range, 15 * MIB..17 * MIB);
/// ```
pub fn plan_parts(size: u64, chunk_size: u64) -> S3FsResult<Vec<PartPlan>> {
    if chunk_size == 0 {
        return Err(S3FsError::invalid_argument(
            "chunk size must be positive to split a transfer",
        ));
    }
    let count = size.div_ceil(chunk_size);
    let count = u32::try_from(count).map_err(|_| {
        S3FsError::invalid_argument(format!("{count} parts exceed the part number range"))
    })?;
    Ok((0..count)
        .map(|i| {
            let start = u64::from(i) * chunk_size;
            PartPlan {
                part_number: i + 1,
                range: start..(start + chunk_size).min(size),
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// TransferSession
// ---------------------------------------------------------------------------

/// Lifecycle of a multipart session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The store issued an upload ID; no part has been sent.
    Initiated,
    /// Parts are being sent.
    PartsInFlight,
    /// The store assembled the object.
    Completed,
    /// The session was discarded.
    Aborted,
}

/// Book-keeping of one multipart copy or upload.
#[derive(Debug)]
pub struct TransferSession {
    handle: MultipartHandle,
    size: u64,
    parts: Vec<PartPlan>,
    etags: Vec<Option<String>>,
    state: SessionState,
}

impl TransferSession {
    /// Start tracking an initiated session that will send `parts`.
    #[must_use]
    pub fn new(handle: MultipartHandle, size: u64, parts: Vec<PartPlan>) -> Self {
        let etags = vec![None; parts.len()];
        Self {
            handle,
            size,
            parts,
            etags,
            state: SessionState::Initiated,
        }
    }

    /// The store handle of the session.
    #[must_use]
    pub fn handle(&self) -> &MultipartHandle {
        &self.handle
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The planned parts.
    #[must_use]
    pub fn parts(&self) -> &[PartPlan] {
        &self.parts
    }

    fn transition(&mut self, from: &[SessionState], to: SessionState) -> S3FsResult<()> {
        if !from.contains(&self.state) {
            return Err(anyhow::anyhow!(
                "multipart session {} cannot move from {:?} to {to:?}",
                self.handle.upload_id,
                self.state
            )
            .into());
        }
        self.state = to;
        Ok(())
    }

    /// Mark the start of part transmission.
    ///
    /// # Errors
    ///
    /// Fails unless the session is [`SessionState::Initiated`].
    pub fn begin_parts(&mut self) -> S3FsResult<()> {
        self.transition(&[SessionState::Initiated], SessionState::PartsInFlight)
    }

    /// Record the ETag the store returned for `part_number`.
    ///
    /// # Errors
    ///
    /// Fails when parts are not in flight or the part number was not planned.
    pub fn record_part(&mut self, part_number: u32, etag: String) -> S3FsResult<()> {
        if self.state != SessionState::PartsInFlight {
            return Err(anyhow::anyhow!(
                "part {part_number} recorded while session is {:?}",
                self.state
            )
            .into());
        }
        let slot = part_number
            .checked_sub(1)
            .and_then(|i| self.etags.get_mut(i as usize))
            .ok_or_else(|| anyhow::anyhow!("part {part_number} was not planned"))?;
        *slot = Some(etag);
        Ok(())
    }

    /// The ordered part list to complete the session with.
    ///
    /// # Errors
    ///
    /// Fails when a part has no ETag yet, part numbers are not contiguous
    /// from 1, or the ranges do not cover the object exactly.
    pub fn completed_parts(&self) -> S3FsResult<Vec<CompletedPart>> {
        let mut offset = 0_u64;
        let mut completed = Vec::with_capacity(self.parts.len());
        for (index, (part, etag)) in self.parts.iter().zip(&self.etags).enumerate() {
            if part.part_number as usize != index + 1 {
                return Err(anyhow::anyhow!("part numbers are not contiguous at {index}").into());
            }
            if part.range.start != offset || part.range.end <= part.range.start {
                return Err(anyhow::anyhow!(
                    "part {} covers {:?} but {offset} was expected",
                    part.part_number,
                    part.range
                )
                .into());
            }
            offset = part.range.end;
            let etag = etag
                .clone()
                .ok_or_else(|| anyhow::anyhow!("part {} has no ETag", part.part_number))?;
            completed.push(CompletedPart {
                part_number: part.part_number,
                etag,
            });
        }
        if offset != self.size {
            return Err(anyhow::anyhow!(
                "parts cover {offset} of {} bytes",
                self.size
            )
            .into());
        }
        Ok(completed)
    }

    /// Mark the session as assembled.
    ///
    /// # Errors
    ///
    /// Fails unless parts are in flight.
    pub fn mark_completed(&mut self) -> S3FsResult<()> {
        self.transition(&[SessionState::PartsInFlight], SessionState::Completed)
    }

    /// Mark the session as discarded.
    ///
    /// # Errors
    ///
    /// Fails when the session already reached a terminal state.
    pub fn mark_aborted(&mut self) -> S3FsResult<()> {
        self.transition(
            &[SessionState::Initiated, SessionState::PartsInFlight],
            SessionState::Aborted,
        )
    }
}

// ---------------------------------------------------------------------------
// TransferEngine
// ---------------------------------------------------------------------------

/// Result of a finished copy or upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Bytes transferred.
    pub size: u64,
    /// Number of parts sent; `0` for a single-shot transfer.
    pub parts: usize,
}

impl TransferOutcome {
    /// Whether the transfer used a multipart session.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.parts > 0
    }
}

/// Copies objects and uploads local content.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    storage: Arc<dyn ObjectStorage>,
}

/// Bucket and key of an absolute object path.
pub(crate) fn object_location(path: &S3Path) -> S3FsResult<(String, String)> {
    let key = path.key();
    match path.bucket() {
        Some(bucket) if !key.is_empty() => Ok((bucket.to_owned(), key)),
        _ => Err(S3FsError::invalid_argument(format!(
            "{path} does not name an object"
        ))),
    }
}

fn to_usize_range(range: &Range<u64>) -> S3FsResult<Range<usize>> {
    let start = usize::try_from(range.start).context("part start exceeds address space")?;
    let end = usize::try_from(range.end).context("part end exceeds address space")?;
    Ok(start..end)
}

impl TransferEngine {
    /// Create an engine over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Copy `source` to `target` server-side.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::NotFound`] for a missing source,
    /// [`S3FsError::InvalidArgument`] for a path without a key, and
    /// [`S3FsError::TransferFailed`] when a multipart session had to be
    /// aborted.
    pub async fn copy(
        &self,
        source: &S3Path,
        target: &S3Path,
        acl: Option<CannedAcl>,
        options: &MultipartOptions,
    ) -> S3FsResult<TransferOutcome> {
        let (source_bucket, source_key) = object_location(source)?;
        let (target_bucket, target_key) = object_location(target)?;
        let size = self
            .storage
            .head_object(&source_bucket, &source_key)
            .await?
            .size;

        if !options.splits(size) {
            self.storage
                .copy_object(&source_bucket, &source_key, &target_bucket, &target_key, acl)
                .await?;
            debug!(
                source = %source,
                target = %target,
                size,
                "single-shot copy completed"
            );
            return Ok(TransferOutcome { size, parts: 0 });
        }

        let storage = Arc::clone(&self.storage);
        let source_bucket: Arc<str> = source_bucket.into();
        let source_key: Arc<str> = source_key.into();
        self.multipart(&target_bucket, &target_key, size, acl, options, |handle, part| {
            let storage = Arc::clone(&storage);
            let source_bucket = Arc::clone(&source_bucket);
            let source_key = Arc::clone(&source_key);
            async move {
                storage
                    .copy_part(
                        &handle,
                        part.part_number,
                        part.range,
                        &source_bucket,
                        &source_key,
                    )
                    .await
            }
        })
        .await
    }

    /// Upload in-memory content to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] for a path without a key and
    /// [`S3FsError::TransferFailed`] when a multipart session had to be
    /// aborted.
    pub async fn upload_bytes(
        &self,
        data: Bytes,
        target: &S3Path,
        acl: Option<CannedAcl>,
        options: &MultipartOptions,
    ) -> S3FsResult<TransferOutcome> {
        let (bucket, key) = object_location(target)?;
        let size = data.len() as u64;

        if !options.splits(size) {
            self.storage.put_object(&bucket, &key, data, acl).await?;
            debug!(target = %target, size, "single-shot upload completed");
            return Ok(TransferOutcome { size, parts: 0 });
        }

        let storage = Arc::clone(&self.storage);
        self.multipart(&bucket, &key, size, acl, options, |handle, part| {
            let storage = Arc::clone(&storage);
            let data = data.clone();
            async move {
                let payload = data.slice(to_usize_range(&part.range)?);
                storage
                    .upload_part(&handle, part.part_number, part.range, payload)
                    .await
            }
        })
        .await
    }

    /// Upload the local file at `local` to `target`, reading each part's
    /// byte range from disk.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::Internal`] when the file cannot be read and
    /// [`S3FsError::TransferFailed`] when a multipart session had to be
    /// aborted.
    pub async fn upload_file(
        &self,
        local: &Path,
        target: &S3Path,
        acl: Option<CannedAcl>,
        options: &MultipartOptions,
    ) -> S3FsResult<TransferOutcome> {
        let (bucket, key) = object_location(target)?;
        let size = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("failed to stat {}", local.display()))?
            .len();

        if !options.splits(size) {
            let data = tokio::fs::read(local)
                .await
                .with_context(|| format!("failed to read {}", local.display()))?;
            self.storage
                .put_object(&bucket, &key, Bytes::from(data), acl)
                .await?;
            debug!(local = %local.display(), target = %target, size, "single-shot upload completed");
            return Ok(TransferOutcome { size, parts: 0 });
        }

        let storage = Arc::clone(&self.storage);
        let local: Arc<Path> = local.into();
        self.multipart(&bucket, &key, size, acl, options, |handle, part| {
            let storage = Arc::clone(&storage);
            let local = Arc::clone(&local);
            async move {
                let payload = read_range(&local, &part.range).await?;
                storage
                    .upload_part(&handle, part.part_number, part.range, payload)
                    .await
            }
        })
        .await
    }

    /// Run a multipart session, sending each part with `send_part`.
    async fn multipart<F, Fut>(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        acl: Option<CannedAcl>,
        options: &MultipartOptions,
        send_part: F,
    ) -> S3FsResult<TransferOutcome>
    where
        F: Fn(MultipartHandle, PartPlan) -> Fut,
        Fut: Future<Output = S3FsResult<String>>,
    {
        let plan = plan_parts(size, options.chunk_size)?;
        let handle = self
            .storage
            .initiate_multipart_upload(bucket, key, acl)
            .await?;
        let mut session = TransferSession::new(handle, size, plan);
        let parts = session.parts().len();
        debug!(
            bucket,
            key,
            upload_id = %session.handle().upload_id,
            size,
            parts,
            "multipart transfer started"
        );

        match self
            .drive(&mut session, options.max_concurrency.max(1), send_part)
            .await
        {
            Ok(()) => {
                debug!(
                    bucket,
                    key,
                    upload_id = %session.handle().upload_id,
                    size,
                    parts,
                    "multipart transfer completed"
                );
                Ok(TransferOutcome { size, parts })
            }
            Err(cause) => {
                self.abort(&mut session).await;
                Err(S3FsError::TransferFailed {
                    key: key.to_owned(),
                    upload_id: session.handle().upload_id.clone(),
                    source: Box::new(cause),
                })
            }
        }
    }

    /// Send every part through a bounded pool, then complete the session.
    ///
    /// Returns at the first failure; parts still in flight are dropped.
    async fn drive<F, Fut>(
        &self,
        session: &mut TransferSession,
        max_concurrency: usize,
        send_part: F,
    ) -> S3FsResult<()>
    where
        F: Fn(MultipartHandle, PartPlan) -> Fut,
        Fut: Future<Output = S3FsResult<String>>,
    {
        session.begin_parts()?;
        let handle = session.handle().clone();
        let requests = session.parts().to_vec().into_iter().map(|part| {
            let part_number = part.part_number;
            let request = send_part(handle.clone(), part);
            async move { request.await.map(|etag| (part_number, etag)) }
        });
        let mut in_flight = futures::stream::iter(requests).buffer_unordered(max_concurrency);

        while let Some(result) = in_flight.next().await {
            let (part_number, etag) = result?;
            trace!(upload_id = %handle.upload_id, part_number, "part transferred");
            session.record_part(part_number, etag)?;
        }
        drop(in_flight);

        let completed = session.completed_parts()?;
        self.storage
            .complete_multipart_upload(session.handle(), &completed)
            .await?;
        session.mark_completed()
    }

    /// Abort the session once; a failing abort is logged, never returned.
    async fn abort(&self, session: &mut TransferSession) {
        if let Err(e) = self
            .storage
            .abort_multipart_upload(session.handle())
            .await
        {
            warn!(
                bucket = %session.handle().bucket,
                key = %session.handle().key,
                upload_id = %session.handle().upload_id,
                error = %e,
                "failed to abort multipart upload"
            );
        }
        if let Err(e) = session.mark_aborted() {
            warn!(error = %e, "inconsistent multipart session state");
        }
    }
}

/// Read `range` of the local file at `path`.
async fn read_range(path: &Path, range: &Range<u64>) -> S3FsResult<Bytes> {
    let len = to_usize_range(range)?.len();
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.seek(std::io::SeekFrom::Start(range.start))
        .await
        .with_context(|| format!("failed to seek {}", path.display()))?;
    let mut buf = vec![0_u8; len];
    file.read_exact(&mut buf)
        .await
        .with_context(|| format!("failed to read {} at {range:?}", path.display()))?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::filesystem::S3FileSystem;
    use crate::storage::{InMemoryStorage, ListRequest, ListingPage, ObjectMetadata};

    const MIB: u64 = 1024 * 1024;

    /// Delegates to an [`InMemoryStorage`], counting multipart calls and
    /// failing on request.
    #[derive(Debug, Default)]
    struct FaultyStorage {
        inner: InMemoryStorage,
        fail_part: Option<u32>,
        fail_complete: bool,
        fail_abort: bool,
        parts_sent: AtomicUsize,
        completes: AtomicUsize,
        aborts: AtomicUsize,
    }

    impl FaultyStorage {
        fn injected(what: &str) -> S3FsError {
            anyhow::anyhow!("injected {what} failure").into()
        }

        fn part_call(&self, part_number: u32) -> S3FsResult<()> {
            self.parts_sent.fetch_add(1, Ordering::SeqCst);
            if self.fail_part == Some(part_number) {
                return Err(Self::injected("part"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ObjectStorage for FaultyStorage {
        async fn head_object(&self, bucket: &str, key: &str) -> S3FsResult<ObjectMetadata> {
            self.inner.head_object(bucket, key).await
        }

        async fn list_objects(&self, request: &ListRequest) -> S3FsResult<ListingPage> {
            self.inner.list_objects(request).await
        }

        async fn get_object(
            &self,
            bucket: &str,
            key: &str,
            range: Option<Range<u64>>,
        ) -> S3FsResult<Bytes> {
            self.inner.get_object(bucket, key, range).await
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            data: Bytes,
            acl: Option<CannedAcl>,
        ) -> S3FsResult<String> {
            self.inner.put_object(bucket, key, data, acl).await
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> S3FsResult<()> {
            self.inner.delete_object(bucket, key).await
        }

        async fn copy_object(
            &self,
            source_bucket: &str,
            source_key: &str,
            target_bucket: &str,
            target_key: &str,
            acl: Option<CannedAcl>,
        ) -> S3FsResult<()> {
            self.inner
                .copy_object(source_bucket, source_key, target_bucket, target_key, acl)
                .await
        }

        async fn list_buckets(&self) -> S3FsResult<Vec<String>> {
            self.inner.list_buckets().await
        }

        async fn initiate_multipart_upload(
            &self,
            bucket: &str,
            key: &str,
            acl: Option<CannedAcl>,
        ) -> S3FsResult<MultipartHandle> {
            self.inner.initiate_multipart_upload(bucket, key, acl).await
        }

        async fn upload_part(
            &self,
            handle: &MultipartHandle,
            part_number: u32,
            range: Range<u64>,
            data: Bytes,
        ) -> S3FsResult<String> {
            self.part_call(part_number)?;
            self.inner.upload_part(handle, part_number, range, data).await
        }

        async fn copy_part(
            &self,
            handle: &MultipartHandle,
            part_number: u32,
            range: Range<u64>,
            source_bucket: &str,
            source_key: &str,
        ) -> S3FsResult<String> {
            self.part_call(part_number)?;
            self.inner
                .copy_part(handle, part_number, range, source_bucket, source_key)
                .await
        }

        async fn complete_multipart_upload(
            &self,
            handle: &MultipartHandle,
            parts: &[CompletedPart],
        ) -> S3FsResult<()> {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if self.fail_complete {
                return Err(Self::injected("complete"));
            }
            self.inner.complete_multipart_upload(handle, parts).await
        }

        async fn abort_multipart_upload(&self, handle: &MultipartHandle) -> S3FsResult<()> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            if self.fail_abort {
                return Err(Self::injected("abort"));
            }
            self.inner.abort_multipart_upload(handle).await
        }
    }

    fn payload(len: u64) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
    }

    fn setup(storage: FaultyStorage, source_len: u64) -> (Arc<FaultyStorage>, Arc<S3FileSystem>) {
        storage.inner.create_bucket("bucket");
        storage.inner.put_bytes("bucket", "source.bin", payload(source_len));
        let storage = Arc::new(storage);
        let fs = S3FileSystem::new("", storage.clone(), S3FsConfig::default());
        (storage, fs)
    }

    fn engine(storage: &Arc<FaultyStorage>) -> TransferEngine {
        TransferEngine::new(storage.clone())
    }

    fn options(chunk_size: u64) -> MultipartOptions {
        MultipartOptions::default()
            .with_chunk_size(chunk_size)
            .with_max_concurrency(4)
    }

    fn source_cause(err: &S3FsError) -> String {
        match err {
            S3FsError::TransferFailed { source, .. } => source.to_string(),
            other => panic!("expected TransferFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_should_plan_ceil_parts() {
        let parts = plan_parts(17 * MIB, 5 * MIB).expect("test plan");
        let lens: Vec<u64> = parts.iter().map(PartPlan::len).collect();
        assert_eq!(lens, vec![5 * MIB, 5 * MIB, 5 * MIB, 2 * MIB]);
        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(plan_parts(10, 5).expect("test plan").len(), 2);
        assert_eq!(plan_parts(11, 5).expect("test plan").len(), 3);
        assert!(plan_parts(0, 5).expect("test plan").is_empty());
        assert!(matches!(
            plan_parts(10, 0),
            Err(S3FsError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_copy_17_mib_in_four_parts() {
        let (storage, fs) = setup(FaultyStorage::default(), 17 * MIB);
        let outcome = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/target.bin", &[]),
                None,
                &options(5 * MIB),
            )
            .await
            .unwrap_or_else(|e| panic!("copy failed: {e}"));

        assert_eq!(outcome, TransferOutcome { size: 17 * MIB, parts: 4 });
        assert_eq!(storage.parts_sent.load(Ordering::SeqCst), 4);
        assert_eq!(storage.completes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.aborts.load(Ordering::SeqCst), 0);
        assert_eq!(
            storage.inner.object_bytes("bucket", "target.bin"),
            storage.inner.object_bytes("bucket", "source.bin")
        );
        assert_eq!(storage.inner.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_copy_in_one_shot_when_small() {
        let (storage, fs) = setup(FaultyStorage::default(), 5 * MIB);
        let outcome = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/copy.bin", &[]),
                Some(CannedAcl::PublicRead),
                &options(5 * MIB),
            )
            .await
            .expect("test copy");
        assert!(!outcome.is_multipart());
        assert_eq!(storage.parts_sent.load(Ordering::SeqCst), 0);
        assert_eq!(
            storage.inner.object_acl("bucket", "copy.bin"),
            Some(CannedAcl::PublicRead)
        );
    }

    #[tokio::test]
    async fn test_should_not_split_without_chunk_size() {
        let (storage, fs) = setup(FaultyStorage::default(), 3 * MIB);
        let outcome = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/copy.bin", &[]),
                None,
                &options(0),
            )
            .await
            .expect("test copy");
        assert_eq!(outcome.parts, 0);
    }

    #[tokio::test]
    async fn test_should_copy_empty_object_in_one_shot() {
        let (storage, fs) = setup(FaultyStorage::default(), 0);
        let outcome = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/empty.bin", &[]),
                None,
                &options(1),
            )
            .await
            .expect("test copy");
        assert_eq!(outcome, TransferOutcome { size: 0, parts: 0 });
        assert_eq!(
            storage.inner.object_bytes("bucket", "empty.bin").map(|b| b.len()),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_should_abort_once_when_part_fails() {
        let faulty = FaultyStorage {
            fail_part: Some(3),
            ..FaultyStorage::default()
        };
        let (storage, fs) = setup(faulty, 17 * MIB);
        let err = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/target.bin", &[]),
                None,
                &options(5 * MIB),
            )
            .await
            .expect_err("test part failure");

        assert_eq!(source_cause(&err), "injected part failure");
        assert_eq!(storage.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(storage.completes.load(Ordering::SeqCst), 0);
        assert_eq!(storage.inner.pending_uploads(), 0);
        assert!(storage.inner.object_bytes("bucket", "target.bin").is_none());
    }

    #[tokio::test]
    async fn test_should_abort_once_when_complete_fails() {
        let faulty = FaultyStorage {
            fail_complete: true,
            ..FaultyStorage::default()
        };
        let (storage, fs) = setup(faulty, 12);
        let err = engine(&storage)
            .upload_bytes(payload(12), &fs.path("/bucket/up.bin", &[]), None, &options(5))
            .await
            .expect_err("test complete failure");

        assert_eq!(source_cause(&err), "injected complete failure");
        assert_eq!(storage.parts_sent.load(Ordering::SeqCst), 3);
        assert_eq!(storage.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(storage.inner.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_keep_original_cause_when_abort_fails() {
        let faulty = FaultyStorage {
            fail_part: Some(1),
            fail_abort: true,
            ..FaultyStorage::default()
        };
        let (storage, fs) = setup(faulty, 12);
        let err = engine(&storage)
            .copy(
                &fs.path("/bucket/source.bin", &[]),
                &fs.path("/bucket/target.bin", &[]),
                None,
                &options(5),
            )
            .await
            .expect_err("test part failure");

        assert_eq!(source_cause(&err), "injected part failure");
        assert_eq!(storage.aborts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_should_upload_bytes_in_parts() {
        let (storage, fs) = setup(FaultyStorage::default(), 0);
        let data = payload(3 * MIB + 17);
        let outcome = engine(&storage)
            .upload_bytes(data.clone(), &fs.path("/bucket/up.bin", &[]), None, &options(MIB))
            .await
            .expect("test upload");
        assert_eq!(outcome.parts, 4);
        assert_eq!(storage.inner.object_bytes("bucket", "up.bin"), Some(data));
    }

    #[tokio::test]
    async fn test_should_upload_local_file_in_parts() {
        let (storage, fs) = setup(FaultyStorage::default(), 0);
        let dir = tempfile::tempdir().expect("test tempdir");
        let local = dir.path().join("local.bin");
        std::fs::write(&local, b"hello multipart").expect("test write");

        let outcome = engine(&storage)
            .upload_file(&local, &fs.path("/bucket/local.bin", &[]), None, &options(4))
            .await
            .expect("test upload");
        assert_eq!(outcome, TransferOutcome { size: 15, parts: 4 });
        assert_eq!(
            storage.inner.object_bytes("bucket", "local.bin").as_deref(),
            Some(&b"hello multipart"[..])
        );

        let outcome = engine(&storage)
            .upload_file(&local, &fs.path("/bucket/small.bin", &[]), None, &options(0))
            .await
            .expect("test upload");
        assert!(!outcome.is_multipart());
    }

    #[tokio::test]
    async fn test_should_fail_before_initiating_for_missing_source() {
        let (storage, fs) = setup(FaultyStorage::default(), 0);
        let err = engine(&storage)
            .copy(
                &fs.path("/bucket/missing.bin", &[]),
                &fs.path("/bucket/target.bin", &[]),
                None,
                &options(5),
            )
            .await
            .expect_err("test missing source");
        assert!(err.is_not_found());
        assert_eq!(storage.inner.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_should_reject_path_without_key() {
        let (storage, fs) = setup(FaultyStorage::default(), 0);
        let err = engine(&storage)
            .upload_bytes(Bytes::new(), &fs.path("/bucket", &[]), None, &options(5))
            .await
            .expect_err("test bucket path");
        assert!(matches!(err, S3FsError::InvalidArgument { .. }));
    }

    #[test]
    fn test_should_enforce_session_transitions() {
        let handle = MultipartHandle {
            bucket: "bucket".to_owned(),
            key: "key".to_owned(),
            upload_id: "u-1".to_owned(),
        };
        let mut session = TransferSession::new(handle, 10, plan_parts(10, 4).expect("test plan"));
        assert_eq!(session.state(), SessionState::Initiated);
        assert!(session.record_part(1, "e1".to_owned()).is_err());
        assert!(session.mark_completed().is_err());

        session.begin_parts().expect("test begin");
        session.record_part(1, "e1".to_owned()).expect("test record");
        session.record_part(3, "e3".to_owned()).expect("test record");
        assert!(session.record_part(4, "e4".to_owned()).is_err());
        assert!(session.completed_parts().is_err());

        session.record_part(2, "e2".to_owned()).expect("test record");
        let completed = session.completed_parts().expect("test completed parts");
        assert_eq!(completed.len(), 3);
        session.mark_completed().expect("test complete");
        assert!(session.mark_aborted().is_err());
    }
}
