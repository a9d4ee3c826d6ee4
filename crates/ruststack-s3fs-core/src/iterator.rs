//! Lazy one-level directory listing.
//!
//! [`DirectoryStream`] turns the paginated delimiter listing of the store
//! into a forward-only sequence of child paths. One page is buffered at a
//! time; the next page is requested only when the buffer runs dry and the
//! previous page was truncated.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::Stream;
use tracing::trace;

use crate::error::{S3FsError, S3FsResult};
use crate::filesystem::S3FileSystem;
use crate::path::S3Path;
use crate::storage::{ListRequest, ListingPage};
use crate::utils::SEPARATOR;

/// A single-pass sequence of the direct children of a directory prefix.
///
/// Mutation through the stream is not supported and the stream cannot be
/// restarted; build a new one to enumerate again.
#[derive(Debug)]
pub struct DirectoryStream {
    fs: Arc<S3FileSystem>,
    bucket: String,
    prefix: String,
    max_keys: usize,
    buffer: VecDeque<S3Path>,
    seen: HashSet<String>,
    continuation_token: Option<String>,
    exhausted: bool,
    pages: usize,
}

impl DirectoryStream {
    /// Create a stream over the children of `prefix` in `bucket`.
    ///
    /// `prefix` must be empty, the bucket root marker `/`, or end with the
    /// separator. No request is made until the first element is pulled.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] for a prefix that does not end
    /// with the separator, and [`S3FsError::ClosedFileSystem`] when `fs` has
    /// been closed.
    pub fn new(fs: &Arc<S3FileSystem>, bucket: &str, prefix: &str) -> S3FsResult<Self> {
        fs.ensure_open()?;
        let prefix = if prefix == SEPARATOR { "" } else { prefix };
        if !prefix.is_empty() && !prefix.ends_with(SEPARATOR) {
            return Err(S3FsError::invalid_argument(format!(
                "directory prefix must end with {SEPARATOR:?}: {prefix:?}"
            )));
        }
        Ok(Self {
            fs: Arc::clone(fs),
            bucket: bucket.to_owned(),
            prefix: prefix.to_owned(),
            max_keys: fs.config().max_keys,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            continuation_token: None,
            exhausted: false,
            pages: 0,
        })
    }

    /// Whether another child is available.
    ///
    /// Fetches the next page when the buffered one is used up. Calling this
    /// repeatedly never consumes an element.
    ///
    /// # Errors
    ///
    /// Propagates listing failures of the store.
    pub async fn has_next(&mut self) -> S3FsResult<bool> {
        while self.buffer.is_empty() {
            if self.exhausted {
                return Ok(false);
            }
            self.fetch_page().await?;
        }
        Ok(true)
    }

    /// The next child, or `None` once the listing is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates listing failures of the store.
    pub async fn next_path(&mut self) -> S3FsResult<Option<S3Path>> {
        if self.has_next().await? {
            Ok(self.buffer.pop_front())
        } else {
            Ok(None)
        }
    }

    /// Always fails: a directory stream is read-only.
    ///
    /// # Errors
    ///
    /// Always returns [`S3FsError::Unsupported`].
    pub fn remove(&mut self) -> S3FsResult<()> {
        Err(S3FsError::Unsupported {
            operation: "DirectoryStream::remove",
        })
    }

    /// Convert into a [`Stream`] of child paths.
    pub fn into_stream(self) -> impl Stream<Item = S3FsResult<S3Path>> + Send {
        futures::stream::try_unfold(self, |mut stream| async move {
            Ok(stream.next_path().await?.map(|path| (path, stream)))
        })
    }

    /// Drain the remaining children into a vector.
    ///
    /// # Errors
    ///
    /// Propagates listing failures of the store.
    pub async fn collect_paths(mut self) -> S3FsResult<Vec<S3Path>> {
        let mut paths = Vec::new();
        while let Some(path) = self.next_path().await? {
            paths.push(path);
        }
        Ok(paths)
    }

    async fn fetch_page(&mut self) -> S3FsResult<()> {
        let request = ListRequest::new(self.bucket.as_str(), self.prefix.as_str())
            .with_delimiter(SEPARATOR)
            .with_continuation_token(self.continuation_token.take())
            .with_max_keys(self.max_keys);
        let page = self.fs.storage().list_objects(&request).await?;
        page.validate()?;
        self.pages += 1;

        let before = self.buffer.len();
        self.buffer_children(&page);
        trace!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            page = self.pages,
            children = self.buffer.len() - before,
            is_truncated = page.is_truncated,
            "fetched directory page"
        );

        if page.is_truncated {
            self.continuation_token = page.next_continuation_token;
        } else {
            self.exhausted = true;
        }
        Ok(())
    }

    fn buffer_children(&mut self, page: &ListingPage) {
        let mut entries: Vec<&str> = page
            .common_prefixes
            .iter()
            .map(String::as_str)
            .chain(page.keys())
            .filter(|entry| *entry != self.prefix)
            .collect();
        entries.sort_unstable();

        for entry in entries {
            let Some(rest) = entry.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let name = rest.trim_end_matches(SEPARATOR);
            if name.is_empty() || !self.seen.insert(name.to_owned()) {
                continue;
            }
            self.buffer
                .push_back(S3Path::from_bucket_key(&self.fs, &self.bucket, entry));
        }
    }
}
