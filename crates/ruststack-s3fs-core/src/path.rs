//! Path algebra over a bucket + key namespace.
//!
//! An [`S3Path`] is a sequence of segments with an absolute flag. For an
//! absolute path the first segment is the bucket and the remaining segments
//! form the key. Every operation here is lexical: nothing touches the store,
//! so a path that does not exist remotely still parses, normalizes and
//! compares.
//!
//! ```
//! use std::sync::Arc;
//!
//! use ruststack_s3fs_core::config::S3FsConfig;
//! use ruststack_s3fs_core::filesystem::S3FileSystem;
//! use ruststack_s3fs_core::storage::InMemoryStorage;
//!
//! let fs = S3FileSystem::new("", Arc::new(InMemoryStorage::new()), S3FsConfig::default());
//! let dir = fs.path("/bucket/dir", &[]);
//! let file = dir.resolve_str("sub/../file1");
//!
//! assert_eq!(file.normalize().to_string(), "/bucket/dir/file1");
//! assert_eq!(file.bucket(), Some("bucket"));
//! assert!(file.starts_with(&dir));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::error::{S3FsError, S3FsResult};
use crate::filesystem::S3FileSystem;
use crate::utils::{SEPARATOR, SEPARATOR_CHAR};

/// Characters escaped when a segment is rendered into a URI.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const CURRENT_DIR: &str = ".";
const PARENT_DIR: &str = "..";

/// A path on an [`S3FileSystem`].
#[derive(Clone)]
pub struct S3Path {
    fs: Arc<S3FileSystem>,
    absolute: bool,
    segments: Vec<String>,
}

impl S3Path {
    /// Parse `first` followed by `more`, joined with the separator.
    ///
    /// The path is absolute when `first` starts with the separator. Empty
    /// segments are discarded, so `"/a//b/"` has the segments `a` and `b`.
    #[must_use]
    pub fn parse(fs: &Arc<S3FileSystem>, first: &str, more: &[&str]) -> Self {
        let absolute = first.starts_with(SEPARATOR_CHAR);
        let segments = std::iter::once(first)
            .chain(more.iter().copied())
            .flat_map(|part| part.split(SEPARATOR_CHAR))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self::from_segments(fs, absolute, segments)
    }

    /// Build the absolute path of `key` inside `bucket`.
    ///
    /// A trailing separator on `key` (a directory key) does not produce an
    /// extra segment.
    #[must_use]
    pub fn from_bucket_key(fs: &Arc<S3FileSystem>, bucket: &str, key: &str) -> Self {
        let segments = std::iter::once(bucket)
            .chain(key.split(SEPARATOR_CHAR))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self::from_segments(fs, true, segments)
    }

    fn from_segments(fs: &Arc<S3FileSystem>, absolute: bool, segments: Vec<String>) -> Self {
        Self {
            fs: Arc::clone(fs),
            absolute,
            segments,
        }
    }

    fn relative(&self, segments: Vec<String>) -> Self {
        Self::from_segments(&self.fs, false, segments)
    }

    /// The filesystem this path belongs to.
    #[must_use]
    pub fn file_system(&self) -> &Arc<S3FileSystem> {
        &self.fs
    }

    /// Whether the path starts at the filesystem root.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether the path has no segments and is relative (the `""` path).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.absolute && self.segments.is_empty()
    }

    /// The bucket of an absolute path with at least one segment.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        if self.absolute {
            self.segments.first().map(String::as_str)
        } else {
            None
        }
    }

    /// The object key: the segments after the bucket for an absolute path,
    /// every segment for a relative one.
    #[must_use]
    pub fn key(&self) -> String {
        let skip = usize::from(self.absolute);
        self.segments
            .get(skip..)
            .map(|rest| rest.join(SEPARATOR))
            .unwrap_or_default()
    }

    /// The last segment as a relative single-segment path.
    #[must_use]
    pub fn file_name(&self) -> Option<Self> {
        self.segments.last().map(|last| self.relative(vec![last.clone()]))
    }

    /// The path without its last segment.
    ///
    /// `/bucket` has the parent `/`; a single-segment relative path and the
    /// root have none.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.segments.len() {
            0 => None,
            1 if !self.absolute => None,
            n => Some(Self::from_segments(
                &self.fs,
                self.absolute,
                self.segments[..n - 1].to_vec(),
            )),
        }
    }

    /// The root `/` for an absolute path.
    #[must_use]
    pub fn root(&self) -> Option<Self> {
        self.absolute
            .then(|| Self::from_segments(&self.fs, true, Vec::new()))
    }

    /// Number of segments.
    #[must_use]
    pub fn name_count(&self) -> usize {
        self.segments.len()
    }

    /// The segment at `index` as a relative path.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] when `index` is out of range.
    pub fn name(&self, index: usize) -> S3FsResult<Self> {
        let end = index.checked_add(1).ok_or_else(|| {
            S3FsError::invalid_argument(format!("name index {index} is out of range"))
        })?;
        self.subpath(index, end)
    }

    /// The relative path made of segments `begin..end`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] unless `begin < end <= name_count()`.
    pub fn subpath(&self, begin: usize, end: usize) -> S3FsResult<Self> {
        if begin >= end || end > self.segments.len() {
            return Err(S3FsError::invalid_argument(format!(
                "subpath {begin}..{end} of a path with {} names",
                self.segments.len()
            )));
        }
        Ok(self.relative(self.segments[begin..end].to_vec()))
    }

    /// Each segment as a relative single-segment path.
    pub fn names(&self) -> impl Iterator<Item = Self> + '_ {
        self.segments.iter().map(|s| self.relative(vec![s.clone()]))
    }

    fn same_fs(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs)
    }

    /// Whether `other` is a leading part of this path.
    ///
    /// The empty path starts with nothing but the empty path, and an
    /// absolute path never starts with a relative one (or the reverse).
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        if !self.same_fs(other) {
            return false;
        }
        if other.is_empty() {
            return self.is_empty();
        }
        self.absolute == other.absolute && self.segments.starts_with(&other.segments)
    }

    /// [`starts_with`](Self::starts_with) on `other` parsed with this path's
    /// filesystem.
    #[must_use]
    pub fn starts_with_str(&self, other: &str) -> bool {
        self.starts_with(&S3Path::parse(&self.fs, other, &[]))
    }

    /// Whether `other` is a trailing part of this path.
    ///
    /// An absolute `other` must equal this path. An empty `other` matches
    /// only the empty path.
    #[must_use]
    pub fn ends_with(&self, other: &Self) -> bool {
        if !self.same_fs(other) {
            return false;
        }
        if other.absolute {
            return self == other;
        }
        if other.segments.is_empty() {
            return self.is_empty();
        }
        self.segments.ends_with(&other.segments)
    }

    /// [`ends_with`](Self::ends_with) on `other` parsed with this path's
    /// filesystem.
    #[must_use]
    pub fn ends_with_str(&self, other: &str) -> bool {
        self.ends_with(&S3Path::parse(&self.fs, other, &[]))
    }

    /// Collapse `.` and `..` segments lexically.
    ///
    /// `..` removes the segment before it, or disappears when there is none.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.as_str() {
                CURRENT_DIR => {}
                PARENT_DIR => {
                    out.pop();
                }
                _ => out.push(segment.clone()),
            }
        }
        Self::from_segments(&self.fs, self.absolute, out)
    }

    /// Append `other` to this path.
    ///
    /// An absolute `other` is returned unchanged; an empty one returns this
    /// path.
    #[must_use]
    pub fn resolve(&self, other: &Self) -> Self {
        if other.absolute {
            return other.clone();
        }
        if other.segments.is_empty() {
            return self.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::from_segments(&self.fs, self.absolute, segments)
    }

    /// [`resolve`](Self::resolve) on `other` parsed with this path's filesystem.
    #[must_use]
    pub fn resolve_str(&self, other: &str) -> Self {
        self.resolve(&S3Path::parse(&self.fs, other, &[]))
    }

    /// Resolve `other` against this path's parent.
    #[must_use]
    pub fn resolve_sibling(&self, other: &Self) -> Self {
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// The relative path that leads from this path to `other`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] when the paths belong to
    /// different filesystems or only one of them is absolute.
    pub fn relativize(&self, other: &Self) -> S3FsResult<Self> {
        if !self.same_fs(other) {
            return Err(S3FsError::invalid_argument(
                "cannot relativize paths of different filesystems",
            ));
        }
        if self.absolute != other.absolute {
            return Err(S3FsError::invalid_argument(format!(
                "cannot relativize {other} against {self}: only one path is absolute"
            )));
        }
        let common = self
            .segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .count();
        let segments = std::iter::repeat_n(PARENT_DIR.to_owned(), self.segments.len() - common)
            .chain(other.segments[common..].iter().cloned())
            .collect();
        Ok(self.relative(segments))
    }

    /// This path made absolute by resolving it against the root.
    #[must_use]
    pub fn to_absolute_path(&self) -> Self {
        if self.absolute {
            self.clone()
        } else {
            Self::from_segments(&self.fs, true, self.segments.clone())
        }
    }

    /// The `s3://<endpoint>/<bucket>/<key>` form of the absolute path.
    #[must_use]
    pub fn to_uri(&self) -> String {
        let mut uri = self.fs.uri();
        let encoded: Vec<String> = self
            .segments
            .iter()
            .map(|s| utf8_percent_encode(s, SEGMENT_ENCODE_SET).to_string())
            .collect();
        uri.push_str(&encoded.join(SEPARATOR));
        uri
    }
}

impl PartialEq for S3Path {
    fn eq(&self, other: &Self) -> bool {
        self.same_fs(other) && self.absolute == other.absolute && self.segments == other.segments
    }
}

impl Eq for S3Path {}

impl Hash for S3Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.fs).hash(state);
        self.absolute.hash(state);
        self.segments.hash(state);
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str(SEPARATOR)?;
        }
        f.write_str(&self.segments.join(SEPARATOR))
    }
}

impl fmt::Debug for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Path")
            .field("endpoint", &self.fs.endpoint())
            .field("absolute", &self.absolute)
            .field("segments", &self.segments)
            .finish()
    }
}
