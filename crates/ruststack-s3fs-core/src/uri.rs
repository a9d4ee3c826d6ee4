//! `s3://host/bucket/key` URIs.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use crate::error::{S3FsError, S3FsResult};
use crate::utils::SEPARATOR;

/// The only URI scheme served by the provider.
pub const S3_SCHEME: &str = "s3";

/// A parsed filesystem URI.
///
/// An empty host selects the default endpoint of the storage client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    host: String,
    path: String,
}

impl S3Uri {
    /// Parse `s3://host/path`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] for another scheme, a missing
    /// `//` authority marker, or a path that does not decode as UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_s3fs_core::uri::S3Uri;
    ///
    /// let uri = S3Uri::parse("s3://localhost:4566/bucket/dir/file%201").unwrap();
    /// assert_eq!(uri.host(), "localhost:4566");
    /// assert_eq!(uri.bucket(), Some("bucket"));
    /// assert_eq!(uri.key(), "dir/file 1");
    /// ```
    pub fn parse(uri: &str) -> S3FsResult<Self> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| S3FsError::invalid_argument(format!("missing scheme in {uri:?}")))?;
        if !scheme.eq_ignore_ascii_case(S3_SCHEME) {
            return Err(S3FsError::invalid_argument(format!(
                "URI scheme must be {S3_SCHEME}, got {scheme:?}"
            )));
        }
        let rest = rest.strip_prefix("//").ok_or_else(|| {
            S3FsError::invalid_argument(format!("missing authority in {uri:?}"))
        })?;
        let (host, raw_path) = match rest.find('/') {
            Some(pos) => rest.split_at(pos),
            None => (rest, SEPARATOR),
        };
        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| S3FsError::invalid_argument(format!("invalid UTF-8 in {uri:?}")))?
            .into_owned();
        Ok(Self {
            host: host.to_owned(),
            path,
        })
    }

    /// Endpoint host (possibly with port); empty for the default endpoint.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The decoded absolute path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The first path segment.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.path.split(SEPARATOR).find(|s| !s.is_empty())
    }

    /// Everything after the bucket segment, without the leading separator.
    #[must_use]
    pub fn key(&self) -> &str {
        let trimmed = self.path.trim_start_matches(SEPARATOR);
        trimmed
            .split_once(SEPARATOR)
            .map_or("", |(_, key)| key)
    }
}

impl FromStr for S3Uri {
    type Err = S3FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}://{}{}", self.host, self.path)
    }
}
