//! S3 filesystem error types.
//!
//! Defines [`S3FsError`], the single error enum shared by the path model,
//! directory iterator, attribute resolver, and transfer engine. Storage
//! adapters translate store-specific failures into these variants at the
//! boundary: a missing key or bucket always becomes [`S3FsError::NotFound`],
//! any other transport failure becomes [`S3FsError::Internal`].
//!
//! # Usage
//!
//! ```
//! use ruststack_s3fs_core::error::S3FsError;
//!
//! let err = S3FsError::not_found("my-bucket", "dir/file");
//! assert!(err.is_not_found());
//! assert!(err.to_string().contains("dir/file"));
//! ```

/// S3 filesystem error type.
#[derive(Debug, thiserror::Error)]
pub enum S3FsError {
    /// The bucket or key does not exist.
    #[error("No such file: s3://{bucket}/{key}")]
    NotFound {
        /// The bucket that was queried.
        bucket: String,
        /// The key that was not found (empty for a missing bucket).
        key: String,
    },

    /// The target exists and replacing it was not requested.
    #[error("File already exists: {target}")]
    AlreadyExists {
        /// The path or filesystem URI that already exists.
        target: String,
    },

    /// An argument provided is invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A delete was attempted on a virtual directory that still has children.
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The directory path.
        path: String,
    },

    /// A part or completion request of a multipart session failed.
    ///
    /// The session has already been aborted (best effort) when this is
    /// returned; `source` carries the original cause.
    #[error("Multipart transfer to {key} failed (upload id {upload_id})")]
    TransferFailed {
        /// The target key of the multipart session.
        key: String,
        /// The multipart session identifier.
        upload_id: String,
        /// The failure that interrupted the transfer.
        #[source]
        source: Box<S3FsError>,
    },

    /// The requested operation is not supported.
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// The operation name.
        operation: &'static str,
    },

    /// No filesystem is open for the given URI.
    #[error("Filesystem not found: {uri}")]
    FileSystemNotFound {
        /// The URI that was looked up.
        uri: String,
    },

    /// The filesystem has been closed.
    #[error("Filesystem is closed: {uri}")]
    ClosedFileSystem {
        /// The URI of the closed filesystem.
        uri: String,
    },

    /// Internal or transport error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl S3FsError {
    /// Build a [`S3FsError::NotFound`] for a bucket/key pair.
    #[must_use]
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Build a [`S3FsError::InvalidArgument`] from a message.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether this error reports a missing bucket or key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience result type for S3 filesystem operations.
pub type S3FsResult<T> = Result<T, S3FsError>;
