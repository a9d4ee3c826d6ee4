//! Hierarchical filesystem view over S3 object storage for RustStack.
//!
//! Buckets hold flat keys; this crate layers paths, directories, file
//! attributes and copy/upload semantics on top of them. The store itself is
//! reached only through the [`storage::ObjectStorage`] trait, so the same
//! core runs against the in-memory store in tests and against a real
//! endpoint through the `ruststack-s3fs-aws` adapter.
//!
//! # Architecture
//!
//! ```text
//! S3FileSystemProvider (registry, file operations)
//!        |
//!        +-- S3Path (path algebra, no I/O)
//!        +-- DirectoryStream (paginated delimiter listing)
//!        +-- AttributeResolver (metadata -> file attributes)
//!        +-- TransferEngine (single-shot / multipart copy & upload)
//!        |
//!        v
//!   ObjectStorage (InMemoryStorage | AwsS3Storage)
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod iterator;
pub mod path;
pub mod provider;
pub mod storage;
pub mod transfer;
pub mod uri;
pub mod utils;

pub use attributes::{AttributeResolver, BasicFileAttributes, S3FileAttributes};
pub use config::S3FsConfig;
pub use error::{S3FsError, S3FsResult};
pub use filesystem::S3FileSystem;
pub use iterator::DirectoryStream;
pub use path::S3Path;
pub use provider::{CopyOptions, S3FileSystemProvider, StorageFactory};
pub use storage::{InMemoryStorage, ObjectStorage};
pub use transfer::{MultipartOptions, TransferEngine};
