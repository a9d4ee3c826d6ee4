//! Filesystem provider: the registry of open filesystems and the file
//! operations built on paths, listings, attributes and transfers.
//!
//! The registry is an explicit object rather than process-wide state. One
//! filesystem may be open per `(scheme, host, credential identity)`; opening
//! a second one for the same key fails with [`S3FsError::AlreadyExists`]
//! until the first is closed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use crate::attributes::{AttributeResolver, BasicFileAttributes, S3FileAttributes};
use crate::config::S3FsConfig;
use crate::error::{S3FsError, S3FsResult};
use crate::filesystem::{FileSystemKey, S3FileSystem};
use crate::iterator::DirectoryStream;
use crate::path::S3Path;
use crate::storage::{CannedAcl, ListRequest, ObjectStorage};
use crate::transfer::{TransferEngine, TransferOutcome, object_location};
use crate::uri::{S3_SCHEME, S3Uri};
use crate::utils::SEPARATOR;

/// Open filesystems by key.
pub(crate) type Registry = DashMap<FileSystemKey, Arc<S3FileSystem>>;

// ---------------------------------------------------------------------------
// StorageFactory
// ---------------------------------------------------------------------------

/// Builds the storage collaborator of a newly opened filesystem.
pub trait StorageFactory: Send + Sync + std::fmt::Debug {
    /// Create a storage client for `host` (empty for the default endpoint).
    ///
    /// # Errors
    ///
    /// Returns an error when the client cannot be configured.
    fn create(&self, host: &str, config: &S3FsConfig) -> S3FsResult<Arc<dyn ObjectStorage>>;
}

/// A factory that hands out the same storage to every filesystem.
#[derive(Debug, Clone)]
pub struct SharedStorage(
    /// The storage every filesystem is given.
    pub Arc<dyn ObjectStorage>,
);

impl StorageFactory for SharedStorage {
    fn create(&self, _host: &str, _config: &S3FsConfig) -> S3FsResult<Arc<dyn ObjectStorage>> {
        Ok(Arc::clone(&self.0))
    }
}

// ---------------------------------------------------------------------------
// CopyOptions
// ---------------------------------------------------------------------------

/// Options of [`S3FileSystemProvider::copy`] and
/// [`S3FileSystemProvider::move_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct CopyOptions {
    /// Overwrite an existing target.
    #[builder(default)]
    pub replace_existing: bool,

    /// Carry the source attributes over. Server-side copies always keep the
    /// object metadata, so this is accepted for compatibility.
    #[builder(default)]
    pub copy_attributes: bool,

    /// Part size overriding the filesystem configuration.
    #[builder(default, setter(strip_option))]
    pub chunk_size: Option<u64>,

    /// ACL applied to the written object.
    #[builder(default, setter(strip_option))]
    pub acl: Option<CannedAcl>,
}

// ---------------------------------------------------------------------------
// S3FileSystemProvider
// ---------------------------------------------------------------------------

/// Opens, tracks and operates on S3 filesystems.
pub struct S3FileSystemProvider {
    registry: Arc<Registry>,
    factory: Arc<dyn StorageFactory>,
    base_config: S3FsConfig,
}

impl std::fmt::Debug for S3FileSystemProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FileSystemProvider")
            .field("open_count", &self.registry.len())
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

/// Bucket and (possibly empty) key of an absolute path.
fn bucket_key(path: &S3Path) -> S3FsResult<(String, String)> {
    path.file_system().ensure_open()?;
    let bucket = path
        .bucket()
        .ok_or_else(|| S3FsError::invalid_argument(format!("{path} is not inside a bucket")))?;
    Ok((bucket.to_owned(), path.key()))
}

/// Delete the object backing `path`: its marker for a directory, the key
/// itself for a file.
async fn remove_entry(path: &S3Path, attrs: &S3FileAttributes) -> S3FsResult<()> {
    let (bucket, key) = bucket_key(path)?;
    let object = if attrs.is_directory() {
        directory_prefix(&key)
    } else {
        key
    };
    path.file_system()
        .storage()
        .delete_object(&bucket, &object)
        .await
}

fn directory_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{}{SEPARATOR}", key.trim_end_matches(SEPARATOR))
    }
}

impl S3FileSystemProvider {
    /// Create a provider whose base configuration comes from the environment.
    #[must_use]
    pub fn new(factory: Arc<dyn StorageFactory>) -> Self {
        Self::with_config(factory, S3FsConfig::from_env())
    }

    /// Create a provider with an explicit base configuration.
    #[must_use]
    pub fn with_config(factory: Arc<dyn StorageFactory>, base_config: S3FsConfig) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            factory,
            base_config,
        }
    }

    /// The URI scheme served.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        S3_SCHEME
    }

    /// Number of open filesystems.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.registry.len()
    }

    // -- registry ------------------------------------------------------------

    /// Open a filesystem for `uri`, overlaying `env` on the base
    /// configuration.
    ///
    /// # Errors
    ///
    /// - [`S3FsError::InvalidArgument`] for a malformed URI or configuration.
    /// - [`S3FsError::AlreadyExists`] while a filesystem with the same key is
    ///   open.
    pub fn new_file_system<S: std::hash::BuildHasher>(
        &self,
        uri: &str,
        env: &HashMap<String, String, S>,
    ) -> S3FsResult<Arc<S3FileSystem>> {
        let uri = S3Uri::parse(uri)?;
        let config = self.base_config.clone().with_env_map(env);
        config.validate()?;
        let key = FileSystemKey::new(uri.host(), &config);
        if let Some(existing) = self.registry.get(&key) {
            return Err(S3FsError::AlreadyExists {
                target: existing.uri(),
            });
        }

        // No shard lock is held while the factory runs.
        let storage = self.factory.create(uri.host(), &config)?;
        let fs = S3FileSystem::registered(
            key.clone(),
            storage,
            config,
            Arc::downgrade(&self.registry),
        );
        match self.registry.entry(key) {
            Entry::Occupied(existing) => Err(S3FsError::AlreadyExists {
                target: existing.get().uri(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&fs));
                Ok(fs)
            }
        }
    }

    /// The open filesystem serving `uri`'s host.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::FileSystemNotFound`] when none is open.
    pub fn get_file_system(&self, uri: &str) -> S3FsResult<Arc<S3FileSystem>> {
        let parsed = S3Uri::parse(uri)?;
        let exact = FileSystemKey::new(parsed.host(), &self.base_config);
        if let Some(fs) = self.registry.get(&exact) {
            return Ok(Arc::clone(fs.value()));
        }
        self.registry
            .iter()
            .find(|entry| entry.key().host == parsed.host())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| S3FsError::FileSystemNotFound {
                uri: uri.to_owned(),
            })
    }

    /// Resolve `uri` to a path, opening its filesystem with the base
    /// configuration when none is open yet.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] for a malformed URI and
    /// propagates storage-factory failures.
    pub fn get_path(&self, uri: &str) -> S3FsResult<S3Path> {
        let parsed = S3Uri::parse(uri)?;
        let fs = match self.get_file_system(uri) {
            Ok(fs) => fs,
            Err(S3FsError::FileSystemNotFound { .. }) => {
                match self.new_file_system(uri, &HashMap::new()) {
                    Ok(fs) => fs,
                    Err(S3FsError::AlreadyExists { .. }) => self.get_file_system(uri)?,
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(fs.path(parsed.path(), &[]))
    }

    /// Close `fs` and free its registry slot.
    pub fn close(&self, fs: &S3FileSystem) {
        fs.close();
    }

    // -- reads ---------------------------------------------------------------

    /// Stream the children of the directory `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidArgument`] when `dir` is not inside a
    /// bucket.
    pub fn new_directory_stream(&self, dir: &S3Path) -> S3FsResult<DirectoryStream> {
        let (bucket, key) = bucket_key(dir)?;
        DirectoryStream::new(dir.file_system(), &bucket, &directory_prefix(&key))
    }

    /// Attributes of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::NotFound`] when nothing exists at `path`.
    pub async fn read_attributes(&self, path: &S3Path) -> S3FsResult<S3FileAttributes> {
        let (bucket, key) = bucket_key(path)?;
        AttributeResolver::new(Arc::clone(path.file_system().storage()))
            .read(&bucket, &key)
            .await
    }

    /// Whether something exists at `path`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures other than a missing entry.
    pub async fn exists(&self, path: &S3Path) -> S3FsResult<bool> {
        match self.read_attributes(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The whole content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::NotFound`] for a missing file.
    pub async fn read_all(&self, path: &S3Path) -> S3FsResult<Bytes> {
        let (bucket, key) = object_location(path)?;
        path.file_system()
            .storage()
            .get_object(&bucket, &key, None)
            .await
    }

    // -- writes --------------------------------------------------------------

    /// Write `data` to the file at `path`, splitting it into parts above
    /// the configured chunk size.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::TransferFailed`] when a multipart upload was
    /// aborted.
    pub async fn write_all(&self, path: &S3Path, data: Bytes) -> S3FsResult<TransferOutcome> {
        let fs = path.file_system();
        fs.ensure_open()?;
        TransferEngine::new(Arc::clone(fs.storage()))
            .upload_bytes(data, path, None, &fs.multipart_options())
            .await
    }

    /// Upload the local file `local` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::TransferFailed`] when a multipart upload was
    /// aborted.
    pub async fn upload_file(&self, local: &Path, target: &S3Path) -> S3FsResult<TransferOutcome> {
        let fs = target.file_system();
        fs.ensure_open()?;
        TransferEngine::new(Arc::clone(fs.storage()))
            .upload_file(local, target, None, &fs.multipart_options())
            .await
    }

    /// Create the directory `dir` by writing a `key/` marker object.
    ///
    /// # Errors
    ///
    /// - [`S3FsError::AlreadyExists`] if a file or directory exists at `dir`.
    /// - [`S3FsError::Unsupported`] for a bucket root that does not exist.
    pub async fn create_directory(&self, dir: &S3Path) -> S3FsResult<()> {
        let (bucket, key) = bucket_key(dir)?;
        if self.exists(dir).await? {
            return Err(S3FsError::AlreadyExists {
                target: dir.to_string(),
            });
        }
        if key.is_empty() {
            return Err(S3FsError::Unsupported {
                operation: "create bucket",
            });
        }
        let marker = directory_prefix(&key);
        dir.file_system()
            .storage()
            .put_object(&bucket, &marker, Bytes::new(), None)
            .await?;
        debug!(bucket = %bucket, key = %marker, "created directory marker");
        Ok(())
    }

    /// Delete the file or empty directory at `path`.
    ///
    /// # Errors
    ///
    /// - [`S3FsError::NotFound`] if nothing exists at `path`.
    /// - [`S3FsError::DirectoryNotEmpty`] for a directory with children.
    pub async fn delete(&self, path: &S3Path) -> S3FsResult<()> {
        let (bucket, key) = bucket_key(path)?;
        if key.is_empty() {
            return Err(S3FsError::Unsupported {
                operation: "delete bucket",
            });
        }
        let attrs = self.read_attributes(path).await?;
        if attrs.is_directory() {
            self.ensure_empty_directory(path).await?;
        }
        remove_entry(path, &attrs).await?;
        debug!(bucket = %bucket, key = %key, directory = attrs.is_directory(), "deleted");
        Ok(())
    }

    /// Delete `path` when it exists. Returns whether something was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::DirectoryNotEmpty`] for a directory with
    /// children.
    pub async fn delete_if_exists(&self, path: &S3Path) -> S3FsResult<bool> {
        match self.delete(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_empty_directory(&self, dir: &S3Path) -> S3FsResult<()> {
        let (bucket, key) = bucket_key(dir)?;
        let prefix = directory_prefix(&key);
        let page = dir
            .file_system()
            .storage()
            .list_objects(
                &ListRequest::new(bucket.as_str(), prefix.as_str())
                    .with_delimiter(SEPARATOR)
                    .with_max_keys(2),
            )
            .await?;
        let has_children = !page.common_prefixes.is_empty() || page.keys().any(|k| k != prefix);
        if has_children {
            return Err(S3FsError::DirectoryNotEmpty {
                path: dir.to_string(),
            });
        }
        Ok(())
    }

    /// Copy `source` to `target`.
    ///
    /// Directories are copied as an empty marker, never with their content.
    /// Sources on another filesystem are read and re-uploaded.
    ///
    /// # Errors
    ///
    /// - [`S3FsError::NotFound`] for a missing source.
    /// - [`S3FsError::AlreadyExists`] for an existing target without
    ///   `replace_existing`.
    /// - [`S3FsError::DirectoryNotEmpty`] when replacing a directory that
    ///   has children.
    /// - [`S3FsError::TransferFailed`] when a multipart transfer was aborted.
    pub async fn copy(
        &self,
        source: &S3Path,
        target: &S3Path,
        options: &CopyOptions,
    ) -> S3FsResult<()> {
        if source == target {
            return Ok(());
        }
        let source_attrs = self.read_attributes(source).await?;
        let (target_bucket, target_key) = bucket_key(target)?;

        match self.read_attributes(target).await {
            Ok(existing) => {
                if !options.replace_existing {
                    return Err(S3FsError::AlreadyExists {
                        target: target.to_string(),
                    });
                }
                if existing.is_directory() {
                    self.ensure_empty_directory(target).await?;
                }
                if existing.is_directory() != source_attrs.is_directory() {
                    remove_entry(target, &existing).await?;
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let target_fs = target.file_system();
        if source_attrs.is_directory() {
            target_fs
                .storage()
                .put_object(
                    &target_bucket,
                    &directory_prefix(&target_key),
                    Bytes::new(),
                    options.acl,
                )
                .await?;
            debug!(source = %source, target = %target, "copied directory marker");
            return Ok(());
        }

        let mut transfer = target_fs.multipart_options();
        if let Some(chunk_size) = options.chunk_size {
            transfer = transfer.with_chunk_size(chunk_size);
        }
        let engine = TransferEngine::new(Arc::clone(target_fs.storage()));
        let outcome = if Arc::ptr_eq(source.file_system(), target_fs) {
            engine.copy(source, target, options.acl, &transfer).await?
        } else {
            let data = self.read_all(source).await?;
            engine
                .upload_bytes(data, target, options.acl, &transfer)
                .await?
        };
        debug!(
            source = %source,
            target = %target,
            size = outcome.size,
            parts = outcome.parts,
            "copy completed"
        );
        Ok(())
    }

    /// Move `source` to `target`: copy, then delete the source.
    ///
    /// # Errors
    ///
    /// As [`copy`](Self::copy), plus [`S3FsError::DirectoryNotEmpty`] when
    /// `source` is a directory with children.
    pub async fn move_path(
        &self,
        source: &S3Path,
        target: &S3Path,
        options: &CopyOptions,
    ) -> S3FsResult<()> {
        if source == target {
            return Ok(());
        }
        if self.read_attributes(source).await?.is_directory() {
            self.ensure_empty_directory(source).await?;
        }
        self.copy(source, target, options).await?;
        self.delete(source).await
    }

    /// Copy the tree under `source` into `target`, entry by entry.
    ///
    /// There is no rollback: a failure leaves the entries copied so far in
    /// place. Returns the number of files copied.
    ///
    /// # Errors
    ///
    /// Propagates the first failing entry.
    pub async fn copy_tree(
        &self,
        source: &S3Path,
        target: &S3Path,
        options: &CopyOptions,
    ) -> S3FsResult<usize> {
        if target.normalize().starts_with(&source.normalize()) {
            return Err(S3FsError::invalid_argument(format!(
                "cannot copy {source} into its own subtree {target}"
            )));
        }
        let mut pending = vec![(source.clone(), target.clone())];
        let mut files = 0;
        while let Some((from, to)) = pending.pop() {
            let attrs = self.read_attributes(&from).await?;
            if !attrs.is_directory() {
                self.copy(&from, &to, options).await?;
                files += 1;
                continue;
            }
            if !self.exists(&to).await? {
                self.create_directory(&to).await?;
            }
            let mut children = self.new_directory_stream(&from)?;
            while let Some(child) = children.next_path().await? {
                if let Some(name) = child.file_name() {
                    pending.push((child, to.resolve(&name)));
                }
            }
        }
        info!(source = %source, target = %target, files, "tree copy completed");
        Ok(files)
    }
}
