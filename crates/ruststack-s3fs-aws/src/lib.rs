//! `aws-sdk-s3` storage adapter for the RustStack S3 filesystem.
//!
//! [`AwsS3Storage`] implements [`ObjectStorage`] on top of an
//! [`aws_sdk_s3::Client`]. Missing keys, buckets and uploads are reported as
//! [`S3FsError::NotFound`]; every other SDK failure becomes
//! [`S3FsError::Internal`] carrying the full error context.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use ruststack_s3fs_aws::AwsStorageFactory;
//! use ruststack_s3fs_core::S3FileSystemProvider;
//!
//! let provider = S3FileSystemProvider::new(Arc::new(AwsStorageFactory));
//! let fs = provider
//!     .new_file_system("s3://localhost:4566/", &HashMap::new())
//!     .unwrap();
//! let path = fs.path("/bucket/dir/file.txt", &[]);
//! ```

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, ObjectCannedAcl};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ruststack_s3fs_core::config::S3FsConfig;
use ruststack_s3fs_core::error::{S3FsError, S3FsResult};
use ruststack_s3fs_core::provider::StorageFactory;
use ruststack_s3fs_core::storage::{
    CannedAcl, CompletedPart, ListRequest, ListingPage, MultipartHandle, ObjectMetadata,
    ObjectStorage,
};
use tracing::{debug, trace};

/// Characters kept verbatim in an `x-amz-copy-source` key.
const COPY_SOURCE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Error codes the store uses for a missing entry.
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound", "NoSuchUpload"];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Translate an SDK error, mapping missing-entry codes to `NotFound`.
fn translate<E>(operation: &str, bucket: &str, key: &str, err: &E) -> S3FsError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    if err.code().is_some_and(|code| NOT_FOUND_CODES.contains(&code)) {
        return S3FsError::not_found(bucket, key);
    }
    S3FsError::Internal(anyhow::anyhow!(
        "{operation} on s3://{bucket}/{key} failed: {}",
        DisplayErrorContext(err)
    ))
}

/// Turn an endpoint host into a URL; a value with a scheme is kept as is.
fn endpoint_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        format!("https://{endpoint}")
    }
}

fn to_chrono(ts: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn to_size(len: Option<i64>) -> u64 {
    len.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

fn sdk_acl(acl: Option<CannedAcl>) -> Option<ObjectCannedAcl> {
    acl.map(|a| ObjectCannedAcl::from(a.as_str()))
}

fn part_number(n: u32) -> S3FsResult<i32> {
    i32::try_from(n).map_err(|_| S3FsError::invalid_argument(format!("part number {n} too large")))
}

/// `bytes=first-last` header value of a half-open range.
fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE_SET))
}

// ---------------------------------------------------------------------------
// AwsS3Storage
// ---------------------------------------------------------------------------

/// [`ObjectStorage`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsS3Storage {
    client: Client,
}

impl AwsS3Storage {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the filesystem configuration.
    ///
    /// Static credentials are used when both keys are set; otherwise the
    /// standard `AWS_*` environment variables are consulted on each request.
    #[must_use]
    pub fn from_config(config: &S3FsConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style_access);

        builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => builder.credentials_provider(
                Credentials::new(access_key, secret_key, None, None, "ruststack-s3fs"),
            ),
            _ => builder.credentials_provider(EnvironmentVariableCredentialsProvider::new()),
        };
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint_url(endpoint));
        }

        debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            path_style = config.path_style_access,
            "created S3 client"
        );
        Self::new(Client::from_conf(builder.build()))
    }

    /// Build a client through the default AWS provider chain (profiles,
    /// IMDS, SSO), applying the endpoint and addressing settings of `config`.
    pub async fn load(config: &S3FsConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style_access);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint_url(endpoint));
        }
        Self::new(Client::from_conf(builder.build()))
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStorage for AwsS3Storage {
    async fn head_object(&self, bucket: &str, key: &str) -> S3FsResult<ObjectMetadata> {
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| translate("HeadObject", bucket, key, &e))?;
        Ok(ObjectMetadata {
            key: key.to_owned(),
            size: to_size(out.content_length()),
            last_modified: to_chrono(out.last_modified()),
            etag: out.e_tag().map(ToOwned::to_owned),
        })
    }

    async fn list_objects(&self, request: &ListRequest) -> S3FsResult<ListingPage> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_continuation_token(request.continuation_token.clone())
            .max_keys(i32::try_from(request.max_keys).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| translate("ListObjectsV2", &request.bucket, &request.prefix, &e))?;

        let objects = out
            .contents()
            .iter()
            .filter_map(|o| {
                o.key().map(|key| ObjectMetadata {
                    key: key.to_owned(),
                    size: to_size(o.size()),
                    last_modified: to_chrono(o.last_modified()),
                    etag: o.e_tag().map(ToOwned::to_owned),
                })
            })
            .collect();
        let common_prefixes = out
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(ToOwned::to_owned))
            .collect();

        let page = ListingPage {
            prefix: request.prefix.clone(),
            delimiter: request.delimiter.clone(),
            objects,
            common_prefixes,
            next_continuation_token: out.next_continuation_token().map(ToOwned::to_owned),
            is_truncated: out.is_truncated() == Some(true),
        };
        trace!(
            bucket = %request.bucket,
            prefix = %request.prefix,
            entries = page.len(),
            is_truncated = page.is_truncated,
            "list_objects_v2 completed"
        );
        Ok(page)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<Range<u64>>,
    ) -> S3FsResult<Bytes> {
        if range.as_ref().is_some_and(|r| r.start >= r.end) {
            return Ok(Bytes::new());
        }
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.as_ref().map(range_header))
            .send()
            .await
            .map_err(|e| translate("GetObject", bucket, key, &e))?;
        let body = out
            .body
            .collect()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read body of s3://{bucket}/{key}: {e}"))?;
        Ok(body.into_bytes())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<String> {
        let out = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_acl(sdk_acl(acl))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| translate("PutObject", bucket, key, &e))?;
        Ok(out.e_tag().unwrap_or_default().to_owned())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> S3FsResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| translate("DeleteObject", bucket, key, &e))?;
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
        self.client
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(target_bucket)
            .key(target_key)
            .set_acl(sdk_acl(acl))
            .send()
            .await
            .map_err(|e| translate("CopyObject", source_bucket, source_key, &e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> S3FsResult<Vec<String>> {
        let out = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| translate("ListBuckets", "", "", &e))?;
        Ok(out
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(ToOwned::to_owned))
            .collect())
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        acl: Option<CannedAcl>,
    ) -> S3FsResult<MultipartHandle> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_acl(sdk_acl(acl))
            .send()
            .await
            .map_err(|e| translate("CreateMultipartUpload", bucket, key, &e))?;
        let upload_id = out
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("CreateMultipartUpload returned no upload id"))?;
        Ok(MultipartHandle {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            upload_id: upload_id.to_owned(),
        })
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        _range: Range<u64>,
        data: Bytes,
    ) -> S3FsResult<String> {
        let out = self
            .client
            .upload_part()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .part_number(self::part_number(part_number)?)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| translate("UploadPart", &handle.bucket, &handle.key, &e))?;
        out.e_tag()
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow::anyhow!("UploadPart {part_number} returned no ETag").into())
    }

    async fn copy_part(
        &self,
        handle: &MultipartHandle,
        part_number: u32,
        range: Range<u64>,
        source_bucket: &str,
        source_key: &str,
    ) -> S3FsResult<String> {
        let out = self
            .client
            .upload_part_copy()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .part_number(self::part_number(part_number)?)
            .copy_source(copy_source(source_bucket, source_key))
            .copy_source_range(range_header(&range))
            .send()
            .await
            .map_err(|e| translate("UploadPartCopy", source_bucket, source_key, &e))?;
        out.copy_part_result()
            .and_then(|r| r.e_tag())
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow::anyhow!("UploadPartCopy {part_number} returned no ETag").into())
    }

    async fn complete_multipart_upload(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPart],
    ) -> S3FsResult<()> {
        let parts = parts
            .iter()
            .map(|p| {
                Ok(aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number(p.part_number)?)
                    .e_tag(&p.etag)
                    .build())
            })
            .collect::<S3FsResult<Vec<_>>>()?;
        self.client
            .complete_multipart_upload()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| translate("CompleteMultipartUpload", &handle.bucket, &handle.key, &e))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, handle: &MultipartHandle) -> S3FsResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&handle.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await
            .map_err(|e| translate("AbortMultipartUpload", &handle.bucket, &handle.key, &e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AwsStorageFactory
// ---------------------------------------------------------------------------

/// Opens an [`AwsS3Storage`] per filesystem.
///
/// The URI host becomes the endpoint unless one is configured explicitly,
/// so `s3://localhost:4566/` with `endpoint = "http://localhost:4566"` talks
/// plain HTTP to a local emulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsStorageFactory;

impl StorageFactory for AwsStorageFactory {
    fn create(&self, host: &str, config: &S3FsConfig) -> S3FsResult<Arc<dyn ObjectStorage>> {
        let storage = if host.is_empty() || config.endpoint.is_some() {
            AwsS3Storage::from_config(config)
        } else {
            let mut config = config.clone();
            config.endpoint = Some(host.to_owned());
            AwsS3Storage::from_config(&config)
        };
        Ok(Arc::new(storage))
    }
}
