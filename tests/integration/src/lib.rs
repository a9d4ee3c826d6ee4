//! Integration tests for the RustStack S3 filesystem.
//!
//! These tests require an S3-compatible server at `localhost:4566`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p ruststack-s3fs-integration -- --ignored
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use ruststack_s3fs_aws::AwsStorageFactory;
use ruststack_s3fs_core::config::{ACCESS_KEY, ENDPOINT, PATH_STYLE_ACCESS, SECRET_KEY};
use ruststack_s3fs_core::{S3FileSystem, S3FileSystemProvider, S3FsConfig};

/// URI of the filesystem served by the local server.
pub const LOCAL_URI: &str = "s3://localhost:4566/";

static INIT: Once = Once::new();

/// Initialize tracing (once).
///
/// `RUST_LOG` wins; otherwise the filesystem's `log_level` setting applies.
fn init_tracing() {
    INIT.call_once(|| {
        let log_level = S3FsConfig::from_env().log_level;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured S3 client pointing at the local server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// A provider whose filesystems talk to the local server.
#[must_use]
pub fn s3fs_provider() -> S3FileSystemProvider {
    init_tracing();
    S3FileSystemProvider::new(Arc::new(AwsStorageFactory))
}

/// Settings pointing a filesystem at the local server.
#[must_use]
pub fn local_env() -> HashMap<String, String> {
    [
        (ACCESS_KEY, "test".to_owned()),
        (SECRET_KEY, "test".to_owned()),
        (ENDPOINT, endpoint_url()),
        (PATH_STYLE_ACCESS, "true".to_owned()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect()
}

/// Open the filesystem for the local server on `provider`.
#[must_use]
pub fn open_file_system(provider: &S3FileSystemProvider) -> Arc<S3FileSystem> {
    provider
        .new_file_system(LOCAL_URI, &local_env())
        .unwrap_or_else(|e| panic!("failed to open filesystem: {e}"))
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Put `body` under each of `keys`.
pub async fn put_objects(client: &aws_sdk_s3::Client, bucket: &str, keys: &[&str], body: &[u8]) {
    for key in keys {
        client
            .put_object()
            .bucket(bucket)
            .key(*key)
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .unwrap_or_else(|e| panic!("put {key}: {e}"));
    }
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    // Abort uploads a failed transfer may have left behind.
    if let Ok(uploads) = client.list_multipart_uploads().bucket(bucket).send().await {
        for upload in uploads.uploads() {
            if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(id)
                    .send()
                    .await;
            }
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_attributes;
mod test_iterator;
mod test_provider;
mod test_transfer;
