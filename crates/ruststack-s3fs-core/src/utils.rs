//! Shared utilities for the S3 filesystem.
//!
//! Provides continuation-token encoding, ETag computation, and upload-ID
//! generation used by the in-memory store, plus the separator constant the
//! path model and directory iterator agree on.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use uuid::Uuid;

use crate::error::S3FsError;

/// Path separator and listing delimiter.
pub const SEPARATOR: &str = "/";

/// Path separator as a `char`.
pub const SEPARATOR_CHAR: char = '/';

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode a listing marker as a base64 continuation token.
///
/// # Examples
///
/// ```
/// use ruststack_s3fs_core::utils::{decode_continuation_token, encode_continuation_token};
///
/// let token = encode_continuation_token("photos/2024/");
/// assert_eq!(decode_continuation_token(&token).unwrap(), "photos/2024/");
/// ```
#[must_use]
pub fn encode_continuation_token(marker: &str) -> String {
    BASE64_STANDARD.encode(marker.as_bytes())
}

/// Decode a base64 continuation token back to a listing marker.
///
/// # Errors
///
/// Returns [`S3FsError::InvalidArgument`] if the token is not valid base64
/// or does not decode to valid UTF-8.
pub fn decode_continuation_token(token: &str) -> Result<String, S3FsError> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| S3FsError::invalid_argument("Invalid continuation token"))?;
    String::from_utf8(bytes)
        .map_err(|_| S3FsError::invalid_argument("Continuation token contains invalid UTF-8"))
}

// ---------------------------------------------------------------------------
// ETags
// ---------------------------------------------------------------------------

/// Compute the hex-encoded MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use ruststack_s3fs_core::utils::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// Compute the quoted MD5 ETag of `data`.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Compute a composite multipart ETag: the MD5 of the concatenated binary
/// part digests, suffixed with the part count.
///
/// Quoted or unquoted part ETags are both accepted.
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(etag.as_ref().trim_matches('"')) {
            combined.extend_from_slice(&bytes);
        }
    }
    let final_md5 = hex::encode(md5::Md5::digest(&combined));
    format!("\"{final_md5}-{}\"", part_etags.len())
}

// ---------------------------------------------------------------------------
// IDs
// ---------------------------------------------------------------------------

/// Generate a random multipart upload ID (32 hex characters).
#[must_use]
pub fn generate_upload_id() -> String {
    Uuid::new_v4().simple().to_string()
}
