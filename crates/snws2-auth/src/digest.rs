//! Request body digests.
//!
//! A form-encoded body is canonicalized as query parameters rather than hashed,
//! so its digest is the digest of the empty string. Any other body is hashed
//! as opaque bytes. A missing body hashes as empty.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::canonical::is_form_urlencoded;

/// Hex SHA-256 of the empty string.
pub const EMPTY_SHA256_HEX: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Prefix of the `Digest` header value.
const DIGEST_HEADER_PREFIX: &str = "sha-256=";

/// A SHA-256 body digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDigest([u8; 32]);

impl BodyDigest {
    /// Hash arbitrary bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let hash = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        Self(out)
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex, as used on the last line of the canonical request.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Standard base64, as used in the `Digest` header.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// The `Digest` header value, `sha-256=<base64>`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{DIGEST_HEADER_PREFIX}{}", self.to_base64())
    }
}

/// Compute the body digest for a request.
///
/// # Examples
///
/// ```
/// use snws2_auth::digest::{EMPTY_SHA256_HEX, compute_body_digest};
///
/// let form = compute_body_digest(Some(b"a=1".as_slice()), Some("application/x-www-form-urlencoded"));
/// assert_eq!(form.to_hex(), EMPTY_SHA256_HEX);
///
/// let json = compute_body_digest(Some(b"{}".as_slice()), Some("application/json"));
/// assert_ne!(json.to_hex(), EMPTY_SHA256_HEX);
/// ```
#[must_use]
pub fn compute_body_digest(body: Option<&[u8]>, content_type: Option<&str>) -> BodyDigest {
    match body {
        Some(bytes) if !is_form_urlencoded(content_type) => BodyDigest::of(bytes),
        _ => BodyDigest::of(b""),
    }
}

/// Whether the `digest` header is signed and sent for a request.
///
/// It is emitted when the request carries a body or a content type, unless that
/// content type is form-url-encoded. A bare request with neither signs only
/// `host` and `x-sn-date`.
#[must_use]
pub fn includes_digest_header(body: Option<&[u8]>, content_type: Option<&str>) -> bool {
    (body.is_some() || content_type.is_some()) && !is_form_urlencoded(content_type)
}
