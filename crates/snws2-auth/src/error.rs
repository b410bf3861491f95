//! Error types for SNWS2 signing and verification.
//!
//! Signing only fails on malformed input (an unparseable URL, absent
//! credentials). The remaining variants are produced by the verification side.

/// Errors that can occur while signing or verifying an SNWS2 request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request URL could not be parsed or is not absolute.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The token ID or token secret is empty.
    #[error("Missing credentials: token ID and secret are required")]
    MissingCredentials,

    /// A computed header value contains characters not allowed in HTTP headers.
    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(String),

    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The authorization scheme is not `SNWS2`.
    #[error("Unsupported authorization scheme: {0}")]
    UnsupportedScheme(String),

    /// A header referenced in `SignedHeaders` is missing.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The request date header could not be parsed.
    #[error("Invalid request date: {0}")]
    InvalidDate(String),

    /// The token ID was not found in the credential store.
    #[error("Token not found: {0}")]
    TokenNotFound(String),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// The request date is too far from the verifier's clock.
    #[error("Request has expired")]
    RequestExpired,

    /// Configuration loaded from the environment is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}
