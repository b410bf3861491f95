//! SNWS2 request signing for the SolarNetwork data API.
//!
//! SNWS2 authenticates an HTTP request with an HMAC-SHA256 signature over a
//! canonical form of the request. The server recomputes the same canonical
//! request and signature from the shared token secret, so the secret itself
//! is never transmitted.
//!
//! # Overview
//!
//! Signing a request produces three headers:
//!
//! | Header | Value |
//! |---|---|
//! | `Authorization` | `SNWS2 Credential=<token>,SignedHeaders=<a;b;...>,Signature=<hex>` |
//! | `X-SN-Date` | HTTP date of the signing time |
//! | `Digest` | `sha-256=<base64>`, for non-form bodies |
//!
//! The signing key is derived from the secret and the signing day, and is
//! cached per [`SigningContext`] for seven days.
//!
//! # Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use snws2_auth::{Credentials, SigningContext};
//!
//! let ctx = SigningContext::new(Credentials::new("token", "secret"));
//! let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
//!
//! let auth = ctx
//!     .compute_authorization(
//!         "https://data.example.net/solarquery/api/v1/sec/datum/list?nodeId=123",
//!         Some("GET"),
//!         None,
//!         None,
//!         Some(date),
//!     )
//!     .unwrap();
//!
//! assert_eq!(auth.date_header_value, "Sun, 15 Jan 2023 00:00:00 GMT");
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical query, headers, and request construction
//! - [`clock`] - Injectable time source
//! - [`config`] - Environment configuration
//! - [`credentials`] - Token credentials and credential provider trait
//! - [`digest`] - Body digest computation
//! - [`error`] - Error types
//! - [`sign`] - `Authorization` header generation
//! - [`signing_key`] - Signing key derivation and caching
//! - [`verify`] - Server-side signature verification

pub mod canonical;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod sign;
pub mod signing_key;
pub mod verify;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SigningConfig;
pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use error::AuthError;
pub use sign::{AuthorizationResult, SigningContext, compute_authorization};
pub use signing_key::{SigningKey, SigningKeyManager};
pub use verify::{VerifiedRequest, parse_authorization_header, verify_request};
