//! SNWS2 request verification.
//!
//! This is the server side of the scheme:
//!
//! 1. Parse the `Authorization` header to extract the token ID, signed
//!    headers, and provided signature.
//! 2. Read the request date from `X-SN-Date` (or `Date`) and reject requests
//!    outside the allowed clock skew.
//! 3. Reconstruct the canonical request from the advertised signed headers.
//! 4. Derive candidate signing keys and compare the expected signature to the
//!    provided one in constant time.
//!
//! Clients cache signing keys for up to seven days, so a request may be signed
//! with a key derived for any of the seven days ending on the request date.
//! Each of those keys is tried, most recent first.
//!
//! The main entry point is [`verify_request`].

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE, DATE};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::{
    CanonicalHeaders, CanonicalRequest, DATE_HEADER, HOST_HEADER, build_host_value,
};
use crate::credentials::CredentialProvider;
use crate::digest::compute_body_digest;
use crate::error::AuthError;
use crate::sign::{SCHEME, build_signing_message, canonical_query};
use crate::signing_key::{SIGNING_KEY_VALIDITY_DAYS, SigningKey};

/// Parsed components of an SNWS2 `Authorization` header.
///
/// Format:
/// ```text
/// SNWS2 Credential=<token>,SignedHeaders=host;x-sn-date,Signature=<hex-signature>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    /// The token ID.
    pub token_id: String,
    /// The list of signed header names (lowercase).
    pub signed_headers: Vec<String>,
    /// The hex-encoded signature.
    pub signature: String,
}

/// The result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
    /// The token ID that signed the request.
    pub token_id: String,
    /// The headers that were included in the signature.
    pub signed_headers: Vec<String>,
    /// The request date.
    pub date: DateTime<Utc>,
    /// The day the matching signing key was derived for.
    pub key_date: NaiveDate,
}

/// Parse an SNWS2 `Authorization` header value into its components.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthHeader`] if the header format is invalid,
/// or [`AuthError::UnsupportedScheme`] if the scheme is not `SNWS2`.
///
/// # Examples
///
/// ```
/// use snws2_auth::verify::parse_authorization_header;
///
/// let parsed = parse_authorization_header(
///     "SNWS2 Credential=token,SignedHeaders=host;x-sn-date,Signature=abc123",
/// )
/// .unwrap();
/// assert_eq!(parsed.token_id, "token");
/// assert_eq!(parsed.signed_headers, vec!["host", "x-sn-date"]);
/// ```
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuthorization, AuthError> {
    let (scheme, rest) = header.split_once(' ').ok_or(AuthError::InvalidAuthHeader)?;

    if scheme != SCHEME {
        return Err(AuthError::UnsupportedScheme(scheme.to_owned()));
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let token_id = credential
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;
    let signed_headers = signed_headers
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;
    let signature = signature
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)?;

    Ok(ParsedAuthorization {
        token_id: token_id.to_owned(),
        signed_headers: signed_headers
            .split(';')
            .map(str::to_ascii_lowercase)
            .collect(),
        signature: signature.to_owned(),
    })
}

/// Verify an SNWS2-signed HTTP request.
///
/// This function:
/// 1. Parses the `Authorization` header
/// 2. Checks the request date against `now` within `max_skew`
/// 3. Resolves the token secret via the credential provider
/// 4. Reconstructs the canonical request
/// 5. Compares signatures using constant-time comparison
///
/// # Errors
///
/// Returns an [`AuthError`] if:
/// - The `Authorization` header is missing or malformed
/// - The request date is missing, unparseable, or outside `max_skew`
/// - The token is not found
/// - Required signed headers are missing
/// - The signature does not match
pub fn verify_request(
    parts: &http::request::Parts,
    body: &[u8],
    credential_provider: &dyn CredentialProvider,
    now: DateTime<Utc>,
    max_skew: TimeDelta,
) -> Result<VerifiedRequest, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    debug!(auth_header, "Parsing SNWS2 authorization header");

    let parsed = parse_authorization_header(auth_header)?;
    if !parsed.signed_headers.iter().any(|h| h == HOST_HEADER) {
        return Err(AuthError::MissingHeader(HOST_HEADER.to_owned()));
    }

    let date = request_date(parts)?;
    if (now - date).num_seconds().abs() > max_skew.num_seconds() {
        debug!(%date, %now, "Request date outside allowed skew");
        return Err(AuthError::RequestExpired);
    }

    let secret = credential_provider.get_secret(&parsed.token_id)?;

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = Some(body).filter(|b| !b.is_empty());

    let mut headers = CanonicalHeaders::new();
    for name in &parsed.signed_headers {
        headers.insert(name, signed_header_value(parts, name)?);
    }

    let body_digest = compute_body_digest(body, content_type);
    let canonical_request = CanonicalRequest::new(
        parts.method.as_str(),
        parts.uri.path(),
        canonical_query(&parts.uri, body, content_type),
        headers,
        &body_digest,
    );
    let canonical_request_message = canonical_request.to_message();

    debug!(canonical_request = %canonical_request_message, "Rebuilt canonical request");

    let signing_message = build_signing_message(&date, &canonical_request_message);
    let provided = parsed.signature.as_bytes();

    let request_day = date.date_naive();
    let candidate_days = (0..SIGNING_KEY_VALIDITY_DAYS)
        .filter_map(|n| request_day.checked_sub_signed(TimeDelta::days(n)));
    for day in candidate_days {
        let expected = SigningKey::derive_for_day(&secret, day).sign(&signing_message);
        if bool::from(provided.ct_eq(expected.as_bytes())) {
            debug!(
                token_id = %parsed.token_id,
                key_date = %day,
                "Signature verification succeeded"
            );
            return Ok(VerifiedRequest {
                token_id: parsed.token_id,
                signed_headers: parsed.signed_headers,
                date,
                key_date: day,
            });
        }
    }

    debug!(token_id = %parsed.token_id, provided = %parsed.signature, "Signature mismatch");
    Err(AuthError::SignatureDoesNotMatch)
}

/// Read the request date from `X-SN-Date`, falling back to `Date`.
fn request_date(parts: &http::request::Parts) -> Result<DateTime<Utc>, AuthError> {
    let value = parts
        .headers
        .get(DATE_HEADER)
        .or_else(|| parts.headers.get(DATE))
        .ok_or_else(|| AuthError::MissingHeader(DATE_HEADER.to_owned()))?
        .to_str()
        .map_err(|_| AuthError::InvalidDate(DATE_HEADER.to_owned()))?;

    DateTime::parse_from_rfc2822(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| AuthError::InvalidDate(value.to_owned()))
}

/// Value of a signed header. `host` falls back to the URI authority.
fn signed_header_value(parts: &http::request::Parts, name: &str) -> Result<String, AuthError> {
    if let Some(value) = parts.headers.get(name) {
        return value
            .to_str()
            .map(ToOwned::to_owned)
            .map_err(|_| AuthError::MissingHeader(name.to_owned()));
    }
    if name == HOST_HEADER {
        return build_host_value(&parts.uri)
            .map_err(|_| AuthError::MissingHeader(name.to_owned()));
    }
    Err(AuthError::MissingHeader(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use http::{HeaderMap, HeaderValue, Request};

    use super::*;
    use crate::canonical::FORM_URLENCODED;
    use crate::clock::FixedClock;
    use crate::credentials::{Credentials, StaticCredentialProvider};
    use crate::sign::SigningContext;

    const LIST_URL: &str = "https://data.example.net/solarquery/api/v1/sec/datum/list?nodeId=123";

    fn jan_15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("token", "secret")
    }

    fn skew() -> TimeDelta {
        TimeDelta::minutes(15)
    }

    /// Sign a request and return its parts with the SNWS2 headers attached.
    fn signed_parts(
        ctx: &SigningContext,
        method: &str,
        url: &str,
        body: &str,
        content_type: Option<&str>,
        date: DateTime<Utc>,
    ) -> http::request::Parts {
        let mut builder = Request::builder().method(method).uri(url);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let request = builder.body(body.to_owned()).unwrap();
        let auth = ctx.sign_request(&request, Some(date)).unwrap();

        let (mut parts, _body) = request.into_parts();
        let mut headers = HeaderMap::new();
        auth.apply_to(&mut headers).unwrap();
        parts.headers.extend(headers);
        parts
    }

    #[test]
    fn test_should_parse_authorization_header() {
        let parsed = parse_authorization_header(
            "SNWS2 Credential=a09sjds09wu9wjsd9uy2,\
             SignedHeaders=content-type;digest;host;x-sn-date,\
             Signature=4739139d3d370f147b6585795c309b1c6d7d7f59843a91c2ae2b5ca3ee9f3e1e",
        )
        .unwrap();
        assert_eq!(parsed.token_id, "a09sjds09wu9wjsd9uy2");
        assert_eq!(
            parsed.signed_headers,
            vec!["content-type", "digest", "host", "x-sn-date"]
        );
        assert_eq!(
            parsed.signature,
            "4739139d3d370f147b6585795c309b1c6d7d7f59843a91c2ae2b5ca3ee9f3e1e"
        );
    }

    #[test]
    fn test_should_reject_unsupported_scheme() {
        let result = parse_authorization_header(
            "AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request,\
             SignedHeaders=host,Signature=abc",
        );
        assert!(matches!(result, Err(AuthError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_should_reject_incomplete_authorization_header() {
        for header in [
            "SNWS2",
            "SNWS2 Credential=token,SignedHeaders=host",
            "SNWS2 Credential=,SignedHeaders=host,Signature=abc",
        ] {
            let result = parse_authorization_header(header);
            assert!(
                matches!(result, Err(AuthError::InvalidAuthHeader)),
                "expected InvalidAuthHeader for {header:?}"
            );
        }
    }

    #[test]
    fn test_should_verify_mixed_case_host_against_lowercase_header() {
        let ctx = SigningContext::new(credentials());
        let url = "https://Data.Example.NET/api";
        let mut parts = signed_parts(&ctx, "GET", url, "", None, jan_15());
        parts.headers.insert(
            http::header::HOST,
            HeaderValue::from_static("data.example.net"),
        );
        let provider = StaticCredentialProvider::from(&credentials());

        let verified = verify_request(&parts, b"", &provider, jan_15(), skew()).unwrap();
        assert_eq!(verified.token_id, "token");
    }

    #[test]
    fn test_should_verify_signed_get_request() {
        let ctx = SigningContext::new(credentials());
        let parts = signed_parts(&ctx, "GET", LIST_URL, "", None, jan_15());
        let provider = StaticCredentialProvider::from(&credentials());

        let verified = verify_request(&parts, b"", &provider, jan_15(), skew()).unwrap();
        assert_eq!(verified.token_id, "token");
        assert_eq!(verified.signed_headers, vec!["host", "x-sn-date"]);
        assert_eq!(verified.date, jan_15());
        assert_eq!(verified.key_date, jan_15().date_naive());
    }

    #[test]
    fn test_should_verify_signed_json_request() {
        let ctx = SigningContext::new(credentials());
        let body = r#"{"nodeId":123}"#;
        let url = "https://data.example.net/solaruser/api/v1/sec/instr/add";
        let parts = signed_parts(&ctx, "POST", url, body, Some("application/json"), jan_15());
        let provider = StaticCredentialProvider::from(&credentials());

        let verified =
            verify_request(&parts, body.as_bytes(), &provider, jan_15(), skew()).unwrap();
        assert_eq!(
            verified.signed_headers,
            vec!["content-type", "digest", "host", "x-sn-date"]
        );

        let tampered = verify_request(
            &parts,
            br#"{"nodeId":999}"#,
            &provider,
            jan_15(),
            skew(),
        );
        assert!(matches!(tampered, Err(AuthError::SignatureDoesNotMatch)));
    }

    #[test]
    fn test_should_verify_signed_form_request() {
        let ctx = SigningContext::new(credentials());
        let body = "topic=Mock&nodeId=123";
        let url = "https://data.example.net/solaruser/api/v1/sec/instr/add";
        let parts = signed_parts(&ctx, "POST", url, body, Some(FORM_URLENCODED), jan_15());
        let provider = StaticCredentialProvider::from(&credentials());

        assert!(verify_request(&parts, body.as_bytes(), &provider, jan_15(), skew()).is_ok());

        let tampered = verify_request(&parts, b"topic=Mock&nodeId=1", &provider, jan_15(), skew());
        assert!(matches!(tampered, Err(AuthError::SignatureDoesNotMatch)));
    }

    #[test]
    fn test_should_accept_key_cached_from_earlier_day() {
        let ctx = SigningContext::with_clock(credentials(), FixedClock(jan_15()));
        let _ = ctx
            .compute_authorization(LIST_URL, None, None, None, Some(jan_15()))
            .unwrap();

        let later = jan_15() + TimeDelta::days(5);
        let parts = signed_parts(&ctx, "GET", LIST_URL, "", None, later);
        let provider = StaticCredentialProvider::from(&credentials());

        let verified = verify_request(&parts, b"", &provider, later, skew()).unwrap();
        assert_eq!(verified.key_date, jan_15().date_naive());
    }

    #[test]
    fn test_should_fail_with_wrong_secret() {
        let ctx = SigningContext::new(credentials());
        let parts = signed_parts(&ctx, "GET", LIST_URL, "", None, jan_15());
        let provider = StaticCredentialProvider::new(vec![(
            "token".to_owned(),
            "WRONG_SECRET".to_owned(),
        )]);

        let result = verify_request(&parts, b"", &provider, jan_15(), skew());
        assert!(matches!(result, Err(AuthError::SignatureDoesNotMatch)));
    }

    #[test]
    fn test_should_fail_with_unknown_token() {
        let ctx = SigningContext::new(credentials());
        let parts = signed_parts(&ctx, "GET", LIST_URL, "", None, jan_15());
        let provider = StaticCredentialProvider::default();

        let result = verify_request(&parts, b"", &provider, jan_15(), skew());
        assert!(matches!(result, Err(AuthError::TokenNotFound(_))));
    }

    #[test]
    fn test_should_fail_when_request_is_too_old() {
        let ctx = SigningContext::new(credentials());
        let parts = signed_parts(&ctx, "GET", LIST_URL, "", None, jan_15());
        let provider = StaticCredentialProvider::from(&credentials());

        let now = jan_15() + TimeDelta::hours(1);
        let result = verify_request(&parts, b"", &provider, now, skew());
        assert!(matches!(result, Err(AuthError::RequestExpired)));
    }

    #[test]
    fn test_should_fail_with_missing_auth_header() {
        let (parts, _body) = Request::builder()
            .uri(LIST_URL)
            .body(())
            .unwrap()
            .into_parts();
        let provider = StaticCredentialProvider::from(&credentials());

        let result = verify_request(&parts, b"", &provider, jan_15(), skew());
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[test]
    fn test_should_fail_with_missing_signed_header() {
        let (parts, _body) = Request::builder()
            .uri(LIST_URL)
            .header(
                AUTHORIZATION,
                "SNWS2 Credential=token,SignedHeaders=digest;host;x-sn-date,Signature=abc",
            )
            .header("x-sn-date", "Sun, 15 Jan 2023 00:00:00 GMT")
            .body(())
            .unwrap()
            .into_parts();
        let provider = StaticCredentialProvider::from(&credentials());

        let result = verify_request(&parts, b"", &provider, jan_15(), skew());
        assert!(matches!(result, Err(AuthError::MissingHeader(name)) if name == "digest"));
    }

    #[test]
    fn test_should_fail_with_unparseable_date() {
        let (parts, _body) = Request::builder()
            .uri(LIST_URL)
            .header(
                AUTHORIZATION,
                "SNWS2 Credential=token,SignedHeaders=host;x-sn-date,Signature=abc",
            )
            .header("x-sn-date", "yesterday")
            .body(())
            .unwrap()
            .into_parts();
        let provider = StaticCredentialProvider::from(&credentials());

        let result = verify_request(&parts, b"", &provider, jan_15(), skew());
        assert!(matches!(result, Err(AuthError::InvalidDate(_))));
    }
}
