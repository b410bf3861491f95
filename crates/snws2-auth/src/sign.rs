//! SNWS2 `Authorization` header generation.
//!
//! Signing proceeds in four steps:
//!
//! 1. Build the signed headers and body digest, and canonicalize the query
//!    (taken from a form-encoded body when there is one, else from the URL).
//! 2. Assemble the canonical request.
//! 3. Build the signing message from the request date and the hash of the
//!    canonical request.
//! 4. Sign it with the cached signing key for the request date.
//!
//! The main entry point is [`SigningContext::compute_authorization`].

use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Uri};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canonical::{
    CanonicalHeaders, CanonicalRequest, DATE_HEADER, DIGEST_HEADER, build_canonical_query_string,
    format_http_date, is_form_urlencoded,
};
use crate::clock::{Clock, SystemClock};
use crate::credentials::Credentials;
use crate::digest::{compute_body_digest, includes_digest_header};
use crate::error::AuthError;
use crate::signing_key::{SigningKey, SigningKeyManager};

/// The authorization scheme name.
pub const SCHEME: &str = "SNWS2";

/// The algorithm line that opens the signing message.
pub const ALGORITHM: &str = "SNWS2-HMAC-SHA256";

/// The result of signing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    /// The `Authorization` header value.
    pub header_value: String,
    /// The `X-SN-Date` header value.
    pub date_header_value: String,
    /// The `Digest` header value, when the digest header is signed.
    pub digest_header_value: Option<String>,
    /// The sorted signed header names.
    pub signed_headers: Vec<String>,
    /// The canonical request message.
    pub canonical_request_message: String,
    /// The signing message.
    pub signing_message: String,
    /// The hex signature.
    pub signature: String,
    /// The signing key used.
    pub signing_key: SigningKey,
}

impl AuthorizationResult {
    /// Insert `Authorization`, `X-SN-Date`, and (when present) `Digest` into
    /// a header map, replacing any previous values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidHeaderValue`] if a value is not a valid
    /// HTTP header value (for example a token ID containing control characters).
    pub fn apply_to(&self, headers: &mut HeaderMap) -> Result<(), AuthError> {
        headers.insert(AUTHORIZATION, header_value("authorization", &self.header_value)?);
        headers.insert(
            HeaderName::from_static(DATE_HEADER),
            header_value(DATE_HEADER, &self.date_header_value)?,
        );
        if let Some(digest) = &self.digest_header_value {
            headers.insert(
                HeaderName::from_static(DIGEST_HEADER),
                header_value(DIGEST_HEADER, digest)?,
            );
        }
        Ok(())
    }
}

/// Signing state for one set of credentials.
///
/// Owns the credentials, the signing key cache scoped to them, and the clock
/// used when a request has no explicit date. Safe to share across threads.
pub struct SigningContext {
    credentials: Credentials,
    keys: SigningKeyManager,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("credentials", &self.credentials)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl SigningContext {
    /// Create a context using the system clock.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self::with_clock(credentials, SystemClock)
    }

    /// Create a context with a custom clock.
    pub fn with_clock(credentials: Credentials, clock: impl Clock + 'static) -> Self {
        let keys = SigningKeyManager::new(credentials.secret());
        Self {
            credentials,
            keys,
            clock: Box::new(clock),
        }
    }

    /// The credentials this context signs with.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The signing key cache.
    #[must_use]
    pub fn keys(&self) -> &SigningKeyManager {
        &self.keys
    }

    /// Switch to new credentials. The key cache is replaced along with them.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.keys = SigningKeyManager::new(credentials.secret());
        self.credentials = credentials;
    }

    /// Compute the SNWS2 authorization for a request.
    ///
    /// `method` defaults to `GET` and `date` to the context clock. An empty
    /// body is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] if the token ID or secret is
    /// empty, or [`AuthError::InvalidUrl`] if `url` is not an absolute URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use snws2_auth::{Credentials, SigningContext};
    ///
    /// let ctx = SigningContext::new(Credentials::new("token", "secret"));
    /// let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
    /// let auth = ctx
    ///     .compute_authorization(
    ///         "https://data.example.net/solarquery/api/v1/sec/datum/list?nodeId=123",
    ///         Some("GET"),
    ///         None,
    ///         None,
    ///         Some(date),
    ///     )
    ///     .unwrap();
    /// assert!(auth.header_value.starts_with("SNWS2 Credential=token,SignedHeaders=host;x-sn-date,"));
    /// ```
    pub fn compute_authorization(
        &self,
        url: &str,
        method: Option<&str>,
        body: Option<&str>,
        content_type: Option<&str>,
        date: Option<DateTime<Utc>>,
    ) -> Result<AuthorizationResult, AuthError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| AuthError::InvalidUrl(url.to_owned()))?;
        self.authorize(
            &uri,
            method.unwrap_or_default(),
            body.filter(|b| !b.is_empty()).map(str::as_bytes),
            content_type,
            date,
        )
    }

    /// Compute the SNWS2 authorization for an [`http::Request`].
    ///
    /// The request URI must be absolute. `Content-Type` is read from the
    /// request headers and an empty body is treated as absent.
    ///
    /// # Errors
    ///
    /// As for [`SigningContext::compute_authorization`].
    pub fn sign_request<B: AsRef<[u8]>>(
        &self,
        request: &Request<B>,
        date: Option<DateTime<Utc>>,
    ) -> Result<AuthorizationResult, AuthError> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body = Some(request.body().as_ref()).filter(|b| !b.is_empty());
        self.authorize(
            request.uri(),
            request.method().as_str(),
            body,
            content_type,
            date,
        )
    }

    fn authorize(
        &self,
        uri: &Uri,
        method: &str,
        body: Option<&[u8]>,
        content_type: Option<&str>,
        date: Option<DateTime<Utc>>,
    ) -> Result<AuthorizationResult, AuthError> {
        self.credentials.ensure_present()?;
        if uri.scheme().is_none() {
            return Err(AuthError::InvalidUrl(uri.to_string()));
        }
        let date = date.unwrap_or_else(|| self.clock.now());

        let body_digest = compute_body_digest(body, content_type);
        let digest_header = includes_digest_header(body, content_type).then_some(&body_digest);
        let headers = CanonicalHeaders::for_request(uri, content_type, &date, digest_header)?;
        let query = canonical_query(uri, body, content_type);

        let canonical_request =
            CanonicalRequest::new(method, uri.path(), query, headers, &body_digest);
        let canonical_request_message = canonical_request.to_message();

        debug!(canonical_request = %canonical_request_message, "Built canonical request");

        let signing_message = build_signing_message(&date, &canonical_request_message);

        debug!(signing_message, "Built signing message");

        let signing_key = self.keys.key_for(&date);
        let signature = signing_key.sign(&signing_message);

        let signed_headers_string = canonical_request.headers().signed_headers_string();
        let header_value = format!(
            "{SCHEME} Credential={},SignedHeaders={signed_headers_string},Signature={signature}",
            self.credentials.token_id()
        );

        Ok(AuthorizationResult {
            header_value,
            date_header_value: format_http_date(&date),
            digest_header_value: digest_header.map(|d| d.header_value()),
            signed_headers: canonical_request
                .headers()
                .names()
                .map(ToOwned::to_owned)
                .collect(),
            canonical_request_message,
            signing_message,
            signature,
            signing_key,
        })
    }
}

/// Compute the SNWS2 authorization for a request.
///
/// Free-function form of [`SigningContext::compute_authorization`].
///
/// # Errors
///
/// As for [`SigningContext::compute_authorization`].
pub fn compute_authorization(
    context: &SigningContext,
    url: &str,
    method: Option<&str>,
    body: Option<&str>,
    content_type: Option<&str>,
    date: Option<DateTime<Utc>>,
) -> Result<AuthorizationResult, AuthError> {
    context.compute_authorization(url, method, body, content_type, date)
}

/// Build the signing message.
///
/// Format:
/// ```text
/// SNWS2-HMAC-SHA256\n
/// <YYYYMMDD'T'HHMMSS'Z'>\n
/// <hex(SHA256(canonical_request))>
/// ```
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use snws2_auth::sign::build_signing_message;
///
/// let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
/// let msg = build_signing_message(&date, "GET\n/\n");
/// assert!(msg.starts_with("SNWS2-HMAC-SHA256\n20230115T000000Z\n"));
/// ```
#[must_use]
pub fn build_signing_message(date: &DateTime<Utc>, canonical_request: &str) -> String {
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!(
        "{ALGORITHM}\n{}\n{canonical_hash}",
        date.format("%Y%m%dT%H%M%SZ")
    )
}

/// Canonical query from a form body when present, else from the URL.
pub(crate) fn canonical_query(uri: &Uri, body: Option<&[u8]>, content_type: Option<&str>) -> String {
    match body {
        Some(bytes) if is_form_urlencoded(content_type) => {
            build_canonical_query_string(&String::from_utf8_lossy(bytes))
        }
        _ => build_canonical_query_string(uri.query().unwrap_or_default()),
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeaderValue(name.to_owned()))
}
