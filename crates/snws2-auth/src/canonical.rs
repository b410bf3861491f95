//! Canonical request construction for SNWS2.
//!
//! The canonical request is the exact pre-image the server re-derives, so its
//! layout is a fixed wire contract:
//!
//! ```text
//! HTTPMethod\n
//! Path\n
//! CanonicalQueryString\n
//! name:value\n          (one line per signed header, sorted by name)
//! SignedHeaders\n
//! HexBodyDigest
//! ```
//!
//! [`CanonicalRequest`] holds these segments in order and serializes them once
//! in [`CanonicalRequest::to_message`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use http::Uri;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::digest::BodyDigest;
use crate::error::AuthError;

/// The form content type whose body is canonicalized as query parameters.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Signed header carrying the request host.
pub const HOST_HEADER: &str = "host";
/// Signed header carrying the signing date.
pub const DATE_HEADER: &str = "x-sn-date";
/// Signed header carrying the body content type.
pub const CONTENT_TYPE_HEADER: &str = "content-type";
/// Signed header carrying the body digest.
pub const DIGEST_HEADER: &str = "digest";

/// Everything except RFC 3986 unreserved characters is escaped, including
/// `! ' ( ) *` which `encodeURIComponent`-style encoders leave alone.
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Whether a content type is `application/x-www-form-urlencoded`.
///
/// Media type parameters such as `; charset=UTF-8` are ignored and the
/// comparison is case-insensitive.
///
/// # Examples
///
/// ```
/// use snws2_auth::canonical::is_form_urlencoded;
///
/// assert!(is_form_urlencoded(Some("application/x-www-form-urlencoded; charset=UTF-8")));
/// assert!(!is_form_urlencoded(Some("application/json")));
/// assert!(!is_form_urlencoded(None));
/// ```
#[must_use]
pub fn is_form_urlencoded(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.split(';')
            .next()
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    })
}

/// Build the canonical query string from a raw query or form body.
///
/// Each `key=value` pair is percent-decoded and re-encoded with the strict
/// encode set. Pairs are sorted by their encoded `key=value` form using byte
/// ordering; duplicate keys are kept. Pairs without `=` are dropped.
///
/// # Examples
///
/// ```
/// use snws2_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(""), "");
/// assert_eq!(build_canonical_query_string("b=2&a=1"), "a=1&b=2");
/// assert_eq!(build_canonical_query_string("q=it's(*)!"), "q=it%27s%28%2A%29%21");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    let mut params: Vec<String> = query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .map(|(key, value)| format!("{}={}", strict_encode(key), strict_encode(value)))
        .collect();

    params.sort_unstable();
    params.join("&")
}

/// Build the `host` header value from an absolute URI.
///
/// The host is lower-cased. The port is appended only when it is explicit
/// and not 80 or 443.
///
/// # Errors
///
/// Returns [`AuthError::InvalidUrl`] if the URI has no host.
pub fn build_host_value(uri: &Uri) -> Result<String, AuthError> {
    let host = uri
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AuthError::InvalidUrl(uri.to_string()))?
        .to_ascii_lowercase();

    Ok(match uri.port_u16() {
        Some(port) if port != 80 && port != 443 => format!("{host}:{port}"),
        _ => host,
    })
}

/// Format the `X-SN-Date` header value, e.g. `Sun, 15 Jan 2023 00:00:00 GMT`.
#[must_use]
pub fn format_http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// The set of signed headers, keyed by lower-case name.
///
/// Iteration is always in sorted name order, which is the order used both in
/// the canonical request and in `SignedHeaders`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalHeaders {
    headers: BTreeMap<String, String>,
}

impl CanonicalHeaders {
    /// Create an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the signed headers for an outgoing request.
    ///
    /// Always includes `host` and `x-sn-date`, `content-type` iff one is
    /// given, and `digest` iff `digest` is given.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if the URI has no host.
    pub fn for_request(
        uri: &Uri,
        content_type: Option<&str>,
        date: &DateTime<Utc>,
        digest: Option<&BodyDigest>,
    ) -> Result<Self, AuthError> {
        let mut headers = Self::new();
        headers.insert(HOST_HEADER, build_host_value(uri)?);
        headers.insert(DATE_HEADER, format_http_date(date));
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE_HEADER, ct);
        }
        if let Some(digest) = digest {
            headers.insert(DIGEST_HEADER, digest.header_value());
        }
        Ok(headers)
    }

    /// Insert a header, lower-casing its name. Replaces any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Look up a header value by lower-case name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Header names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(String::as_str)
    }

    /// `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Header names joined with `;`, as advertised in `SignedHeaders`.
    ///
    /// # Examples
    ///
    /// ```
    /// use snws2_auth::canonical::CanonicalHeaders;
    ///
    /// let mut headers = CanonicalHeaders::new();
    /// headers.insert("X-SN-Date", "Sun, 15 Jan 2023 00:00:00 GMT");
    /// headers.insert("Host", "data.example.net");
    /// assert_eq!(headers.signed_headers_string(), "host;x-sn-date");
    /// ```
    #[must_use]
    pub fn signed_headers_string(&self) -> String {
        self.names().collect::<Vec<_>>().join(";")
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// A fully determined canonical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    method: String,
    path: String,
    query: String,
    headers: CanonicalHeaders,
    body_digest_hex: String,
}

impl CanonicalRequest {
    /// Assemble a canonical request.
    ///
    /// The method is upper-cased and defaults to `GET` when empty. `query`
    /// must already be canonical (see [`build_canonical_query_string`]).
    #[must_use]
    pub fn new(
        method: &str,
        path: &str,
        query: String,
        headers: CanonicalHeaders,
        body_digest: &BodyDigest,
    ) -> Self {
        let method = if method.is_empty() {
            "GET".to_owned()
        } else {
            method.to_ascii_uppercase()
        };
        Self {
            method,
            path: path.to_owned(),
            query,
            headers,
            body_digest_hex: body_digest.to_hex(),
        }
    }

    /// The upper-case HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The URL path, without query.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The canonical query string.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The signed headers.
    #[must_use]
    pub fn headers(&self) -> &CanonicalHeaders {
        &self.headers
    }

    /// The hex body digest.
    #[must_use]
    pub fn body_digest_hex(&self) -> &str {
        &self.body_digest_hex
    }

    /// The message lines, in wire order.
    fn segments(&self) -> Vec<Cow<'_, str>> {
        let mut segments = Vec::with_capacity(self.headers.len() + 5);
        segments.push(Cow::Borrowed(self.method.as_str()));
        segments.push(Cow::Borrowed(self.path.as_str()));
        segments.push(Cow::Borrowed(self.query.as_str()));
        segments.extend(
            self.headers
                .iter()
                .map(|(name, value)| Cow::Owned(format!("{name}:{value}"))),
        );
        segments.push(Cow::Owned(self.headers.signed_headers_string()));
        segments.push(Cow::Borrowed(self.body_digest_hex.as_str()));
        segments
    }

    /// Serialize to the canonical request message.
    ///
    /// # Examples
    ///
    /// ```
    /// use snws2_auth::canonical::{CanonicalHeaders, CanonicalRequest};
    /// use snws2_auth::digest::BodyDigest;
    ///
    /// let mut headers = CanonicalHeaders::new();
    /// headers.insert("host", "data.example.net");
    /// let creq = CanonicalRequest::new("get", "/api", "a=1".to_owned(), headers, &BodyDigest::of(b""));
    /// assert!(creq.to_message().starts_with("GET\n/api\na=1\nhost:data.example.net\nhost\n"));
    /// ```
    #[must_use]
    pub fn to_message(&self) -> String {
        self.segments().join("\n")
    }
}

/// Decode then re-encode a single query component.
fn strict_encode(component: &str) -> String {
    let decoded = percent_decode_str(component).decode_utf8_lossy();
    utf8_percent_encode(&decoded, STRICT_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_should_sort_query_parameters() {
        assert_eq!(build_canonical_query_string("b=2&a=1&c=3"), "a=1&b=2&c=3");
    }

    #[test]
    fn test_should_return_empty_for_empty_query() {
        assert_eq!(build_canonical_query_string(""), "");
    }

    #[test]
    fn test_should_drop_pairs_without_equals() {
        assert_eq!(build_canonical_query_string("flag&a=1&&b="), "a=1&b=");
    }

    #[test]
    fn test_should_escape_reserved_punctuation() {
        assert_eq!(
            build_canonical_query_string("q=a b!'()*"),
            "q=a%20b%21%27%28%29%2A"
        );
    }

    #[test]
    fn test_should_not_double_encode_percent_escapes() {
        assert_eq!(
            build_canonical_query_string("sourceIds=%2Fa%2Fb&nodeId=1"),
            "nodeId=1&sourceIds=%2Fa%2Fb"
        );
        assert_eq!(
            build_canonical_query_string("key=hello world"),
            build_canonical_query_string("key=hello%20world")
        );
    }

    #[test]
    fn test_should_replace_invalid_utf8_escapes() {
        assert_eq!(build_canonical_query_string("a=%FF"), "a=%EF%BF%BD");
        assert_eq!(build_canonical_query_string("%C3=1"), "%EF%BF%BD=1");
    }

    #[test]
    fn test_should_upper_case_percent_escapes() {
        assert_eq!(build_canonical_query_string("k=%2f"), "k=%2F");
    }

    #[test]
    fn test_should_keep_duplicate_keys_sorted_by_pair() {
        assert_eq!(
            build_canonical_query_string("nodeId=3&sourceId=x&nodeId=1"),
            "nodeId=1&nodeId=3&sourceId=x"
        );
    }

    #[test]
    fn test_should_sort_by_encoded_pair_bytewise() {
        // Upper-case sorts before lower-case; `%` sorts before digits.
        assert_eq!(
            build_canonical_query_string("b=1&B=2&a=%20&a=0"),
            "B=2&a=%20&a=0&b=1"
        );
    }

    #[test]
    fn test_should_be_idempotent_on_canonical_query() {
        let canonical = build_canonical_query_string("z=last&a=b%2Fc&m=it%27s&m=(x)");
        assert_eq!(build_canonical_query_string(&canonical), canonical);
    }

    #[test]
    fn test_should_produce_sorted_pairs() {
        let canonical =
            build_canonical_query_string("zeta=1&Alpha=2&beta=a b&beta=%7E&_u=*&1=one");
        let pairs: Vec<&str> = canonical.split('&').collect();
        let mut sorted = pairs.clone();
        sorted.sort_unstable();
        assert_eq!(pairs, sorted);
    }

    #[test]
    fn test_should_recognize_form_content_type() {
        assert!(is_form_urlencoded(Some(FORM_URLENCODED)));
        assert!(is_form_urlencoded(Some(
            "Application/X-WWW-Form-Urlencoded;charset=UTF-8"
        )));
        assert!(!is_form_urlencoded(Some("application/json")));
        assert!(!is_form_urlencoded(Some("")));
        assert!(!is_form_urlencoded(None));
    }

    #[test]
    fn test_should_omit_default_ports_from_host() {
        assert_eq!(
            build_host_value(&uri("https://data.example.net/x")).unwrap(),
            "data.example.net"
        );
        assert_eq!(
            build_host_value(&uri("https://data.example.net:443/x")).unwrap(),
            "data.example.net"
        );
        assert_eq!(
            build_host_value(&uri("http://data.example.net:80/x")).unwrap(),
            "data.example.net"
        );
        assert_eq!(
            build_host_value(&uri("http://localhost:8080/x")).unwrap(),
            "localhost:8080"
        );
    }

    #[test]
    fn test_should_lowercase_host() {
        assert_eq!(
            build_host_value(&uri("https://Data.Example.NET/api")).unwrap(),
            "data.example.net"
        );
        assert_eq!(
            build_host_value(&uri("http://LocalHost:8080/api")).unwrap(),
            "localhost:8080"
        );
    }

    #[test]
    fn test_should_reject_uri_without_host() {
        let result = build_host_value(&uri("/relative/path"));
        assert!(matches!(result, Err(AuthError::InvalidUrl(_))));
    }

    #[test]
    fn test_should_format_http_date() {
        let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(format_http_date(&date), "Sun, 15 Jan 2023 00:00:00 GMT");
        let date = Utc.with_ymd_and_hms(2017, 4, 1, 9, 5, 7).unwrap();
        assert_eq!(format_http_date(&date), "Sat, 01 Apr 2017 09:05:07 GMT");
    }

    #[test]
    fn test_should_build_request_headers_sorted() {
        let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        let digest = BodyDigest::of(b"{}");
        let headers = CanonicalHeaders::for_request(
            &uri("https://data.example.net/api"),
            Some("application/json"),
            &date,
            Some(&digest),
        )
        .unwrap();
        assert_eq!(
            headers.names().collect::<Vec<_>>(),
            vec!["content-type", "digest", "host", "x-sn-date"]
        );
        assert_eq!(
            headers.signed_headers_string(),
            "content-type;digest;host;x-sn-date"
        );
        assert_eq!(headers.get("content-type"), Some("application/json"));
    }

    #[test]
    fn test_should_build_minimal_request_headers() {
        let date = Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap();
        let headers =
            CanonicalHeaders::for_request(&uri("https://data.example.net/"), None, &date, None)
                .unwrap();
        assert_eq!(headers.signed_headers_string(), "host;x-sn-date");
    }

    #[test]
    fn test_should_lowercase_inserted_header_names() {
        let mut headers = CanonicalHeaders::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("Content-Type"), None);
    }

    #[test]
    fn test_should_assemble_canonical_request_message() {
        let mut headers = CanonicalHeaders::new();
        headers.insert("x-sn-date", "Sun, 15 Jan 2023 00:00:00 GMT");
        headers.insert("host", "data.example.net");

        let creq = CanonicalRequest::new(
            "get",
            "/solarquery/api/v1/sec/datum/list",
            build_canonical_query_string("nodeId=123"),
            headers,
            &BodyDigest::of(b""),
        );

        let expected = "GET\n\
                        /solarquery/api/v1/sec/datum/list\n\
                        nodeId=123\n\
                        host:data.example.net\n\
                        x-sn-date:Sun, 15 Jan 2023 00:00:00 GMT\n\
                        host;x-sn-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(creq.to_message(), expected);
    }

    #[test]
    fn test_should_default_empty_method_to_get() {
        let creq = CanonicalRequest::new(
            "",
            "/",
            String::new(),
            CanonicalHeaders::new(),
            &BodyDigest::of(b""),
        );
        assert_eq!(creq.method(), "GET");
        assert!(creq.to_message().starts_with("GET\n/\n\n"));
    }
}
