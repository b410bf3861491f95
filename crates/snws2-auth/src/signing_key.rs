//! SNWS2 signing key derivation and caching.
//!
//! ```text
//! DateKey    = HMAC-SHA256("SNWS2" + secret, YYYYMMDD)
//! SigningKey = HMAC-SHA256(DateKey, "snws2_request")
//! ```
//!
//! A derived key stays valid for [`SIGNING_KEY_VALIDITY_DAYS`] calendar days
//! (UTC) starting at the day it was derived for. [`SigningKeyManager`] caches
//! one key per secret and re-derives it once the signing date leaves that
//! window.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use hmac::{Hmac, KeyInit, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use tracing::{debug, trace};

type HmacSha256 = Hmac<Sha256>;

/// Number of days a derived signing key remains valid.
pub const SIGNING_KEY_VALIDITY_DAYS: i64 = 7;

const SECRET_PREFIX: &str = "SNWS2";
const REQUEST_TERMINATOR: &[u8] = b"snws2_request";

/// A derived signing key and its validity window.
///
/// The key bytes are never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: [u8; 32],
    derived_for: NaiveDate,
    valid_until: DateTime<Utc>,
}

impl SigningKey {
    /// Derive the signing key for the calendar day (UTC) of `date`.
    #[must_use]
    pub fn derive(secret: &str, date: &DateTime<Utc>) -> Self {
        Self::derive_for_day(secret, date.date_naive())
    }

    /// Derive the signing key for a calendar day.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use snws2_auth::signing_key::SigningKey;
    ///
    /// let day = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
    /// let a = SigningKey::derive_for_day("secret", day);
    /// let b = SigningKey::derive_for_day("secret", day);
    /// assert_eq!(a, b);
    /// ```
    #[must_use]
    pub fn derive_for_day(secret: &str, day: NaiveDate) -> Self {
        let date_only = day.format("%Y%m%d").to_string();
        let date_key = hmac_sha256(
            format!("{SECRET_PREFIX}{secret}").as_bytes(),
            date_only.as_bytes(),
        );
        let bytes = hmac_sha256(&date_key, REQUEST_TERMINATOR);

        let valid_until = day
            .and_time(NaiveTime::MIN)
            .and_utc()
            .checked_add_signed(TimeDelta::days(SIGNING_KEY_VALIDITY_DAYS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            bytes,
            derived_for: day,
            valid_until,
        }
    }

    /// The raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lower-case hex of the key bytes.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// The calendar day the key was derived for.
    #[must_use]
    pub fn derived_for(&self) -> NaiveDate {
        self.derived_for
    }

    /// The first instant at which the key is no longer valid.
    #[must_use]
    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    /// Whether the key may sign a request dated `date`.
    ///
    /// Valid for days in `[derived_for, derived_for + 7)`.
    #[must_use]
    pub fn is_valid_for(&self, date: &DateTime<Utc>) -> bool {
        date.date_naive() >= self.derived_for && *date < self.valid_until
    }

    /// Compute the hex HMAC-SHA256 signature of `message` with this key.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        hex::encode(hmac_sha256(&self.bytes, message.as_bytes()))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("derived_for", &self.derived_for)
            .field("valid_until", &self.valid_until)
            .finish_non_exhaustive()
    }
}

/// Caches the signing key for one secret.
///
/// The cache is a single `Option<SigningKey>` behind a mutex; a key is only
/// ever replaced whole.
pub struct SigningKeyManager {
    secret: String,
    cached: Mutex<Option<SigningKey>>,
}

impl SigningKeyManager {
    /// Create a manager with an empty cache.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return a key valid for `date`, deriving and caching one if needed.
    #[must_use]
    pub fn key_for(&self, date: &DateTime<Utc>) -> SigningKey {
        let mut cached = self.cached.lock();
        match cached.as_ref() {
            Some(key) if key.is_valid_for(date) => {
                trace!(derived_for = %key.derived_for, "Using cached signing key");
                key.clone()
            }
            _ => {
                let key = SigningKey::derive(&self.secret, date);
                debug!(
                    derived_for = %key.derived_for,
                    valid_until = %key.valid_until,
                    "Derived new signing key"
                );
                *cached = Some(key.clone());
                key
            }
        }
    }

    /// The currently cached key, if any.
    #[must_use]
    pub fn cached(&self) -> Option<SigningKey> {
        self.cached.lock().clone()
    }

    /// Drop the cached key.
    pub fn clear(&self) {
        *self.cached.lock() = None;
    }
}

impl Clone for SigningKeyManager {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            cached: Mutex::new(self.cached()),
        }
    }
}

impl fmt::Debug for SigningKeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyManager")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

/// Compute HMAC-SHA256 and return the raw bytes.
pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as KeyInit>::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&tag);
    out
}
