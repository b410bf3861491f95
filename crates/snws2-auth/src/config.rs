//! Signing configuration.
//!
//! Provides [`SigningConfig`], loaded from environment variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::credentials::Credentials;
use crate::error::AuthError;

/// Signing configuration.
///
/// # Examples
///
/// ```
/// use snws2_auth::config::SigningConfig;
///
/// let config = SigningConfig::builder()
///     .token_id("token".to_owned())
///     .token_secret("secret".to_owned())
///     .build();
/// assert_eq!(config.log_level, "info");
/// assert_eq!(config.credentials().unwrap().token_id(), "token");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    /// Security token ID.
    #[builder(default)]
    pub token_id: String,

    /// Security token secret.
    #[builder(default)]
    pub token_secret: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            token_id: String::new(),
            token_secret: String::new(),
            log_level: String::from("info"),
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("token_id", &self.token_id)
            .field("token_secret", &"** redacted **")
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl SigningConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SN_TOKEN` | *(empty)* |
    /// | `SN_TOKEN_SECRET` | *(empty)* |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("SN_TOKEN") {
            config.token_id = v;
        }
        if let Some(v) = lookup("SN_TOKEN_SECRET") {
            config.token_secret = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] if the token ID or secret is empty.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        let credentials = Credentials::new(&self.token_id, &self.token_secret);
        credentials.ensure_present()?;
        Ok(credentials)
    }
}
