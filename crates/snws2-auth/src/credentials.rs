//! Security token credentials and credential lookup.
//!
//! [`Credentials`] is the token pair a client signs with. The verifying side
//! resolves token secrets through the [`CredentialProvider`] trait, with
//! [`StaticCredentialProvider`] as an in-memory implementation.

use std::collections::HashMap;
use std::fmt;

use crate::error::AuthError;

/// A security token ID and its secret.
///
/// The secret is never printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token_id: String,
    secret: String,
}

impl Credentials {
    /// Create credentials from a token ID and secret.
    pub fn new(token_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            secret: secret.into(),
        }
    }

    /// The token ID, sent in the clear as the `Credential` component.
    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// The token secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Fail with [`AuthError::MissingCredentials`] unless both parts are non-empty.
    pub fn ensure_present(&self) -> Result<(), AuthError> {
        if self.token_id.is_empty() || self.secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_id", &self.token_id)
            .field("secret", &"** redacted **")
            .finish()
    }
}

/// Trait for looking up token secrets by token ID.
///
/// Implementations may back this with a database, configuration file,
/// or any other credential store.
pub trait CredentialProvider: Send + Sync {
    /// Retrieve the secret for the given token ID.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenNotFound`] if the token ID is not recognized.
    fn get_secret(&self, token_id: &str) -> Result<String, AuthError>;
}

/// A simple in-memory credential provider backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use snws2_auth::credentials::{CredentialProvider, StaticCredentialProvider};
///
/// let provider = StaticCredentialProvider::new(vec![
///     ("a09sjds09wu9wjsd9uy2".to_owned(), "pHggmQaDnyiAyqBJaeWPcXyCNyvSNGMm".to_owned()),
/// ]);
///
/// let secret = provider.get_secret("a09sjds09wu9wjsd9uy2").unwrap();
/// assert_eq!(secret, "pHggmQaDnyiAyqBJaeWPcXyCNyvSNGMm");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    secrets: HashMap<String, String>,
}

impl StaticCredentialProvider {
    /// Create a provider from an iterable of (token_id, secret) pairs.
    pub fn new(secrets: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            secrets: secrets.into_iter().collect(),
        }
    }
}

impl From<&Credentials> for StaticCredentialProvider {
    fn from(credentials: &Credentials) -> Self {
        Self::new([(
            credentials.token_id().to_owned(),
            credentials.secret().to_owned(),
        )])
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get_secret(&self, token_id: &str) -> Result<String, AuthError> {
        self.secrets
            .get(token_id)
            .cloned()
            .ok_or_else(|| AuthError::TokenNotFound(token_id.to_owned()))
    }
}
