//! Upstream credentials
//!
//! A [`CredentialSource`] answers two questions for the dispatcher: can it
//! serve right now (cheap, no I/O), and what token should the next request
//! carry (may refresh).

mod claims;
mod oauth;

use async_trait::async_trait;
use jiff::Timestamp;
use secrecy::{ExposeSecret, SecretString};

pub use oauth::OAuthCredentialStore;

use crate::error::LlmError;

/// Seconds before expiry at which a token is treated as stale
pub const REFRESH_SKEW_SECS: i64 = 60;

/// Token material presented to an upstream
#[derive(Debug, Clone)]
pub struct Credential {
    pub value: SecretString,
    pub expires_at: Option<Timestamp>,
    pub refresh_token: Option<SecretString>,
    /// Account identifier some backends require as a header
    pub account_id: Option<String>,
}

impl Credential {
    /// Non-expiring bearer token
    pub fn bearer(value: SecretString) -> Self {
        Self {
            value,
            expires_at: None,
            refresh_token: None,
            account_id: None,
        }
    }

    /// Empty credential for upstreams that authenticate themselves
    pub fn anonymous() -> Self {
        Self::bearer(SecretString::from(String::new()))
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Usable at `now`, honouring the refresh skew
    pub fn is_fresh_at(&self, now: Timestamp) -> bool {
        self.expires_at
            .is_none_or(|expires_at| now.as_second() < expires_at.as_second() - REFRESH_SKEW_SECS)
    }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Whether a credential can plausibly be produced, without I/O
    fn is_available(&self) -> bool;

    /// Current credential, refreshed if needed
    async fn credential(&self) -> Result<Credential, LlmError>;
}

/// Credential fixed in configuration
pub struct StaticCredential {
    provider: String,
    secret: Option<SecretString>,
}

impl StaticCredential {
    pub fn new(provider: impl Into<String>, secret: Option<SecretString>) -> Self {
        Self {
            provider: provider.into(),
            secret,
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    fn is_available(&self) -> bool {
        self.secret
            .as_ref()
            .is_some_and(|secret| !secret.expose_secret().is_empty())
    }

    async fn credential(&self) -> Result<Credential, LlmError> {
        match &self.secret {
            Some(secret) if !secret.expose_secret().is_empty() => Ok(Credential::bearer(secret.clone())),
            _ => Err(LlmError::authentication(&self.provider, "no API key configured")),
        }
    }
}

/// Source for backends that carry their own authentication
pub struct NoCredential;

#[async_trait]
impl CredentialSource for NoCredential {
    fn is_available(&self) -> bool {
        true
    }

    async fn credential(&self) -> Result<Credential, LlmError> {
        Ok(Credential::anonymous())
    }
}
