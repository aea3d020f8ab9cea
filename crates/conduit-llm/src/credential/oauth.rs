use std::path::PathBuf;

use async_trait::async_trait;
use conduit_config::OAuthConfig;
use jiff::{SignedDuration, Timestamp};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::claims;
use super::{Credential, CredentialSource};
use crate::error::LlmError;

/// Lifetime assumed for a refreshed token whose expiry cannot be read
const FALLBACK_LIFETIME: SignedDuration = SignedDuration::from_hours(1);

/// On-disk auth file; unknown members are preserved on rewrite
#[derive(Debug, Default, Deserialize, Serialize)]
struct AuthFile {
    #[serde(default)]
    tokens: StoredTokens,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account_id: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Refreshable OAuth credential backed by a JSON auth file
///
/// The cached token is served while it is fresh. Expired tokens are
/// refreshed under a single lock, so concurrent callers trigger exactly one
/// exchange with the token endpoint.
pub struct OAuthCredentialStore {
    provider: String,
    auth_file: PathBuf,
    token_url: Url,
    client_id: String,
    client: reqwest::Client,
    cached: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
}

impl OAuthCredentialStore {
    pub fn new(provider: impl Into<String>, config: &OAuthConfig, client: reqwest::Client) -> Self {
        Self {
            provider: provider.into(),
            auth_file: config.auth_file_path(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    async fn cached_fresh(&self) -> Option<Credential> {
        let now = Timestamp::now();
        self.cached
            .read()
            .await
            .as_ref()
            .filter(|credential| credential.is_fresh_at(now))
            .cloned()
    }

    async fn load_or_refresh(&self) -> Result<Credential, LlmError> {
        let mut file = self.read_auth_file().await?;

        if let Some(credential) = credential_from(&file.tokens)
            && (credential.expires_at.is_some() || file.tokens.refresh_token.is_none())
            && credential.is_fresh_at(Timestamp::now())
        {
            tracing::debug!(provider = %self.provider, "using token from auth file");
            return Ok(credential);
        }

        let Some(refresh_token) = file.tokens.refresh_token.clone().filter(|token| !token.is_empty()) else {
            return Err(LlmError::TokenRefresh(format!(
                "token expired and no refresh token in {}",
                self.auth_file.display()
            )));
        };

        let refreshed = self.exchange(&refresh_token).await?;

        file.tokens.access_token = Some(refreshed.access_token);
        if let Some(refresh_token) = refreshed.refresh_token {
            file.tokens.refresh_token = Some(refresh_token);
        }
        if let Some(id_token) = refreshed.id_token {
            file.tokens.id_token = Some(id_token);
        }

        self.persist(&file).await;

        let mut credential = credential_from(&file.tokens)
            .ok_or_else(|| LlmError::TokenRefresh("token endpoint returned an empty access token".to_owned()))?;

        if credential.expires_at.is_none() {
            credential.expires_at = Timestamp::now().checked_add(FALLBACK_LIFETIME).ok();
        }

        tracing::info!(provider = %self.provider, "refreshed OAuth access token");

        Ok(credential)
    }

    async fn read_auth_file(&self) -> Result<AuthFile, LlmError> {
        let raw = tokio::fs::read_to_string(&self.auth_file).await.map_err(|e| {
            LlmError::authentication(&self.provider, format!("cannot read {}: {e}", self.auth_file.display()))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            LlmError::authentication(&self.provider, format!("malformed {}: {e}", self.auth_file.display()))
        })
    }

    async fn exchange(&self, refresh_token: &str) -> Result<RefreshResponse, LlmError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LlmError::TokenRefresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.provider, %status, "token refresh rejected");
            return Err(LlmError::TokenRefresh(format!("token endpoint returned {status}: {body}")));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| LlmError::TokenRefresh(format!("unreadable token response: {e}")))
    }

    /// Write-back failures leave the in-memory token usable
    async fn persist(&self, file: &AuthFile) {
        let result = match serde_json::to_string_pretty(file) {
            Ok(serialized) => tokio::fs::write(&self.auth_file, serialized)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            tracing::warn!(
                provider = %self.provider,
                path = %self.auth_file.display(),
                error = %e,
                "failed to persist refreshed tokens"
            );
        }
    }
}

#[async_trait]
impl CredentialSource for OAuthCredentialStore {
    fn is_available(&self) -> bool {
        self.auth_file.is_file()
    }

    async fn credential(&self) -> Result<Credential, LlmError> {
        if let Some(credential) = self.cached_fresh().await {
            return Ok(credential);
        }

        let _refresh = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited
        if let Some(credential) = self.cached_fresh().await {
            return Ok(credential);
        }

        let credential = self.load_or_refresh().await?;
        *self.cached.write().await = Some(credential.clone());

        Ok(credential)
    }
}

/// Build a credential from stored tokens; `None` without an access token
fn credential_from(tokens: &StoredTokens) -> Option<Credential> {
    let access_token = tokens.access_token.as_deref().filter(|token| !token.is_empty())?;

    let access_claims = claims::decode(access_token).unwrap_or_default();
    let id_claims = tokens
        .id_token
        .as_deref()
        .and_then(claims::decode)
        .unwrap_or_default();

    let expires_at = access_claims.expires_at;
    let account_id = id_claims
        .account_id
        .or(access_claims.account_id)
        .or_else(|| tokens.account_id.clone());

    Some(Credential {
        value: SecretString::from(access_token.to_owned()),
        expires_at,
        refresh_token: tokens.refresh_token.clone().map(SecretString::from),
        account_id,
    })
}
