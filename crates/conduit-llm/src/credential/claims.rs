//! Unverified JWT claim extraction
//!
//! Tokens come from a local file written by the agent's own login flow, so
//! signatures are not checked; only `exp` and the account id are read.

use jiff::Timestamp;
use jwt_compact::UntrustedToken;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct AccountClaims {
    #[serde(default)]
    chatgpt_account_id: Option<String>,
    #[serde(default, rename = "https://api.openai.com/auth")]
    namespaced: Option<NamespacedClaims>,
    #[serde(default)]
    organizations: Vec<Organization>,
}

#[derive(Debug, Default, Deserialize)]
struct NamespacedClaims {
    #[serde(default)]
    chatgpt_account_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Organization {
    #[serde(default)]
    id: Option<String>,
}

impl AccountClaims {
    fn account_id(self) -> Option<String> {
        self.chatgpt_account_id
            .or_else(|| self.namespaced.and_then(|claims| claims.chatgpt_account_id))
            .or_else(|| self.organizations.into_iter().find_map(|org| org.id))
            .filter(|id| !id.is_empty())
    }
}

/// What the store needs out of a token
#[derive(Debug, Default)]
pub(super) struct TokenClaims {
    pub expires_at: Option<Timestamp>,
    pub account_id: Option<String>,
}

/// Decode claims without verifying the signature; `None` if the token is not a JWT
pub(super) fn decode(token: &str) -> Option<TokenClaims> {
    let untrusted = UntrustedToken::new(token)
        .inspect_err(|e| tracing::debug!(error = %e, "credential is not a JWT"))
        .ok()?;

    let claims = untrusted
        .deserialize_claims_unchecked::<AccountClaims>()
        .inspect_err(|e| tracing::debug!(error = %e, "unreadable JWT claims"))
        .ok()?;

    Some(TokenClaims {
        expires_at: claims
            .expiration
            .and_then(|exp| Timestamp::from_second(exp.timestamp()).ok()),
        account_id: claims.custom.account_id(),
    })
}
