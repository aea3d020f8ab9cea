use std::time::Duration;

use conduit_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Errors raised while dispatching, opening, or consuming an upstream
#[derive(Debug, Error)]
pub enum LlmError {
    /// No provider, or no usable credential, could serve the request
    #[error("no usable credential for provider '{provider}': {message}")]
    Authentication { provider: String, message: String },

    /// HTTP upstream answered with a non-success status
    #[error("upstream returned {status}: {body}")]
    UpstreamHttp { status: StatusCode, body: String },

    /// Upstream frame was malformed or arrived out of sequence
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    /// Agent subprocess failed to start, finish its handshake, or exited early
    #[error("agent subprocess error: {0}")]
    Subprocess(String),

    /// OAuth refresh exchange failed and no usable token remains
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// No agent message arrived within the idle ceiling
    #[error("no upstream activity for {}s", .0.as_secs())]
    IdleTimeout(Duration),

    /// Client sent a request that cannot be translated
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    pub(crate) fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication { .. } | Self::TokenRefresh(_) => StatusCode::UNAUTHORIZED,
            Self::UpstreamHttp { .. } | Self::UpstreamProtocol(_) | Self::Subprocess(_) => StatusCode::BAD_GATEWAY,
            Self::IdleTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Authentication { .. } | Self::TokenRefresh(_) => "authentication_error",
            Self::UpstreamHttp { .. } | Self::UpstreamProtocol(_) | Self::Subprocess(_) => "api_error",
            Self::IdleTimeout(_) => "timeout_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
