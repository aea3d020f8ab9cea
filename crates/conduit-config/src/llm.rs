use std::path::PathBuf;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Upstream providers and the order in which they stand in for each other
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider that serves model ids whose prefix is not a configured provider
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Providers tried, in order, when the requested one has no usable credential
    #[serde(default)]
    pub fallback_order: Vec<String>,
    /// Provider configurations keyed by the name used as the model id prefix
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
}

/// Configuration for one upstream, keyed by the protocol it speaks
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// OpenAI-style `/chat/completions` SSE
    ChatCompletions(ChatCompletionsConfig),
    /// Named-event "responses" SSE
    Responses(ResponsesConfig),
    /// Line-delimited JSON-RPC agent subprocess
    Agent(AgentConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatCompletionsConfig {
    /// Base URL; `/chat/completions` and `/responses` are appended
    pub base_url: Url,
    /// Static bearer token; an empty value marks the provider unavailable
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Extra headers sent with every upstream request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Model patterns (regex) served through `/responses` instead
    #[serde(default)]
    pub responses_models: Vec<String>,
    /// Model patterns (regex) excluded from `responses_models`
    #[serde(default)]
    pub responses_exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponsesConfig {
    /// Full URL of the responses endpoint
    pub endpoint: Url,
    /// Static bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// OAuth-managed credential read from an auth file
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    /// Extra headers sent with every upstream request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Value of the `store` request flag, omitted when unset
    #[serde(default)]
    pub store: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthConfig {
    /// JSON auth file holding `tokens.access_token` and friends
    #[serde(default = "default_auth_file")]
    pub auth_file: PathBuf,
    /// Token endpoint used for the refresh-token exchange
    #[serde(default = "default_token_url")]
    pub token_url: Url,
    /// OAuth client id sent with the refresh request
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_file: default_auth_file(),
            token_url: default_token_url(),
            client_id: default_client_id(),
        }
    }
}

impl OAuthConfig {
    /// Auth file path with a leading `~/` resolved against the home directory
    pub fn auth_file_path(&self) -> PathBuf {
        match (self.auth_file.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.auth_file.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Executable to spawn
    #[serde(default = "default_agent_command")]
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// How the agent's stdio is attached
    #[serde(default)]
    pub transport: AgentTransport,
    /// Longest silence tolerated between two agent messages, e.g. `"5m"`
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
    /// Sandbox policy requested in `thread/start`
    #[serde(default = "default_sandbox")]
    pub sandbox: String,
}

impl AgentConfig {
    /// Parsed idle ceiling
    ///
    /// # Errors
    ///
    /// Returns an error if `idle_timeout` is not a valid duration string
    pub fn idle_timeout(&self) -> anyhow::Result<std::time::Duration> {
        duration_str::parse(&self.idle_timeout)
            .map_err(|e| anyhow::anyhow!("invalid idle_timeout `{}`: {e}", self.idle_timeout))
    }
}

/// Attachment of the agent's standard streams
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTransport {
    /// Pseudo-terminal in raw mode
    #[default]
    Pty,
    /// Plain anonymous pipes
    Pipe,
}

fn default_auth_file() -> PathBuf {
    PathBuf::from("~/.codex/auth.json")
}

fn default_token_url() -> Url {
    Url::parse("https://auth.openai.com/oauth/token").expect("valid default URL")
}

fn default_client_id() -> String {
    "app_EMoamEEZ73f0CkXaXp7hrann".to_owned()
}

fn default_agent_command() -> String {
    "codex".to_owned()
}

fn default_agent_args() -> Vec<String> {
    vec!["app-server".to_owned()]
}

fn default_idle_timeout() -> String {
    "5m".to_owned()
}

fn default_sandbox() -> String {
    "danger-full-access".to_owned()
}
