//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::Path;

use conduit_config::{
    ChatCompletionsConfig, Config, CorsConfig, HealthConfig, LlmConfig, OAuthConfig, ProviderConfig, ResponsesConfig,
    ServerConfig,
};
use indexmap::IndexMap;
use secrecy::SecretString;
use url::Url;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                llm: LlmConfig::default(),
                ..Config::default()
            },
        }
    }

    /// Add a chat-completions provider pointed at a mock backend
    ///
    /// `None` leaves the provider without a credential.
    pub fn with_chat_provider(mut self, name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        self.config.llm.providers.insert(
            name.to_owned(),
            ProviderConfig::ChatCompletions(ChatCompletionsConfig {
                base_url: base_url.parse().expect("valid URL"),
                api_key: api_key.map(SecretString::from),
                headers: IndexMap::new(),
                responses_models: Vec::new(),
                responses_exclude: Vec::new(),
            }),
        );
        self
    }

    /// Route matching models of an existing chat provider through `/responses`
    pub fn with_responses_routing(mut self, name: &str, include: &[&str], exclude: &[&str]) -> Self {
        if let Some(ProviderConfig::ChatCompletions(chat)) = self.config.llm.providers.get_mut(name) {
            chat.responses_models = include.iter().map(|&p| p.to_owned()).collect();
            chat.responses_exclude = exclude.iter().map(|&p| p.to_owned()).collect();
        }
        self
    }

    /// Add a responses provider authenticated through an OAuth auth file
    pub fn with_oauth_responses_provider(mut self, name: &str, endpoint: &str, auth_file: &Path, token_url: &str) -> Self {
        self.config.llm.providers.insert(
            name.to_owned(),
            ProviderConfig::Responses(ResponsesConfig {
                endpoint: endpoint.parse().expect("valid URL"),
                api_key: None,
                oauth: Some(OAuthConfig {
                    auth_file: auth_file.to_path_buf(),
                    token_url: Url::parse(token_url).expect("valid URL"),
                    client_id: "client-integration".to_owned(),
                }),
                headers: IndexMap::new(),
                store: Some(false),
            }),
        );
        self
    }

    /// Provider serving model ids without a known prefix
    pub fn with_default_provider(mut self, name: &str) -> Self {
        self.config.llm.default_provider = Some(name.to_owned());
        self
    }

    /// Providers that stand in for an unavailable one, in order
    pub fn with_fallback_order(mut self, names: &[&str]) -> Self {
        self.config.llm.fallback_order = names.iter().map(|&n| n.to_owned()).collect();
        self
    }

    /// Set CORS configuration
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().expect("valid test configuration");
        self.config
    }
}
