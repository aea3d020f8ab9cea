use std::path::Path;

use secrecy::ExposeSecret;

use crate::{Config, ProviderConfig};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, the TOML is malformed, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`] minus the file read
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, a provider reference
    /// names an unknown provider, or a provider field fails to parse
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_has_providers()?;
        self.validate_provider_references()?;
        self.validate_providers()?;

        if let Some(cors) = &self.server.cors {
            cors.max_age()?;
        }

        Ok(())
    }

    fn validate_has_providers(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured under [llm.providers]");
        }

        Ok(())
    }

    fn validate_provider_references(&self) -> anyhow::Result<()> {
        if let Some(default) = &self.llm.default_provider
            && !self.llm.providers.contains_key(default)
        {
            anyhow::bail!("default_provider '{default}' is not a configured provider");
        }

        for name in &self.llm.fallback_order {
            if !self.llm.providers.contains_key(name) {
                anyhow::bail!("fallback_order entry '{name}' is not a configured provider");
            }
        }

        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (name, provider) in &self.llm.providers {
            if name.contains('/') {
                anyhow::bail!("provider name '{name}' must not contain '/'");
            }

            match provider {
                ProviderConfig::ChatCompletions(chat) => {
                    for pattern in chat.responses_models.iter().chain(&chat.responses_exclude) {
                        regex::Regex::new(pattern)
                            .map_err(|e| anyhow::anyhow!("invalid responses model pattern for provider '{name}': {e}"))?;
                    }
                }
                ProviderConfig::Responses(responses) => {
                    if responses.oauth.is_some()
                        && responses.api_key.as_ref().is_some_and(|key| !key.expose_secret().is_empty())
                    {
                        anyhow::bail!("provider '{name}' cannot set both api_key and oauth");
                    }
                }
                ProviderConfig::Agent(agent) => {
                    agent.idle_timeout()?;

                    if agent.command.trim().is_empty() {
                        anyhow::bail!("agent provider '{name}' has an empty command");
                    }
                }
            }
        }

        Ok(())
    }
}
