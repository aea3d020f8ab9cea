//! Model identifier parsing and provider selection
//!
//! Identifiers take the form `<provider>/<model>[:<level>]`. The named
//! provider serves the request when its credential is available; otherwise
//! the configured fallback order is walked with the provider prefix
//! substituted. Selections are memoised per identifier.

use std::sync::Arc;

use conduit_config::{LlmConfig, ProviderConfig};
use dashmap::DashMap;
use indexmap::IndexMap;
use regex::Regex;

use crate::credential::{CredentialSource, NoCredential, OAuthCredentialStore, StaticCredential};
use crate::effort::ReasoningEffort;
use crate::error::LlmError;
use crate::provider::{
    AgentIpcAdapter, ChatCompletionAdapter, ModelTarget, NativeEventStream, ResponsesAdapter, UpstreamAdapter,
    parse_headers,
};
use crate::types::CanonicalRequest;

/// Parsed `<provider>/<model>[:<level>]` identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    /// Identifier exactly as requested
    pub raw: String,
    /// Segment before the first `/`, if any
    pub provider: Option<String>,
    /// Remainder without the level suffix
    pub model: String,
    pub level: Option<String>,
}

impl ModelId {
    /// Split an identifier; a `:` suffix is a level only when it names one
    pub fn parse(raw: &str) -> Self {
        let (provider, rest) = match raw.split_once('/') {
            Some((provider, rest)) if !provider.is_empty() => (Some(provider.to_owned()), rest),
            _ => (None, raw),
        };

        let (model, level) = match rest.rsplit_once(':') {
            Some((model, level)) if ReasoningEffort::parse(level).is_some() => (model, Some(level.to_owned())),
            _ => (rest, None),
        };

        Self {
            raw: raw.to_owned(),
            provider,
            model: model.to_owned(),
            level,
        }
    }

    /// Identifier without the level suffix
    fn without_level(&self) -> &str {
        self.level
            .as_ref()
            .and_then(|level| self.raw.strip_suffix(level.as_str()))
            .and_then(|raw| raw.strip_suffix(':'))
            .unwrap_or(&self.raw)
    }
}

/// Wire protocol behind an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    ChatCompletions,
    Responses,
    Agent,
}

/// Selected provider for one model identifier
pub struct DispatchEntry {
    pub provider: String,
    pub target: ModelTarget,
    pub kind: AdapterKind,
    adapter: Arc<dyn UpstreamAdapter>,
    credentials: Arc<dyn CredentialSource>,
}

impl DispatchEntry {
    /// Fetch a credential and open the upstream
    pub async fn open(&self, request: &CanonicalRequest) -> Result<NativeEventStream, LlmError> {
        let credential = self.credentials.credential().await?;

        tracing::debug!(
            provider = %self.provider,
            adapter = self.adapter.name(),
            model = %self.target.model,
            "opening upstream"
        );

        self.adapter.stream(request, credential).await
    }
}

impl std::fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("provider", &self.provider)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

struct ProviderSlot {
    config: ProviderConfig,
    credentials: Arc<dyn CredentialSource>,
    responses_routes: ResponsesRoutes,
}

/// Chat-completions models that must be sent to the responses endpoint
#[derive(Default)]
struct ResponsesRoutes {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ResponsesRoutes {
    fn matches(&self, model: &str) -> bool {
        self.include.iter().any(|pattern| pattern.is_match(model))
            && !self.exclude.iter().any(|pattern| pattern.is_match(model))
    }
}

/// Selects and memoises the adapter serving each model identifier
pub struct ProviderDispatcher {
    providers: IndexMap<String, ProviderSlot>,
    fallback_order: Vec<String>,
    default_provider: Option<String>,
    registry: DashMap<String, Arc<DispatchEntry>>,
    client: reqwest::Client,
}

impl ProviderDispatcher {
    /// Build providers and their credential sources from configuration
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let mut providers = IndexMap::with_capacity(config.providers.len());

        for (name, provider_config) in &config.providers {
            let credentials: Arc<dyn CredentialSource> = match provider_config {
                ProviderConfig::ChatCompletions(chat) => Arc::new(StaticCredential::new(name, chat.api_key.clone())),
                ProviderConfig::Responses(responses) => match &responses.oauth {
                    Some(oauth) => Arc::new(OAuthCredentialStore::new(name, oauth, client.clone())),
                    None => Arc::new(StaticCredential::new(name, responses.api_key.clone())),
                },
                ProviderConfig::Agent(_) => Arc::new(NoCredential),
            };

            let responses_routes = match provider_config {
                ProviderConfig::ChatCompletions(chat) => ResponsesRoutes {
                    include: compile(&chat.responses_models)?,
                    exclude: compile(&chat.responses_exclude)?,
                },
                ProviderConfig::Responses(_) | ProviderConfig::Agent(_) => ResponsesRoutes::default(),
            };

            tracing::debug!(provider = %name, available = credentials.is_available(), "provider configured");

            providers.insert(
                name.clone(),
                ProviderSlot {
                    config: provider_config.clone(),
                    credentials,
                    responses_routes,
                },
            );
        }

        Ok(Self {
            providers,
            fallback_order: config.fallback_order.clone(),
            default_provider: config.default_provider.clone(),
            registry: DashMap::new(),
            client,
        })
    }

    /// Entry serving `model_id`, or an authentication error naming the
    /// requested provider when nothing can serve it
    ///
    /// Candidates are tried in order; one without an available credential
    /// or whose adapter cannot be built is skipped.
    pub fn select(&self, model_id: &str) -> Result<Arc<DispatchEntry>, LlmError> {
        let id = ModelId::parse(model_id);

        for (provider, model) in self.candidates(&id) {
            let Some(slot) = self.providers.get(provider) else {
                continue;
            };

            if !slot.credentials.is_available() {
                tracing::debug!(provider, model_id = %id.raw, "skipping provider without credential");
                continue;
            }

            // Reuse the memoised entry unless availability moved the choice
            if let Some(entry) = self.registry.get(&id.raw).filter(|entry| entry.provider == provider) {
                return Ok(Arc::clone(entry.value()));
            }

            let entry = match self.build_entry(provider, slot, ModelTarget::new(model, id.level.clone())) {
                Ok(entry) => Arc::new(entry),
                Err(e) => {
                    tracing::warn!(provider, model_id = %id.raw, error = %e, "skipping provider that failed to build");
                    continue;
                }
            };

            tracing::info!(
                model_id = %id.raw,
                provider = %entry.provider,
                model = %entry.target.model,
                kind = ?entry.kind,
                "model dispatched"
            );

            self.registry.insert(id.raw.clone(), Arc::clone(&entry));
            return Ok(entry);
        }

        let requested = id.provider.as_deref().unwrap_or(&id.raw);
        tracing::warn!(model_id = %id.raw, provider = requested, "no provider can serve model");

        Err(LlmError::authentication(
            requested,
            format!("no configured provider has a usable credential for '{}'", id.raw),
        ))
    }

    /// Providers to try, in order, with the model each would receive
    fn candidates<'a>(&'a self, id: &'a ModelId) -> Vec<(&'a str, &'a str)> {
        let mut candidates: Vec<(&str, &str)> = Vec::new();

        match id.provider.as_deref().filter(|provider| self.providers.contains_key(*provider)) {
            Some(requested) => {
                candidates.push((requested, &id.model));
                candidates.extend(
                    self.fallback_order
                        .iter()
                        .filter(|name| name.as_str() != requested)
                        .map(|name| (name.as_str(), id.model.as_str())),
                );
            }
            // Unknown prefixes are vendor/model ids for an aggregator
            None => {
                let verbatim = id.without_level();
                if let Some(default) = &self.default_provider {
                    candidates.push((default.as_str(), verbatim));
                }
                candidates.extend(
                    self.fallback_order
                        .iter()
                        .filter(|name| Some(name.as_str()) != self.default_provider.as_deref())
                        .map(|name| (name.as_str(), verbatim)),
                );
            }
        }

        candidates
    }

    fn build_entry(&self, name: &str, slot: &ProviderSlot, target: ModelTarget) -> Result<DispatchEntry, LlmError> {
        let kind = match &slot.config {
            ProviderConfig::ChatCompletions(_) if slot.responses_routes.matches(&target.model) => AdapterKind::Responses,
            ProviderConfig::ChatCompletions(_) => AdapterKind::ChatCompletions,
            ProviderConfig::Responses(_) => AdapterKind::Responses,
            ProviderConfig::Agent(_) => AdapterKind::Agent,
        };

        let adapter: Arc<dyn UpstreamAdapter> = match &slot.config {
            ProviderConfig::ChatCompletions(chat) if kind == AdapterKind::Responses => {
                let base = chat.base_url.as_str().trim_end_matches('/');
                let endpoint = url::Url::parse(&format!("{base}/responses")).map_err(anyhow::Error::from)?;
                Arc::new(ResponsesAdapter::new(
                    name,
                    self.client.clone(),
                    endpoint,
                    parse_headers(name, &chat.headers),
                    None,
                    target.clone(),
                ))
            }
            ProviderConfig::ChatCompletions(chat) => Arc::new(ChatCompletionAdapter::new(
                name,
                self.client.clone(),
                chat.base_url.clone(),
                parse_headers(name, &chat.headers),
                target.clone(),
            )),
            ProviderConfig::Responses(responses) => Arc::new(ResponsesAdapter::new(
                name,
                self.client.clone(),
                responses.endpoint.clone(),
                parse_headers(name, &responses.headers),
                responses.store,
                target.clone(),
            )),
            ProviderConfig::Agent(agent) => Arc::new(AgentIpcAdapter::new(name, agent.clone(), target.clone())?),
        };

        Ok(DispatchEntry {
            provider: name.to_owned(),
            target,
            kind,
            adapter,
            credentials: Arc::clone(&slot.credentials),
        })
    }
}

fn compile(patterns: &[String]) -> anyhow::Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).map_err(|e| anyhow::anyhow!("invalid model pattern `{pattern}`: {e}")))
        .collect()
}
