//! Agent subprocess upstream
//!
//! Each request spawns the agent, runs the JSON-RPC handshake, starts one
//! turn, and streams its notifications until `turn/completed`. The agent
//! authenticates itself and runs its own tools.

mod session;
mod transport;

use std::time::Duration;

use async_trait::async_trait;
use conduit_config::AgentConfig;
use serde_json::json;

use self::session::AgentSession;
use self::transport::AgentProcess;
use super::{ModelTarget, NativeEventStream, UpstreamAdapter};
use crate::convert::agent::{AgentStep, NotificationMapper, compose_prompt};
use crate::credential::Credential;
use crate::error::LlmError;
use crate::types::{CanonicalRequest, NativeEvent};

/// Model name that leaves the choice to the agent
const DEFAULT_MODEL: &str = "default";

pub struct AgentIpcAdapter {
    name: String,
    config: AgentConfig,
    idle_timeout: Duration,
    target: ModelTarget,
}

impl AgentIpcAdapter {
    pub fn new(name: impl Into<String>, config: AgentConfig, target: ModelTarget) -> anyhow::Result<Self> {
        let idle_timeout = config.idle_timeout()?;

        Ok(Self {
            name: name.into(),
            config,
            idle_timeout,
            target,
        })
    }

    fn thread_params(&self, request: &CanonicalRequest) -> serde_json::Value {
        let mut params = json!({
            "approvalPolicy": "never",
            "sandbox": self.config.sandbox,
        });

        if !self.target.model.is_empty() && !self.target.model.eq_ignore_ascii_case(DEFAULT_MODEL) {
            params["model"] = json!(self.target.model);
        }

        if let Some(effort) = self.target.effort(request) {
            params["effort"] = json!(effort.as_str());
        }

        params
    }
}

#[async_trait]
impl UpstreamAdapter for AgentIpcAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: &CanonicalRequest, _credential: Credential) -> Result<NativeEventStream, LlmError> {
        let process = AgentProcess::spawn(&self.config).map_err(|e| {
            tracing::error!(provider = %self.name, command = %self.config.command, error = %e, "failed to spawn agent");
            LlmError::Subprocess(format!("failed to spawn `{}`: {e}", self.config.command))
        })?;

        tracing::debug!(provider = %self.name, pid = ?process.id(), "agent spawned");

        let mut session = AgentSession::new(process, self.idle_timeout);

        let thread_id = match session.start_thread(self.thread_params(request)).await {
            Ok(thread_id) => thread_id,
            Err(e) => {
                session.shutdown().await;
                return Err(e);
            }
        };

        let turn = json!({
            "threadId": thread_id,
            "input": [{"type": "text", "text": compose_prompt(request)}],
        });

        if let Err(e) = session.send_request("turn/start", turn).await {
            session.shutdown().await;
            return Err(e);
        }

        let provider = self.name.clone();
        let turns = futures_util::stream::unfold(
            Some((session, NotificationMapper::new())),
            move |state| {
                let provider = provider.clone();
                async move {
                    let (mut session, mut mapper) = state?;

                    loop {
                        let step = match session.next_message().await {
                            Ok(message) => mapper.map(&message),
                            Err(e) => {
                                tracing::warn!(provider = %provider, error = %e, "agent turn failed");
                                session.shutdown().await;
                                return Some((vec![Err(e)], None));
                            }
                        };

                        match step {
                            AgentStep::Emit(events) if events.is_empty() => {}
                            AgentStep::Emit(events) => {
                                return Some((events.into_iter().map(Ok).collect::<Vec<_>>(), Some((session, mapper))));
                            }
                            AgentStep::Failed(message) => {
                                tracing::warn!(provider = %provider, error = %message, "agent turn failed");
                                session.shutdown().await;
                                return Some((vec![Err(LlmError::Subprocess(message))], None));
                            }
                            AgentStep::TurnCompleted => {
                                tracing::debug!(provider = %provider, "agent turn completed");
                                session.shutdown().await;
                                return Some((vec![Ok(NativeEvent::StreamDone)], None));
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(futures_util::StreamExt::flat_map(turns, futures_util::stream::iter)))
    }
}
