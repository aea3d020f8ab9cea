#![allow(clippy::must_use_candidate)]

pub mod cors;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use cors::*;
pub use health::*;
pub use llm::*;
pub use server::*;
pub use telemetry::*;

/// Top-level Conduit configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream providers and dispatch order
    #[serde(default)]
    pub llm: LlmConfig,
    /// Log output configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
