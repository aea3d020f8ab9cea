//! Mapping from a thinking token budget to a reasoning effort level

use std::fmt;

/// Model families that accept the `xhigh` level
const XHIGH_MODEL_PREFIXES: &[&str] = &["gpt-5.1-codex-max", "gpt-5.2", "gpt-5.3"];

/// Reasoning effort understood by effort-based backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

impl ReasoningEffort {
    /// Effort for a thinking budget on `model`
    ///
    /// A zero budget means no reasoning was requested.
    pub fn from_budget(budget_tokens: u32, model: &str) -> Option<Self> {
        match budget_tokens {
            0 => None,
            1..10_000 => Some(Self::Low),
            10_000..15_000 => Some(Self::Medium),
            15_000..32_000 => Some(Self::High),
            _ if supports_xhigh(model) => Some(Self::XHigh),
            _ => Some(Self::High),
        }
    }

    /// Parse an explicit level such as the `:high` model id suffix
    pub fn parse(level: &str) -> Option<Self> {
        match level.to_ascii_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "xhigh" => Some(Self::XHigh),
            _ => None,
        }
    }

    /// Explicit level wins; otherwise derive from the budget
    pub fn resolve(level: Option<&str>, budget_tokens: Option<u32>, model: &str) -> Option<Self> {
        level
            .and_then(Self::parse)
            .or_else(|| budget_tokens.and_then(|budget| Self::from_budget(budget, model)))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::XHigh => "xhigh",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches case-insensitively, ignoring a leading `vendor/` segment
fn supports_xhigh(model: &str) -> bool {
    let model = model.to_ascii_lowercase();
    let bare = model.split_once('/').map_or(model.as_str(), |(_, rest)| rest);
    XHIGH_MODEL_PREFIXES.iter().any(|prefix| bare.starts_with(prefix))
}
