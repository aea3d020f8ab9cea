//! Approximate token counting

use std::sync::LazyLock;

use tiktoken_rs::{CoreBPE, o200k_base};

static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| {
    o200k_base()
        .inspect_err(|e| tracing::warn!(error = %e, "o200k_base unavailable, estimating by length"))
        .ok()
});

/// Estimate token count using tiktoken, falling back to `len / 4`
pub fn estimate_tokens(text: &str) -> usize {
    ENCODER
        .as_ref()
        .map_or_else(|| text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len())
}
