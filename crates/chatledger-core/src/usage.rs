//! Token usage reported by the completion provider.

use serde::{Deserialize, Serialize};

/// Token counts returned with a successful completion.
///
/// Providers may omit usage entirely (notably on some streamed responses);
/// settlement treats a missing report as a zero-cost call and refunds the
/// whole reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt (context included).
    pub prompt_tokens: u64,

    /// Tokens produced in the completion.
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Create a usage report from raw counts.
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Total tokens across both directions.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
