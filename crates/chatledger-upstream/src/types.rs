//! Request and reply types for the chat-completions wire protocol.

use serde::{Deserialize, Serialize};

use chatledger_core::TokenUsage;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Conversation-level instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// One message in the conversation sent upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A completion request as assembled by the caller.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Underlying model identifier.
    pub model: String,
    /// Full message list, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,
    /// Cap on completion tokens (the model choice's response limit).
    pub max_tokens: Option<u32>,
}

/// A partial reply relayed to the caller while the stream is in flight.
#[derive(Debug, Clone, Serialize)]
pub struct PartialReply {
    /// Provider-assigned completion id.
    pub id: String,
    /// Text accumulated so far.
    pub text: String,
    /// The newest text fragment.
    pub delta: String,
}

/// The final reply once the stream has completed.
#[derive(Debug, Clone)]
pub struct CompletionReply {
    /// Provider-assigned completion id.
    pub id: String,
    /// Full completion text.
    pub text: String,
    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// JSON body POSTed to `/v1/chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct WireRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub stream_options: WireStreamOptions,
}

/// `stream_options`: asks the provider to append a usage chunk.
#[derive(Debug, Serialize)]
pub(crate) struct WireStreamOptions {
    pub include_usage: bool,
}

/// One parsed SSE chunk of a streamed completion.
#[derive(Debug, Deserialize)]
pub(crate) struct WireChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<WireChunkChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChunkChoice {
    #[serde(default)]
    pub delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}
