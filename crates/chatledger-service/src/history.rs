//! In-memory conversation history.
//!
//! Clients continue a conversation by sending the id of the last assistant
//! reply; the upstream API is stateless, so the service keeps every exchanged
//! message and rebuilds the thread by walking parent links.

use dashmap::DashMap;
use uuid::Uuid;

use chatledger_upstream::{ChatMessage, Role};

/// Longest ancestor chain rebuilt into one request.
const DEFAULT_MAX_THREAD_LEN: usize = 40;

/// One recorded message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Parent message, if the message continued a thread.
    pub parent: Option<Uuid>,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub text: String,
}

/// Concurrent message log keyed by message id.
///
/// An unknown parent id simply starts a fresh thread, matching how the
/// reference frontends behave after a service restart.
// TODO: evict threads with no activity; the map currently grows for the
// lifetime of the process.
pub struct ChatHistory {
    messages: DashMap<Uuid, StoredMessage>,
    max_thread_len: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THREAD_LEN)
    }
}

impl ChatHistory {
    /// Create a history that rebuilds at most `max_thread_len` messages.
    #[must_use]
    pub fn new(max_thread_len: usize) -> Self {
        Self {
            messages: DashMap::new(),
            max_thread_len,
        }
    }

    /// Record a message and return its id.
    pub fn record(&self, parent: Option<Uuid>, role: Role, text: String) -> Uuid {
        let id = Uuid::new_v4();
        self.messages.insert(id, StoredMessage { parent, role, text });
        id
    }

    /// Rebuild the thread ending at `tip`, oldest message first.
    #[must_use]
    pub fn thread(&self, tip: Uuid) -> Vec<ChatMessage> {
        let mut chain = Vec::new();
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            if chain.len() >= self.max_thread_len {
                break;
            }
            let Some(message) = self.messages.get(&id) else {
                break;
            };
            chain.push(ChatMessage::new(message.role, message.text.clone()));
            cursor = message.parent;
        }
        chain.reverse();
        chain
    }
}
