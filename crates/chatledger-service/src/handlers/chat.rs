//! The chat endpoint.
//!
//! Responds with `application/octet-stream`: newline-delimited JSON. While
//! the upstream call is in flight each line is a raw partial reply; the last
//! line is always a [`ResponseEnvelope`] with the final outcome.
//!
//! Settlement runs on a detached task bridged to the response body by a
//! channel. If the client disconnects mid-stream only the relay dies; the
//! task still reconciles the reservation against whatever the upstream call
//! produced.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use chatledger_core::TokenUsage;
use chatledger_upstream::{ChatMessage, CompletionRequest, Role};

use crate::auth::{Identity, SecretAuth};
use crate::response::ResponseEnvelope;
use crate::state::AppState;

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatProcessRequest {
    /// The user's message.
    pub prompt: String,

    /// Prior conversation context.
    #[serde(default)]
    pub options: Option<ChatContext>,

    /// Conversation-level instructions.
    #[serde(default, rename = "systemMessage")]
    pub system_message: Option<String>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Model choice selector; required when a catalog is configured.
    #[serde(default, rename = "modelName")]
    pub model_name: Option<String>,
}

/// Link to the previous turn of the conversation.
#[derive(Debug, Default, Deserialize)]
pub struct ChatContext {
    /// Id of the reply this request continues.
    #[serde(default, rename = "parentMessageId")]
    pub parent_message_id: Option<Uuid>,
}

/// One streamed line: a partial or final reply.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatChunk {
    id: String,
    role: Role,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<TokenUsage>,
}

/// Handle `POST /chat-process`.
pub async fn chat_process(
    State(state): State<Arc<AppState>>,
    _auth: SecretAuth,
    identity: Identity,
    Json(body): Json<ChatProcessRequest>,
) -> Response {
    let identity = match identity.0 {
        Some(name) => name,
        None if state.config.quota_enabled() => {
            return single_line(&ResponseEnvelope::<ChatChunk>::fail(
                "Identity required for quota accounting",
            ));
        }
        None => "anonymous".to_string(),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_chat(state, identity, body, tx));
    stream_response(rx)
}

/// Drive one settled chat request to completion, feeding the relay channel.
async fn run_chat(
    state: Arc<AppState>,
    identity: String,
    body: ChatProcessRequest,
    tx: UnboundedSender<String>,
) {
    let parent = body.options.as_ref().and_then(|o| o.parent_message_id);
    let user_message_id = state
        .history
        .record(parent, Role::User, body.prompt.clone());

    let mut messages = Vec::new();
    if let Some(system) = body
        .system_message
        .as_ref()
        .filter(|s| !s.trim().is_empty())
    {
        messages.push(ChatMessage::new(Role::System, system.clone()));
    }
    messages.extend(state.history.thread(user_message_id));

    let upstream = Arc::clone(&state.upstream);
    let default_model = state.config.default_model.clone();
    let temperature = body.temperature;
    let top_p = body.top_p;
    let partial_tx = tx.clone();

    let result = state
        .engine
        .settle(&identity, body.model_name.as_deref(), move |choice| {
            let request = CompletionRequest {
                model: choice
                    .as_ref()
                    .map_or(default_model, |c| c.model.clone()),
                messages,
                temperature,
                top_p,
                max_tokens: choice.as_ref().map(|c| c.response_tokens),
            };
            async move {
                upstream
                    .send(&request, move |partial| {
                        send_line(
                            &partial_tx,
                            &ChatChunk {
                                id: partial.id,
                                role: Role::Assistant,
                                text: partial.text,
                                delta: Some(partial.delta),
                                parent_message_id: Some(user_message_id),
                                usage: None,
                            },
                        );
                    })
                    .await
            }
        })
        .await;

    match result {
        Ok(reply) => {
            let reply_id =
                state
                    .history
                    .record(Some(user_message_id), Role::Assistant, reply.text.clone());
            send_line(
                &tx,
                &ResponseEnvelope::success(ChatChunk {
                    id: reply_id.to_string(),
                    role: Role::Assistant,
                    text: reply.text,
                    delta: None,
                    parent_message_id: Some(user_message_id),
                    usage: reply.usage,
                }),
            );
        }
        Err(err) => {
            tracing::warn!(user = %identity, %err, "chat request failed");
            send_line(&tx, &ResponseEnvelope::<ChatChunk>::fail(err.to_string()));
        }
    }
}

fn send_line<T: Serialize>(tx: &UnboundedSender<String>, payload: &T) {
    match serde_json::to_string(payload) {
        // A closed receiver just means the client went away; settlement
        // continues regardless.
        Ok(line) => {
            let _ = tx.send(line);
        }
        Err(err) => tracing::error!(%err, "failed to serialize stream line"),
    }
}

/// Newline-delimited relay of everything sent on the channel.
fn stream_response(rx: UnboundedReceiver<String>) -> Response {
    let stream = futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        let line = rx.recv().await?;
        let framed = if first { line } else { format!("\n{line}") };
        Some((Ok::<String, Infallible>(framed), (rx, false)))
    });

    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response()
}

fn single_line<T: Serialize>(payload: &T) -> Response {
    let line = serde_json::to_string(payload).unwrap_or_else(|err| {
        tracing::error!(%err, "failed to serialize response line");
        r#"{"status":"Fail","message":"internal error"}"#.to_string()
    });
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        line,
    )
        .into_response()
}
