//! Streaming completion client.

use std::time::Duration;

use futures::StreamExt;

use crate::error::UpstreamError;
use crate::sse::SseParser;
use crate::types::{
    CompletionReply, CompletionRequest, PartialReply, WireChunk, WireRequest, WireStreamOptions,
};

/// Terminal SSE payload sent by the provider.
const DONE_SENTINEL: &str = "[DONE]";

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// One instance is shared by all requests; `reqwest::Client` pools
/// connections internally. The whole call, stream included, is bounded by
/// the configured timeout.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client for the given API base URL and key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
            timeout,
        }
    }

    /// Complete a message, streaming partial output through `on_partial`.
    ///
    /// Partials are delivered in arrival order. The final reply carries the
    /// accumulated text and the provider's usage report when one was sent.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Timeout` when the deadline elapses,
    /// `UpstreamError::Status`/`Unknown` for error statuses, or
    /// `UpstreamError::Transport` for connection failures.
    pub async fn send<F>(
        &self,
        request: &CompletionRequest,
        on_partial: F,
    ) -> Result<CompletionReply, UpstreamError>
    where
        F: FnMut(PartialReply) + Send,
    {
        match tokio::time::timeout(self.timeout, self.stream_completion(request, on_partial)).await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }

    async fn stream_completion<F>(
        &self,
        request: &CompletionRequest,
        mut on_partial: F,
    ) -> Result<CompletionReply, UpstreamError>
    where
        F: FnMut(PartialReply) + Send,
    {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream: true,
            stream_options: WireStreamOptions {
                include_usage: true,
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), message));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut reply = CompletionReply {
            id: String::new(),
            text: String::new(),
            usage: None,
        };

        while let Some(chunk) = stream.next().await {
            parser.push(&chunk?);
            while let Some(data) = parser.next_data() {
                if data == DONE_SENTINEL {
                    continue;
                }
                let chunk: WireChunk = match serde_json::from_str(&data) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!(%err, data, "skipping unparsable stream event");
                        continue;
                    }
                };

                if reply.id.is_empty() && !chunk.id.is_empty() {
                    reply.id = chunk.id;
                }
                if let Some(usage) = chunk.usage {
                    reply.usage = Some(usage.into());
                }
                for choice in chunk.choices {
                    if let Some(delta) = choice.delta.content {
                        if delta.is_empty() {
                            continue;
                        }
                        reply.text.push_str(&delta);
                        on_partial(PartialReply {
                            id: reply.id.clone(),
                            text: reply.text.clone(),
                            delta,
                        });
                    }
                }
            }
        }

        Ok(reply)
    }
}
