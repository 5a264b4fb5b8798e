//! Streaming client for the upstream chat-completion API.
//!
//! This crate is the boundary to the remote conversational provider. The
//! settlement engine only needs two things from it:
//!
//! - [`UpstreamClient::send`]: complete a message, relaying streamed partial
//!   output through a callback as it arrives, and return the final text with
//!   optional token usage, and
//! - [`UpstreamError`]: a typed failure carrying the provider's status code
//!   mapped to a human-readable category.
//!
//! The client always requests a streamed response with usage reporting
//! enabled, so actual cost can be settled from real token counts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod sse;
pub mod types;

pub use client::UpstreamClient;
pub use error::{StatusCategory, UpstreamError};
pub use types::{ChatMessage, CompletionReply, CompletionRequest, PartialReply, Role};
