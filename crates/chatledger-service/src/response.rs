//! The uniform response envelope.
//!
//! Every business endpoint answers with the same shape, success or failure;
//! only authentication failures use HTTP status codes. Streamed chat output
//! terminates with one envelope line as well.

use serde::Serialize;

/// Envelope status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    /// The operation completed and `data` is populated.
    Success,
    /// The operation failed; `message` explains why.
    Fail,
    /// Authentication was missing or wrong.
    Unauthorized,
}

/// Uniform success/failure envelope.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope<T> {
    /// Outcome discriminator.
    pub status: ResponseStatus,
    /// Human-readable message, empty on success.
    pub message: String,
    /// Payload, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ResponseEnvelope<T> {
    /// Successful envelope carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: String::new(),
            data: Some(data),
        }
    }

    /// Failed envelope carrying a message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fail,
            message: message.into(),
            data: None,
        }
    }
}
