//! Upstream failure taxonomy.

use std::fmt;
use std::time::Duration;

/// Human-readable categories for upstream HTTP status codes.
///
/// Anything outside this table surfaces as [`UpstreamError::Unknown`] with
/// the raw provider message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// 401: the configured API key was rejected.
    Unauthorized,
    /// 403: the provider refused access.
    Forbidden,
    /// 500: provider-side internal error.
    InternalError,
    /// 502: bad gateway in front of the provider.
    BadGateway,
    /// 503: provider is overloaded.
    ServiceBusy,
    /// 504: gateway timed out waiting for the provider.
    GatewayTimeout,
}

impl StatusCategory {
    /// Map a status code to its category, if listed.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            500 => Some(Self::InternalError),
            502 => Some(Self::BadGateway),
            503 => Some(Self::ServiceBusy),
            504 => Some(Self::GatewayTimeout),
            _ => None,
        }
    }

    /// The user-facing message for this category.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthorized => "[Upstream] Incorrect API key provided",
            Self::Forbidden => "[Upstream] Server refused to access, please try again later",
            Self::InternalError | Self::ServiceBusy => {
                "[Upstream] Server is busy, please try again later"
            }
            Self::BadGateway => "[Upstream] Bad Gateway",
            Self::GatewayTimeout => "[Upstream] Gateway Time-out",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors surfaced by the completion client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider answered with a categorized error status.
    #[error("{category}")]
    Status {
        /// Raw HTTP status code.
        code: u16,
        /// Mapped category with its user-facing message.
        category: StatusCategory,
    },

    /// The provider answered with an uncategorized error status.
    #[error("{message}")]
    Unknown {
        /// Raw HTTP status code, when one was received.
        code: Option<u16>,
        /// Raw provider message.
        message: String,
    },

    /// The call exceeded the configured deadline.
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    /// The request never produced a response.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Build the right variant for a non-success HTTP status.
    #[must_use]
    pub fn from_status(code: u16, body: String) -> Self {
        match StatusCategory::from_code(code) {
            Some(category) => Self::Status { code, category },
            None => {
                let message = if body.trim().is_empty() {
                    format!("upstream returned status {code}")
                } else {
                    body
                };
                Self::Unknown {
                    code: Some(code),
                    message,
                }
            }
        }
    }

    /// The HTTP status code attached to this failure, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Unknown { code, .. } => *code,
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Timeout(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_codes_map_to_categories() {
        for (code, category) in [
            (401, StatusCategory::Unauthorized),
            (403, StatusCategory::Forbidden),
            (500, StatusCategory::InternalError),
            (502, StatusCategory::BadGateway),
            (503, StatusCategory::ServiceBusy),
            (504, StatusCategory::GatewayTimeout),
        ] {
            match UpstreamError::from_status(code, String::new()) {
                UpstreamError::Status { code: c, category: got } => {
                    assert_eq!(c, code);
                    assert_eq!(got, category);
                }
                other => panic!("expected categorized status, got {other:?}"),
            }
        }
    }

    #[test]
    fn unlisted_code_keeps_raw_message() {
        let err = UpstreamError::from_status(418, "i'm a teapot".to_string());
        match err {
            UpstreamError::Unknown { code, message } => {
                assert_eq!(code, Some(418));
                assert_eq!(message, "i'm a teapot");
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }
}
