//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::response::{ResponseEnvelope, ResponseStatus};

/// Errors returned straight from extractors.
///
/// Business failures (invalid model choice, insufficient quota, upstream
/// errors) never become `ApiError`; they are rendered as `Fail` envelopes so
/// clients see a uniform shape.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or wrong auth secret.
    #[error("Please authenticate.")]
    Unauthorized,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, status) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, ResponseStatus::Unauthorized),
        };

        let body = ResponseEnvelope::<()> {
            status,
            message: self.to_string(),
            data: None,
        };
        (status_code, Json(body)).into_response()
    }
}
