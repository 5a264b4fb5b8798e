//! Router assembly.
//!
//! Every API route is mounted twice, bare and under `/api`, so the service
//! works both directly and behind path-preserving reverse proxies. No global
//! timeout layer is installed; the chat response streams for as long as the
//! upstream call is allowed to run.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{chat, health, meta};
use crate::state::AppState;

/// Build the service router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/chat-process", post(chat::chat_process))
        .route("/config", post(meta::config))
        .route("/session", post(meta::session))
        .route("/verify", post(meta::verify))
        .route("/model-choices", post(meta::model_choices))
        // Spelling used by the reference frontends.
        .route("/modelChoices", post(meta::model_choices));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .with_state(state)
}
