//! Session, verification and configuration endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use chatledger_core::ModelChoice;

use crate::auth::{Identity, SecretAuth};
use crate::response::ResponseEnvelope;
use crate::state::AppState;

/// Client-facing session description.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    /// Whether the shared-secret gate is active.
    pub auth: bool,
    /// Model used when no choice applies.
    pub model: String,
}

/// Handle `POST /session`.
pub async fn session(State(state): State<Arc<AppState>>) -> Json<ResponseEnvelope<SessionInfo>> {
    Json(ResponseEnvelope::success(SessionInfo {
        auth: state.config.auth_secret_key.is_some(),
        model: state.config.default_model.clone(),
    }))
}

/// Body of a `POST /verify` request.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Candidate secret.
    pub token: String,
}

/// Handle `POST /verify`: check a candidate secret before the client stores it.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> Json<ResponseEnvelope<()>> {
    if body.token.is_empty() {
        return Json(ResponseEnvelope::fail("Secret key is empty"));
    }
    match state.config.auth_secret_key.as_deref() {
        Some(secret) if secret == body.token => Json(ResponseEnvelope {
            status: crate::response::ResponseStatus::Success,
            message: "Verify successfully".to_string(),
            data: None,
        }),
        Some(_) => Json(ResponseEnvelope::fail("Secret key is invalid")),
        None => Json(ResponseEnvelope::fail("No secret key is configured")),
    }
}

/// Runtime configuration surfaced to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
    /// Upstream call timeout in milliseconds.
    pub timeout_ms: u128,
    /// Model used when no choice applies.
    pub default_model: String,
    /// Pre-deduction or post-paid settlement.
    pub billing_mode: String,
    /// Whether balances are consulted at all.
    pub quota_enabled: bool,
    /// Requesting identity's balance, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_quota: Option<String>,
    /// Catalog entries with limits and prices.
    pub model_choices: Vec<ModelChoice>,
    /// Operator-supplied HTML blurb.
    pub about_html: String,
}

/// Handle `POST /config`.
pub async fn config(
    State(state): State<Arc<AppState>>,
    _auth: SecretAuth,
    identity: Identity,
) -> Json<ResponseEnvelope<ConfigInfo>> {
    let user_quota = match (&identity.0, state.config.quota_enabled()) {
        (Some(name), true) => match state.engine.balance(name).await {
            Ok(balance) => Some(format!("{balance} @ {name}")),
            Err(err) => {
                tracing::warn!(user = %name, %err, "could not read balance");
                return Json(ResponseEnvelope::fail(err.to_string()));
            }
        },
        _ => None,
    };

    Json(ResponseEnvelope::success(ConfigInfo {
        timeout_ms: state.config.timeout.as_millis(),
        default_model: state.config.default_model.clone(),
        billing_mode: state.config.billing_mode.to_string(),
        quota_enabled: state.config.quota_enabled(),
        user_quota,
        model_choices: catalog_entries(&state),
        about_html: state.config.about_html.clone(),
    }))
}

/// Handle `POST /model-choices`.
pub async fn model_choices(
    State(state): State<Arc<AppState>>,
) -> Json<ResponseEnvelope<Vec<ModelChoice>>> {
    Json(ResponseEnvelope::success(catalog_entries(&state)))
}

fn catalog_entries(state: &AppState) -> Vec<ModelChoice> {
    state
        .config
        .catalog
        .as_deref()
        .map(|catalog| catalog.choices().to_vec())
        .unwrap_or_default()
}
