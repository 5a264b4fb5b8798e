//! Chatledger service entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatledger_service::{create_router, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chatledger service");

    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        default_model = %config.default_model,
        billing_mode = %config.billing_mode,
        quota_enabled = %config.quota_enabled(),
        auth_enabled = %config.auth_secret_key.is_some(),
        "Service configuration loaded"
    );

    let listen_addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = create_router(state);

    tracing::info!(%listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
