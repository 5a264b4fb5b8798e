//! Application state.

use std::sync::Arc;

use chatledger_store::{BalanceStore, FsBalanceStore, MemoryBalanceStore, StoreError};
use chatledger_upstream::UpstreamClient;

use crate::config::ServiceConfig;
use crate::history::ChatHistory;
use crate::settlement::SettlementEngine;

/// Application state shared across handlers.
pub struct AppState {
    /// Immutable service configuration.
    pub config: ServiceConfig,

    /// The settlement engine, one instance for all requests.
    pub engine: SettlementEngine,

    /// Client for the upstream completion API.
    pub upstream: Arc<UpstreamClient>,

    /// Conversation history for context rebuilding.
    pub history: ChatHistory,
}

impl AppState {
    /// Build the application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the quota directory cannot be opened.
    pub fn new(config: ServiceConfig) -> Result<Self, StoreError> {
        let quota_enabled = config.quota_enabled();

        let store: Arc<dyn BalanceStore> = match (&config.quota_dir, quota_enabled) {
            (Some(dir), true) => {
                tracing::info!(quota_dir = %dir, mode = %config.billing_mode, "quota enforcement enabled");
                Arc::new(FsBalanceStore::open(dir, config.initial_grant)?)
            }
            _ => {
                tracing::warn!("quota enforcement disabled - requests will not be billed");
                Arc::new(MemoryBalanceStore::new())
            }
        };

        let engine = SettlementEngine::new(
            store,
            config.catalog.clone(),
            quota_enabled,
            config.billing_mode,
        );

        let upstream = Arc::new(UpstreamClient::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.timeout,
        ));

        Ok(Self {
            config,
            engine,
            upstream,
            history: ChatHistory::default(),
        })
    }
}
