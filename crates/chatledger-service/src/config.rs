//! Service configuration.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use chatledger_core::{LedgerError, ModelCatalog};

/// Default bound on one upstream call, stream included.
const DEFAULT_TIMEOUT_MS: u64 = 100_000;

/// Errors that make startup impossible.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No upstream credential was supplied.
    #[error("missing OPENAI_API_KEY environment variable")]
    MissingApiKey,

    /// An environment variable holds an unusable value.
    #[error("invalid {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The model-choice catalog failed to parse or validate.
    #[error("invalid MODEL_CHOICES: {0}")]
    Catalog(#[from] LedgerError),
}

/// Whether settlement reserves up front or debits afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingMode {
    /// Reserve the worst-case price before the call, refund the difference.
    #[default]
    PrePay,
    /// Admit while balance is positive, debit actual cost afterwards.
    PostPay,
}

impl std::fmt::Display for BillingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PrePay => "prepay",
            Self::PostPay => "postpay",
        })
    }
}

/// Service configuration resolved once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:3002").
    pub listen_addr: String,

    /// Upstream API key (required).
    pub api_key: String,

    /// Upstream API base URL (default: `https://api.openai.com`).
    pub api_base_url: String,

    /// Model used when no model choice applies.
    pub default_model: String,

    /// Bound on one upstream call, stream included.
    pub timeout: Duration,

    /// Shared secret gating the API (optional).
    pub auth_secret_key: Option<String>,

    /// Directory holding one balance file per identity (optional).
    pub quota_dir: Option<String>,

    /// Model-choice catalog (optional).
    pub catalog: Option<Arc<ModelCatalog>>,

    /// Pre-deduction or post-paid settlement.
    pub billing_mode: BillingMode,

    /// Balance granted to identities with no stored record.
    pub initial_grant: Decimal,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Operator-supplied HTML blurb shown by clients.
    pub about_html: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingApiKey` when no credential is configured,
    /// or a parse/validation error for malformed values. Both are fatal; the
    /// binary refuses to start rather than run with ambiguous billing
    /// settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let catalog = match non_empty_var("MODEL_CHOICES") {
            Some(json) => Some(Arc::new(ModelCatalog::from_json(&json)?)),
            None => None,
        };

        let billing_mode = match non_empty_var("BILLING_MODE").as_deref() {
            None | Some("prepay") => BillingMode::PrePay,
            Some("postpay") => BillingMode::PostPay,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "BILLING_MODE",
                    reason: format!("expected \"prepay\" or \"postpay\", got {other:?}"),
                })
            }
        };

        let initial_grant = match non_empty_var("INITIAL_GRANT") {
            Some(raw) => {
                Decimal::from_str_exact(raw.trim()).map_err(|err| ConfigError::InvalidValue {
                    name: "INITIAL_GRANT",
                    reason: err.to_string(),
                })?
            }
            None => Decimal::ZERO,
        };

        let timeout_ms = non_empty_var("TIMEOUT_MS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Ok(Self {
            listen_addr: non_empty_var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3002".into()),
            api_key,
            api_base_url: non_empty_var("OPENAI_API_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".into()),
            default_model: non_empty_var("OPENAI_API_MODEL")
                .unwrap_or_else(|| "gpt-3.5-turbo".into()),
            timeout: Duration::from_millis(timeout_ms),
            auth_secret_key: non_empty_var("AUTH_SECRET_KEY"),
            quota_dir: non_empty_var("QUOTA_DIR"),
            catalog,
            billing_mode,
            initial_grant,
            max_body_bytes: non_empty_var("MAX_BODY_BYTES")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(1024 * 1024),
            about_html: std::env::var("ABOUT_HTML").unwrap_or_default(),
        })
    }

    /// The single global quota switch: balances are only consulted when both
    /// the catalog and the quota directory are configured.
    #[must_use]
    pub fn quota_enabled(&self) -> bool {
        self.catalog.is_some() && self.quota_dir.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
