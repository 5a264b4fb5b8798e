//! Model-choice catalog and pricing.
//!
//! A `ModelChoice` is a named, priced configuration selecting which underlying
//! completion model a request uses, with context/response token limits and
//! per-1000-token prices for both directions. The catalog is loaded once at
//! startup from JSON and is immutable afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::usage::TokenUsage;

/// Base context size multiplied by the model-name bucket.
const META_CONTEXT_TOKENS: u32 = 1024;

/// One catalog entry as supplied by configuration.
///
/// Token limits are optional; when absent they are derived from the model
/// name (`16k`/`32k`/`64k`/`gpt-4` buckets on a 1024-token base), and the
/// response limit defaults to a quarter of the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelChoiceConfig {
    /// Unique user-facing selector.
    pub name: String,

    /// Underlying model identifier sent upstream.
    pub model: String,

    /// Context window in tokens (prompt + response).
    #[serde(default, rename = "contextTokens")]
    pub context_tokens: Option<u32>,

    /// Maximum response size in tokens.
    #[serde(default, rename = "responseTokens")]
    pub response_tokens: Option<u32>,

    /// Price per 1000 prompt tokens.
    #[serde(rename = "promptTokenPrice1k")]
    pub prompt_token_price_1k: Decimal,

    /// Price per 1000 completion tokens.
    #[serde(rename = "completionTokenPrice1k")]
    pub completion_token_price_1k: Decimal,

    /// Knowledge-cutoff date shown to clients (display only).
    #[serde(default, rename = "knowledgeDate")]
    pub knowledge_date: Option<String>,
}

/// A validated catalog entry with its derived maximum reservation price.
#[derive(Debug, Clone, Serialize)]
pub struct ModelChoice {
    /// Unique user-facing selector.
    pub name: String,

    /// Underlying model identifier sent upstream.
    pub model: String,

    /// Context window in tokens.
    #[serde(rename = "contextTokens")]
    pub context_tokens: u32,

    /// Maximum response size in tokens.
    #[serde(rename = "responseTokens")]
    pub response_tokens: u32,

    /// Price per 1000 prompt tokens.
    #[serde(rename = "promptTokenPrice1k")]
    pub prompt_token_price_1k: Decimal,

    /// Price per 1000 completion tokens.
    #[serde(rename = "completionTokenPrice1k")]
    pub completion_token_price_1k: Decimal,

    /// Knowledge-cutoff date shown to clients.
    #[serde(rename = "knowledgeDate", skip_serializing_if = "Option::is_none")]
    pub knowledge_date: Option<String>,

    /// Worst-case cost of one request under the stated limits.
    ///
    /// `promptPrice × (context − response)/1000 + completionPrice × response/1000`;
    /// this is the amount reserved per request in pre-deduction mode.
    #[serde(rename = "maxPrice")]
    pub max_price: Decimal,
}

impl ModelChoice {
    /// Validate a configuration entry and derive its limits and max price.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidCatalogEntry` when the name or model is
    /// empty, a price is negative, or the response limit exceeds the context
    /// limit.
    pub fn from_config(cfg: ModelChoiceConfig) -> Result<Self> {
        let invalid = |reason: &str| LedgerError::InvalidCatalogEntry {
            name: cfg.name.clone(),
            reason: reason.to_string(),
        };

        if cfg.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if cfg.model.trim().is_empty() {
            return Err(invalid("empty model identifier"));
        }
        if cfg.prompt_token_price_1k.is_sign_negative()
            || cfg.completion_token_price_1k.is_sign_negative()
        {
            return Err(invalid("negative token price"));
        }

        let context_tokens = cfg
            .context_tokens
            .unwrap_or_else(|| default_context_tokens(&cfg.model));
        let response_tokens = cfg.response_tokens.unwrap_or(context_tokens / 4);

        if context_tokens == 0 {
            return Err(invalid("zero context limit"));
        }
        if response_tokens > context_tokens {
            return Err(invalid("response limit exceeds context limit"));
        }

        let max_price = per_1k(cfg.prompt_token_price_1k, u64::from(context_tokens - response_tokens))
            + per_1k(cfg.completion_token_price_1k, u64::from(response_tokens));

        Ok(Self {
            name: cfg.name,
            model: cfg.model,
            context_tokens,
            response_tokens,
            prompt_token_price_1k: cfg.prompt_token_price_1k,
            completion_token_price_1k: cfg.completion_token_price_1k,
            knowledge_date: cfg.knowledge_date,
            max_price,
        })
    }

    /// Cost of a completed request given the provider's usage report.
    ///
    /// With consistent limits this is always ≤ `max_price`; settlement logs
    /// (but does not reject) a violation, since it can only come from a
    /// misconfigured catalog.
    #[must_use]
    pub fn actual_cost(&self, usage: &TokenUsage) -> Decimal {
        per_1k(self.prompt_token_price_1k, usage.prompt_tokens)
            + per_1k(self.completion_token_price_1k, usage.completion_tokens)
    }
}

/// Exact `price × tokens / 1000` without divisions.
///
/// Token counts convert losslessly from `u64` and the 10⁻³ factor is a pure
/// scale shift, so the result is exact and never negative for non-negative
/// prices, whatever the provider reports.
fn per_1k(price_per_1k: Decimal, tokens: u64) -> Decimal {
    price_per_1k * Decimal::from(tokens) * Decimal::new(1, 3)
}

/// Context-size bucket derived from the model name.
///
/// Matches the size hints commonly embedded in model identifiers; unknown
/// names get the smallest bucket.
fn default_context_tokens(model: &str) -> u32 {
    let model = model.to_lowercase();
    let times = if model.contains("16k") {
        16
    } else if model.contains("32k") {
        32
    } else if model.contains("64k") {
        64
    } else if model.contains("gpt-4") {
        8
    } else {
        4
    };
    META_CONTEXT_TOKENS * times
}

/// The immutable model-choice catalog.
///
/// Built once from configuration; `resolve` looks an entry up by its
/// user-facing name.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    choices: Vec<ModelChoice>,
}

impl ModelCatalog {
    /// Build a catalog from configuration entries.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog is empty, an entry fails validation,
    /// or two entries share a name.
    pub fn new(configs: Vec<ModelChoiceConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(LedgerError::CatalogParse("catalog is empty".to_string()));
        }

        let mut choices = Vec::with_capacity(configs.len());
        for cfg in configs {
            let choice = ModelChoice::from_config(cfg)?;
            if choices.iter().any(|c: &ModelChoice| c.name == choice.name) {
                return Err(LedgerError::InvalidCatalogEntry {
                    name: choice.name,
                    reason: "duplicate name".to_string(),
                });
            }
            choices.push(choice);
        }
        Ok(Self { choices })
    }

    /// Parse a catalog from its JSON configuration form.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::CatalogParse` on malformed JSON, or any
    /// validation error from [`ModelCatalog::new`].
    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Vec<ModelChoiceConfig> =
            serde_json::from_str(json).map_err(|e| LedgerError::CatalogParse(e.to_string()))?;
        Self::new(configs)
    }

    /// Resolve a model choice by name.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownModel` when no entry matches.
    pub fn resolve(&self, name: &str) -> Result<&ModelChoice> {
        self.choices
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| LedgerError::UnknownModel {
                name: name.to_string(),
            })
    }

    /// All catalog entries, in configuration order.
    #[must_use]
    pub fn choices(&self) -> &[ModelChoice] {
        &self.choices
    }
}
