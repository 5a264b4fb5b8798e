//! Error types for chatledger core operations.

/// Result type for chatledger core operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in quota and catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No catalog entry matches the requested model-choice name.
    #[error("unknown model choice: {name}")]
    UnknownModel {
        /// The name that did not resolve.
        name: String,
    },

    /// A catalog entry is inconsistent (limits or prices).
    #[error("invalid model choice {name}: {reason}")]
    InvalidCatalogEntry {
        /// Name of the offending entry.
        name: String,
        /// Why the entry was rejected.
        reason: String,
    },

    /// The catalog JSON could not be parsed.
    #[error("catalog parse error: {0}")]
    CatalogParse(String),
}
