//! Error types for balance storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in balance storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored balance record exists but is not a valid decimal.
    #[error("malformed balance record for {identity}")]
    Malformed {
        /// Identity whose record is unparsable.
        identity: String,
    },

    /// The identity cannot be used as a storage key.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Backend I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
