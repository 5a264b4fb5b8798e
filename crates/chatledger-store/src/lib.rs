//! Balance persistence for chatledger.
//!
//! This crate provides durable per-user balance storage. A balance is a single
//! decimal value keyed by user identity; all mutations go through
//! [`BalanceStore::adjust`], a serialized read-modify-write.
//!
//! Two backends are provided:
//!
//! - [`FsBalanceStore`]: one plain-text decimal file per identity. This is the
//!   production layout; values round-trip exactly.
//! - [`MemoryBalanceStore`]: in-memory map for tests and quota-less
//!   deployments.
//!
//! # Concurrency
//!
//! `adjust` holds a per-identity lock for the whole load/add/persist sequence.
//! Two concurrent adjustments of the same identity therefore serialize, and a
//! rejected adjustment (would go negative with `allow_negative == false`)
//! leaves the stored value untouched.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod fs;
pub mod memory;

pub use error::{Result, StoreError};
pub use fs::FsBalanceStore;
pub use memory::MemoryBalanceStore;

use rust_decimal::Decimal;

/// The balance storage trait.
///
/// Abstracts the persistence layer so the settlement engine can run against
/// the file backend in production and the in-memory backend in tests.
#[async_trait::async_trait]
pub trait BalanceStore: Send + Sync {
    /// Read the current balance for an identity.
    ///
    /// An identity with no stored record reads as the store's configured
    /// initial grant (zero unless the operator set one). A record that exists
    /// but does not parse is an error, never a default; a silent zero would
    /// grant free quota on the next top-up.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Malformed` for unparsable records,
    /// `StoreError::InvalidIdentity` for identities that cannot form a key,
    /// or `StoreError::Io` for backend failures.
    async fn read(&self, identity: &str) -> Result<Decimal>;

    /// Atomically add `delta` (signed) to the identity's balance.
    ///
    /// Returns `Ok(false)` without persisting anything when the result would
    /// be negative and `allow_negative` is false; `Ok(true)` when the new
    /// value was persisted.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`BalanceStore::read`].
    async fn adjust(&self, identity: &str, delta: Decimal, allow_negative: bool) -> Result<bool>;
}
