//! In-memory balance storage.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::BalanceStore;

/// Balance store backed by a concurrent in-memory map.
///
/// Used by tests and by deployments that run with quota disabled (the
/// settlement engine still needs a store to hold, it just never consults it).
/// The `DashMap` entry lock spans each read-modify-write, giving the same
/// per-identity serialization as the file backend.
#[derive(Default)]
pub struct MemoryBalanceStore {
    balances: DashMap<String, Decimal>,
    initial_grant: Decimal,
}

impl MemoryBalanceStore {
    /// Create an empty store where absent identities read as zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a configured initial grant.
    #[must_use]
    pub fn with_initial_grant(initial_grant: Decimal) -> Self {
        Self {
            balances: DashMap::new(),
            initial_grant,
        }
    }
}

#[async_trait::async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn read(&self, identity: &str) -> Result<Decimal> {
        Ok(self
            .balances
            .get(identity)
            .map_or(self.initial_grant, |entry| *entry.value()))
    }

    async fn adjust(&self, identity: &str, delta: Decimal, allow_negative: bool) -> Result<bool> {
        let mut entry = self
            .balances
            .entry(identity.to_string())
            .or_insert(self.initial_grant);
        let updated = *entry.value() + delta;
        if updated < Decimal::ZERO && !allow_negative {
            return Ok(false);
        }
        *entry.value_mut() = updated;
        Ok(true)
    }
}
