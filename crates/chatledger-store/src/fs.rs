//! File-backed balance storage.
//!
//! One file per identity under the quota directory, containing nothing but
//! the balance as a decimal string. The format is shared with external
//! top-up tooling: an operator credits a user by writing a new number to the
//! user's file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::BalanceStore;

/// Balance store keeping one decimal-string file per identity.
pub struct FsBalanceStore {
    dir: PathBuf,
    initial_grant: Decimal,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FsBalanceStore {
    /// Open (creating if needed) the quota directory.
    ///
    /// `initial_grant` is the balance an identity starts with before any
    /// record exists; zero unless the operator configures otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P, initial_grant: Decimal) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            initial_grant,
            locks: DashMap::new(),
        })
    }

    fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    /// Drop our lock handle and sweep the map entry once no task holds one.
    ///
    /// Without the sweep the map keeps one entry per identity for the process
    /// lifetime. A concurrent `lock_for` either already cloned the entry
    /// (strong count above one, kept) or recreates it afterwards.
    fn release(&self, identity: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(identity, |_, entry| Arc::strong_count(entry) == 1);
    }

    fn record_path(&self, identity: &str) -> Result<PathBuf> {
        validate_identity(identity)?;
        Ok(self.dir.join(identity))
    }

    /// Load the current balance. Caller must hold the identity lock.
    async fn load(&self, identity: &str) -> Result<Decimal> {
        let path = self.record_path(identity)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Decimal::from_str_exact(contents.trim()).map_err(|err| {
                tracing::error!(user = %identity, %err, "balance record is not a number");
                StoreError::Malformed {
                    identity: identity.to_string(),
                }
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(self.initial_grant),
            Err(err) => Err(err.into()),
        }
    }

    /// Load, add the delta and persist. Caller must hold the identity lock.
    async fn apply(&self, identity: &str, delta: Decimal, allow_negative: bool) -> Result<bool> {
        let current = self.load(identity).await?;
        let updated = current + delta;
        if updated < Decimal::ZERO && !allow_negative {
            return Ok(false);
        }

        let path = self.record_path(identity)?;
        tokio::fs::write(&path, updated.to_string()).await?;
        tracing::debug!(user = %identity, %delta, balance = %updated, "balance adjusted");
        Ok(true)
    }
}

#[async_trait::async_trait]
impl BalanceStore for FsBalanceStore {
    async fn read(&self, identity: &str) -> Result<Decimal> {
        let lock = self.lock_for(identity);
        let balance = {
            let _guard = lock.lock().await;
            self.load(identity).await
        };
        self.release(identity, lock);
        balance
    }

    async fn adjust(&self, identity: &str, delta: Decimal, allow_negative: bool) -> Result<bool> {
        let lock = self.lock_for(identity);
        let outcome = {
            let _guard = lock.lock().await;
            self.apply(identity, delta, allow_negative).await
        };
        self.release(identity, lock);
        outcome
    }
}

/// Reject identities that cannot safely name a file in the quota directory.
fn validate_identity(identity: &str) -> Result<()> {
    let ok = !identity.is_empty()
        && identity.len() <= 128
        && !identity.starts_with('.')
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentity(identity.to_string()))
    }
}
