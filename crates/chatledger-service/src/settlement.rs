//! The settlement engine.
//!
//! Wraps every chat request in quota bookkeeping: resolve the model choice,
//! reserve or gate against the balance, run the remote call, and reconcile
//! with the actual cost (or refund) once the call resolves. Every reservation
//! is resolved exactly once; a dropped settlement future still refunds via
//! the guard.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;

use chatledger_core::{ModelCatalog, ModelChoice};
use chatledger_store::{BalanceStore, StoreError};
use chatledger_upstream::{CompletionReply, UpstreamError};

use crate::config::BillingMode;

/// Failures surfaced by [`SettlementEngine::settle`].
///
/// All of these are terminal for the current request; nothing is retried
/// here. Refund-on-failure is the only compensating action.
#[derive(Debug, thiserror::Error)]
pub enum SettleError {
    /// A catalog is configured but the request named no usable model choice.
    #[error("Invalid model choice")]
    InvalidModelChoice,

    /// The balance cannot admit the request.
    #[error("{}", quota_message(.required))]
    InsufficientQuota {
        /// Reservation price the balance could not cover; zero when the
        /// post-paid positive-balance gate rejected the request.
        required: Decimal,
    },

    /// The remote call failed; any reservation has been refunded.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The balance record could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn quota_message(required: &Decimal) -> String {
    if required.is_zero() {
        "Insufficient quota, please top up first".to_string()
    } else {
        format!("Insufficient pre-deduction quota, need {required}")
    }
}

/// Orchestrates pre-authorization, the remote call, and reconciliation.
///
/// Cheap to clone; one engine is shared by all in-flight requests. Requests
/// for different identities proceed independently; only the store's
/// per-identity lock serializes anything.
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn BalanceStore>,
    catalog: Option<Arc<ModelCatalog>>,
    quota_enabled: bool,
    mode: BillingMode,
}

impl SettlementEngine {
    /// Create an engine.
    ///
    /// `quota_enabled` is the process-wide switch: when false the engine
    /// never touches the store, even with a catalog present (choices are
    /// still resolved so requests use the right model and limits).
    #[must_use]
    pub fn new(
        store: Arc<dyn BalanceStore>,
        catalog: Option<Arc<ModelCatalog>>,
        quota_enabled: bool,
        mode: BillingMode,
    ) -> Self {
        let quota_enabled = quota_enabled && catalog.is_some();
        Self {
            store,
            catalog,
            quota_enabled,
            mode,
        }
    }

    /// Current balance for an identity.
    ///
    /// # Errors
    ///
    /// Propagates store failures, including malformed balance records.
    pub async fn balance(&self, identity: &str) -> Result<Decimal, StoreError> {
        self.store.read(identity).await
    }

    /// Run one chat request under quota settlement.
    ///
    /// `request` performs the remote call once the model choice is resolved;
    /// it receives `None` when no catalog is configured. Streamed partial
    /// output is the caller's side channel and has no effect on settlement.
    ///
    /// # Errors
    ///
    /// See [`SettleError`]. `InvalidModelChoice` and `InsufficientQuota` are
    /// returned before the remote call is made and leave the balance
    /// untouched.
    pub async fn settle<F, Fut>(
        &self,
        identity: &str,
        model_choice: Option<&str>,
        request: F,
    ) -> Result<CompletionReply, SettleError>
    where
        F: FnOnce(Option<ModelChoice>) -> Fut + Send,
        Fut: Future<Output = Result<CompletionReply, UpstreamError>> + Send,
    {
        // No catalog: quota is an opt-in overlay, forward untouched.
        let Some(catalog) = self.catalog.as_deref() else {
            return request(None).await.map_err(SettleError::from);
        };

        // With a catalog configured every request must name a valid choice.
        let choice = model_choice
            .and_then(|name| catalog.resolve(name).ok())
            .cloned()
            .ok_or(SettleError::InvalidModelChoice)?;

        if !self.quota_enabled {
            return request(Some(choice)).await.map_err(SettleError::from);
        }

        match self.mode {
            BillingMode::PrePay => self.settle_prepaid(identity, choice, request).await,
            BillingMode::PostPay => self.settle_postpaid(identity, choice, request).await,
        }
    }

    /// Reserve the worst case, refund what was not consumed.
    async fn settle_prepaid<F, Fut>(
        &self,
        identity: &str,
        choice: ModelChoice,
        request: F,
    ) -> Result<CompletionReply, SettleError>
    where
        F: FnOnce(Option<ModelChoice>) -> Fut + Send,
        Fut: Future<Output = Result<CompletionReply, UpstreamError>> + Send,
    {
        let max_price = choice.max_price;
        let reserved = self.store.adjust(identity, -max_price, false).await?;
        if !reserved {
            tracing::warn!(user = %identity, required = %max_price, choice = %choice.name,
                "quota too low for reservation");
            return Err(SettleError::InsufficientQuota {
                required: max_price,
            });
        }

        let guard = RefundGuard::new(Arc::clone(&self.store), identity, max_price);

        match request(Some(choice.clone())).await {
            Ok(reply) => {
                let refund = match reply.usage.as_ref() {
                    Some(usage) => {
                        let cost = choice.actual_cost(usage);
                        if cost > max_price {
                            // Only reachable with an inconsistent pricing
                            // table; the refund below goes negative.
                            tracing::error!(user = %identity, choice = %choice.name,
                                %cost, %max_price, "actual cost exceeds reservation");
                        }
                        tracing::info!(user = %identity, choice = %choice.name, %cost,
                            "request settled");
                        max_price - cost
                    }
                    None => {
                        tracing::info!(user = %identity, choice = %choice.name,
                            "no usage reported, refunding full reservation");
                        max_price
                    }
                };
                guard.resolve(refund).await?;
                Ok(reply)
            }
            Err(err) => {
                if let Err(store_err) = guard.resolve(max_price).await {
                    // Keep the failure that triggered the refund visible.
                    tracing::error!(user = %identity, upstream_error = %err, %store_err,
                        "refund after failed call did not persist");
                    return Err(store_err.into());
                }
                Err(err.into())
            }
        }
    }

    /// Gate on a positive balance, debit the actual cost afterwards.
    ///
    /// The debit may drive the balance negative: a started conversation may
    /// finish, then the user is blocked. Nothing is adjusted on failure
    /// because nothing was reserved.
    async fn settle_postpaid<F, Fut>(
        &self,
        identity: &str,
        choice: ModelChoice,
        request: F,
    ) -> Result<CompletionReply, SettleError>
    where
        F: FnOnce(Option<ModelChoice>) -> Fut + Send,
        Fut: Future<Output = Result<CompletionReply, UpstreamError>> + Send,
    {
        let balance = self.store.read(identity).await?;
        if balance <= Decimal::ZERO {
            tracing::warn!(user = %identity, %balance, "post-paid gate rejected request");
            return Err(SettleError::InsufficientQuota {
                required: Decimal::ZERO,
            });
        }

        let reply = request(Some(choice.clone())).await?;

        if let Some(usage) = reply.usage.as_ref() {
            let cost = choice.actual_cost(usage);
            self.store.adjust(identity, -cost, true).await?;
            tracing::info!(user = %identity, choice = %choice.name, %cost, "request settled");
        }
        Ok(reply)
    }
}

/// Holds an unresolved reservation.
///
/// `resolve` settles it exactly once. If the guard is dropped instead (the
/// settle future was cancelled mid-flight) the full reservation is refunded
/// on a detached task so the hold cannot leak.
struct RefundGuard {
    store: Arc<dyn BalanceStore>,
    identity: String,
    reservation: Decimal,
    armed: bool,
}

impl RefundGuard {
    fn new(store: Arc<dyn BalanceStore>, identity: &str, reservation: Decimal) -> Self {
        Self {
            store,
            identity: identity.to_string(),
            reservation,
            armed: true,
        }
    }

    /// Apply the final signed refund and disarm.
    async fn resolve(mut self, refund: Decimal) -> Result<(), StoreError> {
        self.armed = false;
        self.store.adjust(&self.identity, refund, true).await?;
        Ok(())
    }
}

impl Drop for RefundGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = Arc::clone(&self.store);
        let identity = std::mem::take(&mut self.identity);
        let reservation = self.reservation;
        tracing::warn!(user = %identity, %reservation,
            "settlement dropped mid-flight, refunding reservation");
        tokio::spawn(async move {
            if let Err(err) = store.adjust(&identity, reservation, true).await {
                tracing::error!(user = %identity, %err, "failed to refund dropped reservation");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use rust_decimal_macros::dec;

    use chatledger_core::{ModelChoiceConfig, TokenUsage};
    use chatledger_store::MemoryBalanceStore;

    /// Store whose writes start failing after the first adjustment.
    struct FailingRefundStore {
        inner: MemoryBalanceStore,
        adjustments: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BalanceStore for FailingRefundStore {
        async fn read(&self, identity: &str) -> Result<Decimal, StoreError> {
            self.inner.read(identity).await
        }

        async fn adjust(
            &self,
            identity: &str,
            delta: Decimal,
            allow_negative: bool,
        ) -> Result<bool, StoreError> {
            if self.adjustments.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(StoreError::Malformed {
                    identity: identity.to_string(),
                });
            }
            self.inner.adjust(identity, delta, allow_negative).await
        }
    }

    /// Catalog with one choice: max price 10
    /// (5/1k × 1000 prompt-side tokens + 10/1k × 500 response tokens).
    fn catalog() -> Arc<ModelCatalog> {
        Arc::new(
            ModelCatalog::new(vec![ModelChoiceConfig {
                name: "std".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                context_tokens: Some(1500),
                response_tokens: Some(500),
                prompt_token_price_1k: dec!(5),
                completion_token_price_1k: dec!(10),
                knowledge_date: None,
            }])
            .unwrap(),
        )
    }

    async fn engine_with_balance(
        balance: Decimal,
        mode: BillingMode,
    ) -> (SettlementEngine, Arc<MemoryBalanceStore>) {
        let store = Arc::new(MemoryBalanceStore::new());
        store.adjust("alice", balance, true).await.unwrap();
        let engine = SettlementEngine::new(
            Arc::clone(&store) as Arc<dyn BalanceStore>,
            Some(catalog()),
            true,
            mode,
        );
        (engine, store)
    }

    fn reply(usage: Option<TokenUsage>) -> CompletionReply {
        CompletionReply {
            id: "cmpl-1".to_string(),
            text: "hi".to_string(),
            usage,
        }
    }

    /// 400 prompt + 100 completion tokens → cost 3 under the test catalog.
    fn usage_costing_three() -> TokenUsage {
        TokenUsage::new(400, 100)
    }

    #[tokio::test]
    async fn successful_settlement_debits_actual_cost() {
        let (engine, store) = engine_with_balance(dec!(100), BillingMode::PrePay).await;

        let result = engine
            .settle("alice", Some("std"), |_| async {
                Ok(reply(Some(usage_costing_three())))
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.read("alice").await.unwrap(), dec!(97));
    }

    #[tokio::test]
    async fn failed_call_refunds_full_reservation() {
        let (engine, store) = engine_with_balance(dec!(100), BillingMode::PrePay).await;

        let result = engine
            .settle("alice", Some("std"), |_| async {
                Err(UpstreamError::Unknown {
                    code: Some(500),
                    message: "boom".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(SettleError::Upstream(_))));
        assert_eq!(store.read("alice").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn failed_refund_surfaces_the_store_error() {
        let inner = MemoryBalanceStore::new();
        inner.adjust("alice", dec!(100), true).await.unwrap();
        let store = Arc::new(FailingRefundStore {
            inner,
            adjustments: AtomicUsize::new(0),
        });
        let engine = SettlementEngine::new(store, Some(catalog()), true, BillingMode::PrePay);

        // Reservation succeeds, the upstream call fails, the refund write
        // fails too; the store failure must come back, not vanish.
        let result = engine
            .settle("alice", Some("std"), |_| async {
                Err(UpstreamError::Unknown {
                    code: Some(500),
                    message: "boom".to_string(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(SettleError::Store(StoreError::Malformed { .. }))
        ));
    }

    #[tokio::test]
    async fn missing_usage_refunds_full_reservation() {
        let (engine, store) = engine_with_balance(dec!(100), BillingMode::PrePay).await;

        let result = engine
            .settle("alice", Some("std"), |_| async { Ok(reply(None)) })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.read("alice").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn insufficient_quota_skips_the_remote_call() {
        let (engine, store) = engine_with_balance(dec!(5), BillingMode::PrePay).await;
        let called = AtomicBool::new(false);

        let result = engine
            .settle("alice", Some("std"), |_| {
                called.store(true, Ordering::SeqCst);
                async { Ok(reply(None)) }
            })
            .await;

        match result {
            Err(SettleError::InsufficientQuota { required }) => assert_eq!(required, dec!(10)),
            other => panic!("expected insufficient quota, got {other:?}"),
        }
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(store.read("alice").await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn unknown_choice_fails_fast_without_touching_balance() {
        let (engine, store) = engine_with_balance(dec!(100), BillingMode::PrePay).await;
        let called = AtomicBool::new(false);

        let result = engine
            .settle("alice", Some("nope"), |_| {
                called.store(true, Ordering::SeqCst);
                async { Ok(reply(None)) }
            })
            .await;

        assert!(matches!(result, Err(SettleError::InvalidModelChoice)));
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(store.read("alice").await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn missing_choice_name_is_invalid_when_catalog_configured() {
        let (engine, _) = engine_with_balance(dec!(100), BillingMode::PrePay).await;
        let result = engine
            .settle("alice", None, |_| async { Ok(reply(None)) })
            .await;
        assert!(matches!(result, Err(SettleError::InvalidModelChoice)));
    }

    #[tokio::test]
    async fn no_catalog_bypasses_billing_entirely() {
        let store = Arc::new(MemoryBalanceStore::new());
        let engine = SettlementEngine::new(
            Arc::clone(&store) as Arc<dyn BalanceStore>,
            None,
            true,
            BillingMode::PrePay,
        );

        let result = engine
            .settle("alice", None, |choice| async move {
                assert!(choice.is_none());
                Ok(reply(Some(usage_costing_three())))
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.read("alice").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn quota_disabled_still_resolves_the_choice() {
        let store = Arc::new(MemoryBalanceStore::new());
        let engine = SettlementEngine::new(
            Arc::clone(&store) as Arc<dyn BalanceStore>,
            Some(catalog()),
            false,
            BillingMode::PrePay,
        );

        let result = engine
            .settle("alice", Some("std"), |choice| async move {
                assert_eq!(choice.unwrap().model, "gpt-3.5-turbo");
                Ok(reply(Some(usage_costing_three())))
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(store.read("alice").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn postpaid_may_go_negative_once_then_blocks() {
        let (engine, store) = engine_with_balance(dec!(0.01), BillingMode::PostPay).await;

        let first = engine
            .settle("alice", Some("std"), |_| async {
                Ok(reply(Some(usage_costing_three())))
            })
            .await;
        assert!(first.is_ok());
        assert_eq!(store.read("alice").await.unwrap(), dec!(-2.99));

        let called = AtomicBool::new(false);
        let second = engine
            .settle("alice", Some("std"), |_| {
                called.store(true, Ordering::SeqCst);
                async { Ok(reply(None)) }
            })
            .await;
        assert!(matches!(
            second,
            Err(SettleError::InsufficientQuota { .. })
        ));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn postpaid_failure_adjusts_nothing() {
        let (engine, store) = engine_with_balance(dec!(5), BillingMode::PostPay).await;

        let result = engine
            .settle("alice", Some("std"), |_| async {
                Err(UpstreamError::Unknown {
                    code: None,
                    message: "boom".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read("alice").await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn concurrent_reservations_admit_only_what_the_balance_covers() {
        let (engine, store) = engine_with_balance(dec!(15), BillingMode::PrePay).await;

        let settle = |engine: SettlementEngine| async move {
            engine
                .settle("alice", Some("std"), |_| async {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(reply(Some(usage_costing_three())))
                })
                .await
        };

        let (a, b, c) = tokio::join!(
            settle(engine.clone()),
            settle(engine.clone()),
            settle(engine.clone())
        );

        let results = [a, b, c];
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, SettleError::InsufficientQuota { .. }));
            }
        }
        // 15 − 3: the one accepted request paid its actual cost.
        assert_eq!(store.read("alice").await.unwrap(), dec!(12));
    }

    #[tokio::test]
    async fn dropped_settlement_refunds_via_the_guard() {
        let (engine, store) = engine_with_balance(dec!(100), BillingMode::PrePay).await;

        let task = tokio::spawn(async move {
            engine
                .settle("alice", Some("std"), |_| async {
                    futures::future::pending::<Result<CompletionReply, UpstreamError>>().await
                })
                .await
        });

        // Let the reservation land, then cancel mid-call.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.read("alice").await.unwrap(), dec!(90));
        task.abort();
        let _ = task.await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(store.read("alice").await.unwrap(), dec!(100));
    }
}
