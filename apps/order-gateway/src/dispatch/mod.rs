//! Dispatch Coordination
//!
//! Bridges async command handling to the blocking execution backend.
//! Each command runs on the blocking thread pool under a bounded permit
//! set; commands carrying an idempotency key are checked against the
//! durable store before the backend is touched and recorded after it
//! accepts, so a key maps to at most one live submission.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::backend::{BackendError, ExecutionBackend};
use crate::domain::{DispatchResult, DispatchStatus, OrderCommand};
use crate::infrastructure::metrics;
use crate::infrastructure::persistence::StateStore;

/// Coordinates order dispatch against the execution backend.
pub struct DispatchCoordinator {
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn StateStore>,
    permits: Arc<Semaphore>,
    key_locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DispatchCoordinator {
    /// Create a coordinator with `worker_permits` concurrent backend calls.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn StateStore>,
        worker_permits: usize,
    ) -> Self {
        Self {
            backend,
            store,
            permits: Arc::new(Semaphore::new(worker_permits.max(1))),
            key_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch one command to completion. Never fails; every failure
    /// mode is folded into the returned result.
    pub async fn dispatch(&self, command: OrderCommand) -> DispatchResult {
        let result = self.dispatch_inner(command).await;
        metrics::record_dispatch(result.status.as_str());
        result
    }

    /// List accounts from the backend off the async runtime.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend call fails.
    pub async fn accounts(&self) -> Result<Vec<String>, BackendError> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.list_accounts())
            .await
            .map_err(|e| BackendError::Unavailable(format!("account listing task failed: {e}")))?
    }

    async fn dispatch_inner(&self, command: OrderCommand) -> DispatchResult {
        let Some(key) = command.idempotency_key.clone() else {
            return self.submit(&command, None).await;
        };

        // Fast path: already recorded, skip the lock entirely.
        match self.store.get_idempotent(&key).await {
            Ok(Some(result_id)) => return Self::replay(result_id),
            Ok(None) => {}
            Err(e) => return DispatchResult::error(format!("idempotency lookup failed: {e}")),
        }

        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            // A concurrent dispatch may have recorded the key while we
            // waited for the lock.
            match self.store.get_idempotent(&key).await {
                Ok(Some(result_id)) => Self::replay(result_id),
                Ok(None) => self.submit(&command, Some(&key)).await,
                Err(e) => DispatchResult::error(format!("idempotency lookup failed: {e}")),
            }
        };
        drop(lock);
        self.release_key_lock(&key);
        result
    }

    async fn submit(&self, command: &OrderCommand, key: Option<&str>) -> DispatchResult {
        let order = match command.validate() {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected invalid order command");
                return DispatchResult::error(e);
            }
        };

        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return DispatchResult::error("dispatch pool closed");
        };

        let backend = Arc::clone(&self.backend);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            backend.submit_order(&order)
        })
        .await;

        match outcome {
            Ok(Ok(outcome)) => {
                if let Some(key) = key {
                    if let Err(e) = self.store.put_idempotent(key, &outcome.result_id).await {
                        tracing::error!(error = %e, key, "Failed to record idempotency key");
                        return DispatchResult {
                            status: DispatchStatus::Error,
                            result_id: Some(outcome.result_id),
                            detail: format!("order submitted but idempotency record failed: {e}"),
                        };
                    }
                }
                DispatchResult {
                    status: DispatchStatus::Submitted,
                    result_id: Some(outcome.result_id),
                    detail: outcome.detail,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Backend rejected order");
                DispatchResult::error(e)
            }
            Err(e) => DispatchResult::error(format!("dispatch task failed: {e}")),
        }
    }

    fn replay(result_id: String) -> DispatchResult {
        DispatchResult {
            status: DispatchStatus::IdempotentReplay,
            result_id: Some(result_id),
            detail: "duplicate idempotency key, returning recorded result".to_string(),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn release_key_lock(&self, key: &str) {
        let mut locks = self.key_locks.lock();
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockExecutionBackend, SubmitOutcome};
    use crate::infrastructure::persistence::SqliteStateStore;
    use rust_decimal::Decimal;

    fn command(key: Option<&str>) -> OrderCommand {
        OrderCommand {
            account: Some("ACC1".to_string()),
            symbol: Some("XYZ".to_string()),
            side: Some("B".to_string()),
            quantity: Some(Decimal::new(100, 0)),
            idempotency_key: key.map(ToString::to_string),
            ..OrderCommand::default()
        }
    }

    async fn temp_store() -> (tempfile::TempDir, Arc<SqliteStateStore>) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("gateway.db").display());
        let store = SqliteStateStore::connect(&url).await.unwrap();
        (dir, Arc::new(store))
    }

    fn accepted(result_id: &str) -> SubmitOutcome {
        SubmitOutcome {
            result_id: result_id.to_string(),
            detail: "accepted".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_key_replays_without_second_backend_call() {
        let (_dir, store) = temp_store().await;
        let mut backend = MockExecutionBackend::new();
        backend
            .expect_submit_order()
            .times(1)
            .returning(|_| Ok(accepted("ord-1")));

        let coordinator = DispatchCoordinator::new(Arc::new(backend), store, 4);

        let first = coordinator.dispatch(command(Some("k1"))).await;
        assert_eq!(first.status, DispatchStatus::Submitted);
        assert_eq!(first.result_id.as_deref(), Some("ord-1"));

        let second = coordinator.dispatch(command(Some("k1"))).await;
        assert_eq!(second.status, DispatchStatus::IdempotentReplay);
        assert_eq!(second.result_id.as_deref(), Some("ord-1"));
    }

    #[tokio::test]
    async fn failed_submission_leaves_key_unrecorded() {
        let (_dir, store) = temp_store().await;
        let mut backend = MockExecutionBackend::new();
        backend
            .expect_submit_order()
            .times(1)
            .returning(|_| Err(BackendError::Unavailable("link down".to_string())));
        backend
            .expect_submit_order()
            .times(1)
            .returning(|_| Ok(accepted("ord-2")));

        let coordinator = DispatchCoordinator::new(Arc::new(backend), store, 4);

        let first = coordinator.dispatch(command(Some("k2"))).await;
        assert_eq!(first.status, DispatchStatus::Error);
        assert!(first.detail.contains("unavailable"));

        // A retry with the same key reaches the backend again.
        let second = coordinator.dispatch(command(Some("k2"))).await;
        assert_eq!(second.status, DispatchStatus::Submitted);
        assert_eq!(second.result_id.as_deref(), Some("ord-2"));
    }

    #[tokio::test]
    async fn invalid_command_never_reaches_backend() {
        let (_dir, store) = temp_store().await;
        let backend = MockExecutionBackend::new();
        let coordinator = DispatchCoordinator::new(Arc::new(backend), store, 4);

        let mut bad = command(Some("k3"));
        bad.quantity = Some(Decimal::ZERO);
        let result = coordinator.dispatch(bad).await;
        assert_eq!(result.status, DispatchStatus::Error);
        assert!(result.detail.contains("quantity"));
    }

    #[tokio::test]
    async fn concurrent_duplicates_submit_exactly_once() {
        let (_dir, store) = temp_store().await;
        let mut backend = MockExecutionBackend::new();
        backend.expect_submit_order().times(1).returning(|_| {
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(accepted("ord-3"))
        });

        let coordinator = Arc::new(DispatchCoordinator::new(Arc::new(backend), store, 4));

        let a = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.dispatch(command(Some("k4"))).await })
        };
        let b = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.dispatch(command(Some("k4"))).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let statuses = [a.status, b.status];
        assert!(statuses.contains(&DispatchStatus::Submitted));
        assert!(statuses.contains(&DispatchStatus::IdempotentReplay));
        assert_eq!(a.result_id.as_deref(), Some("ord-3"));
        assert_eq!(b.result_id.as_deref(), Some("ord-3"));
    }

    #[tokio::test]
    async fn keyless_commands_always_submit() {
        let (_dir, store) = temp_store().await;
        let mut backend = MockExecutionBackend::new();
        backend
            .expect_submit_order()
            .times(2)
            .returning(|_| Ok(accepted("ord-4")));

        let coordinator = DispatchCoordinator::new(Arc::new(backend), store, 4);

        for _ in 0..2 {
            let result = coordinator.dispatch(command(None)).await;
            assert_eq!(result.status, DispatchStatus::Submitted);
        }
    }
}
