//! Backend handle recycling.
//!
//! Some platform bindings wedge their connection object on transient
//! faults and only recover once the handle is rebuilt. `RecyclingBackend`
//! wraps any binding behind a factory: on a transient-unavailable signal
//! it discards the current handle, builds a fresh one, re-registers the
//! event handler, and retries a bounded number of times before surfacing
//! `BackendError::Unavailable` to the dispatcher.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::ValidOrder;
use crate::infrastructure::metrics;

use super::{BackendError, EventHandler, ExecutionBackend, SubmitOutcome};

/// Builds a fresh backend handle.
pub type BackendFactory =
    Box<dyn Fn() -> Result<Arc<dyn ExecutionBackend>, BackendError> + Send + Sync>;

/// Recycle-and-retry wrapper around an execution backend binding.
pub struct RecyclingBackend {
    factory: BackendFactory,
    inner: RwLock<Arc<dyn ExecutionBackend>>,
    handler: RwLock<Option<EventHandler>>,
    recycle_attempts: u32,
}

impl RecyclingBackend {
    /// Create a wrapper around an initial handle built by `factory`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the initial handle cannot be built.
    pub fn new(factory: BackendFactory, recycle_attempts: u32) -> Result<Self, BackendError> {
        let initial = factory()?;
        Ok(Self {
            factory,
            inner: RwLock::new(initial),
            handler: RwLock::new(None),
            recycle_attempts,
        })
    }

    fn current(&self) -> Arc<dyn ExecutionBackend> {
        Arc::clone(&self.inner.read())
    }

    fn recycle(&self) -> Result<(), BackendError> {
        let fresh = (self.factory)()?;
        if let Some(handler) = self.handler.read().clone() {
            fresh.register_event_handler(handler);
        }
        *self.inner.write() = fresh;
        metrics::record_backend_recycle();
        Ok(())
    }

    fn with_retries<T>(
        &self,
        operation: &str,
        call: impl Fn(&dyn ExecutionBackend) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut attempt: u32 = 0;
        loop {
            let backend = self.current();
            match call(backend.as_ref()) {
                Err(e) if e.is_transient() && attempt < self.recycle_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %e,
                        "Backend unavailable, recycling handle"
                    );
                    self.recycle()?;
                }
                other => return other,
            }
        }
    }
}

impl ExecutionBackend for RecyclingBackend {
    fn list_accounts(&self) -> Result<Vec<String>, BackendError> {
        self.with_retries("list_accounts", |backend| backend.list_accounts())
    }

    fn submit_order(&self, order: &ValidOrder) -> Result<SubmitOutcome, BackendError> {
        self.with_retries("submit_order", |backend| backend.submit_order(order))
    }

    fn register_event_handler(&self, handler: EventHandler) {
        *self.handler.write() = Some(handler.clone());
        self.current().register_event_handler(handler);
    }
}
