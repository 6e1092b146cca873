//! Execution Backend Port
//!
//! The gateway submits orders to an opaque, synchronous trading-platform
//! binding. Calls may block for an unspecified duration and carry no
//! cancellation contract, so they are always run on a bounded blocking
//! worker pool, never on the channel I/O path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod recycling;
pub mod sim;

pub use recycling::RecyclingBackend;
pub use sim::SimBackend;

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by an execution backend binding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend is transiently unreachable. The caller may retry with
    /// the same idempotency key; nothing was executed.
    #[error("execution backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the order.
    #[error("order rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether recycling the backend handle and retrying could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// Contract Types
// =============================================================================

/// Successful submission outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Backend-assigned order id.
    pub result_id: String,
    /// Backend status string, passed through verbatim.
    pub detail: String,
}

/// An event originating from the backend's own notification mechanism
/// (fills, order-state transitions). Forwarded verbatim, never
/// interpreted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendEvent(pub serde_json::Value);

/// Callback the backend invokes for each event. Runs on the backend's
/// own threads, outside gateway scheduling; it must never block on I/O.
pub type EventHandler = Arc<dyn Fn(BackendEvent) + Send + Sync>;

// =============================================================================
// Port
// =============================================================================

/// Blocking contract any concrete trading-platform binding must satisfy.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionBackend: Send + Sync {
    /// List the accounts known to the platform.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` if the platform is unreachable.
    fn list_accounts(&self) -> Result<Vec<String>, BackendError>;

    /// Submit a validated order. May block.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on rejection or platform unavailability.
    fn submit_order(&self, order: &crate::domain::ValidOrder)
    -> Result<SubmitOutcome, BackendError>;

    /// Register the single event callback. A later registration replaces
    /// the earlier one.
    fn register_event_handler(&self, handler: EventHandler);
}
