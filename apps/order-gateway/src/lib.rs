#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Order Gateway - Control Channel to Execution Backend Bridge
//!
//! Maintains a single persistent WebSocket connection to a remote
//! order-management service and executes the order commands it sends
//! against a blocking trade-execution backend, acknowledging each one
//! with a durable idempotency guarantee.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Order commands, validation, sessions, dispatch results
//! - **Backend**: The synchronous execution-backend port, a simulator
//!   binding, and a self-recycling wrapper for transient failures
//! - **Dispatch**: Idempotent coordination between async commands and
//!   the blocking backend
//! - **Relay**: Fire-and-forget forwarding of backend events upstream
//! - **Infrastructure**: WebSocket channel, `SQLite` state, config,
//!   metrics, and the admin HTTP surface
//!
//! # Data Flow
//!
//! ```text
//! order-management service
//!        |  (WebSocket, JSON)
//!        v
//!  ControlChannelClient --> DispatchCoordinator --> ExecutionBackend
//!        ^                        |
//!        |                        v
//!   outbound queue <-------- acknowledgements
//!        ^
//!        |
//!    EventRelay <-------- backend events
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order commands, validation, and sessions.
pub mod domain;

/// Execution backend port and bindings.
pub mod backend;

/// Idempotent dispatch coordination.
pub mod dispatch;

/// Backend event relay.
pub mod relay;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    DispatchResult, DispatchStatus, OrderCommand, OrderKind, OrderSide, Session, ValidOrder,
    ValidationError,
};

// Backend port
pub use backend::{
    BackendError, BackendEvent, EventHandler, ExecutionBackend, RecyclingBackend, SimBackend,
    SubmitOutcome,
};

// Dispatch
pub use dispatch::DispatchCoordinator;

// Relay
pub use relay::EventRelay;

// Control channel (for integration tests)
pub use infrastructure::channel::{
    ChannelError, ChannelPhase, ChannelState, ControlChannelClient, ControlChannelConfig,
    InboundMessage, JsonCodec, Outbound, OutboundMessage, ReconnectConfig, ReconnectPolicy,
    TlsMode,
};

// Infrastructure config
pub use infrastructure::config::{
    AuthToken, ChannelSettings, ConfigError, ControlSettings, DispatchSettings, GatewayConfig,
    ServerSettings, StoreSettings,
};

// Persistence
pub use infrastructure::persistence::{SqliteStateStore, StateStore, StoreError};

// Admin server
pub use infrastructure::http::{AdminServer, AdminServerError, AdminState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::init_telemetry;
