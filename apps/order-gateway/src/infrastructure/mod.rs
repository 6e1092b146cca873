//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations behind the domain and dispatch layers: the
//! control-channel WebSocket client, durable state, configuration, and
//! the operational HTTP surface.

/// Control-channel WebSocket client and protocol codec.
pub mod channel;

/// Environment-backed configuration.
pub mod config;

/// Admin HTTP endpoint (health, metrics, local order facade).
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Durable idempotency and session state.
pub mod persistence;

/// Structured logging setup.
pub mod telemetry;
