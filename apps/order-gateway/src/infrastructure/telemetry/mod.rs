//! Telemetry
//!
//! Structured logging setup. The filter comes from `RUST_LOG` and
//! defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber. Safe to call more than
/// once; later calls are no-ops.
pub fn init_telemetry() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_telemetry();
        init_telemetry();
        tracing::info!("telemetry initialized");
    }
}
