//! Order Gateway Binary
//!
//! Starts the order gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_CONTROL_URL`: WebSocket URL of the order-management service
//!
//! ## Optional
//! - `GATEWAY_AUTH_TOKEN`: Bearer token for the control channel
//! - `GATEWAY_TLS_MODE`: strict | custom-ca | insecure (default: strict)
//! - `GATEWAY_TLS_CA_FILE`: PEM CA bundle for custom-ca mode
//! - `GATEWAY_DATABASE_URL`: SQLite URL (default: sqlite://data/order-gateway.db)
//! - `GATEWAY_ADMIN_PORT`: Admin HTTP port (default: 8080)
//! - `GATEWAY_ACCOUNTS`: Comma-separated simulator accounts (default: DEMO1)
//! - `GATEWAY_WORKER_PERMITS`: Concurrent backend submissions (default: 4)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use order_gateway::infrastructure::channel::ReconnectConfig;
use order_gateway::{
    AdminServer, AdminState, ChannelState, ControlChannelClient, ControlChannelConfig,
    DispatchCoordinator, EventRelay, ExecutionBackend, GatewayConfig, RecyclingBackend,
    SimBackend, SqliteStateStore, StateStore, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[allow(clippy::expect_used)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    init_telemetry();
    init_metrics();

    tracing::info!("Starting Order Gateway");

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStateStore::connect(&config.store.database_url).await?);

    let accounts = config.accounts.clone();
    let backend: Arc<dyn ExecutionBackend> = Arc::new(RecyclingBackend::new(
        Box::new(move || Ok(Arc::new(SimBackend::new(accounts.clone())) as Arc<dyn ExecutionBackend>)),
        config.dispatch.backend_recycle_attempts,
    )?);

    let channel_state = Arc::new(ChannelState::new());
    let (outbound_tx, outbound_rx) = mpsc::channel(config.channel.outbound_capacity);

    let relay = Arc::new(EventRelay::new(
        Arc::clone(&channel_state),
        outbound_tx.clone(),
    ));
    backend.register_event_handler(relay.handler());

    let dispatcher = Arc::new(DispatchCoordinator::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        config.dispatch.worker_permits,
    ));

    // Admin HTTP server
    let admin_state = Arc::new(AdminState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&channel_state),
        Arc::clone(&dispatcher),
    ));
    let admin_server = AdminServer::new(
        config.server.admin_port,
        admin_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = admin_server.run().await {
            tracing::error!(error = %e, "Admin server error");
        }
    });

    // Control channel client
    let client = Arc::new(ControlChannelClient::new(
        ControlChannelConfig {
            url: config.control.url.clone(),
            auth_token: config.control.auth_token.clone(),
            tls: config.control.tls.clone(),
            reconnect: ReconnectConfig::from_channel_settings(&config.channel),
            stable_reset_after: config.channel.stable_reset_after,
            drain_timeout: config.channel.drain_timeout,
        },
        dispatcher,
        backend,
        store,
        channel_state,
        (outbound_tx, outbound_rx),
        shutdown_token.clone(),
    ));
    let mut client_handle = tokio::spawn(client.run());

    tracing::info!("Order gateway ready");

    tokio::select! {
        () = await_shutdown(shutdown_token.clone()) => {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut client_handle)
                .await
                .is_err()
            {
                tracing::warn!("Control channel client did not stop in time, aborting");
                client_handle.abort();
            }
        }
        result = &mut client_handle => {
            match result {
                Ok(Ok(())) => tracing::info!("Control channel client exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "Control channel client failed"),
                Err(e) => tracing::error!(error = %e, "Control channel task panicked"),
            }
            shutdown_token.cancel();
        }
    }

    tracing::info!("Order gateway stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        control_url = %config.control.url,
        admin_port = config.server.admin_port,
        worker_permits = config.dispatch.worker_permits,
        outbound_capacity = config.channel.outbound_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        database_url = %config.store.database_url,
        tls = ?config.control.tls,
        accounts = ?config.accounts,
        "Gateway details"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
