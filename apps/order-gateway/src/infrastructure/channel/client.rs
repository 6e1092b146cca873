//! Control Channel Client
//!
//! Owns the connection lifecycle to the order-management service:
//! connect (with configurable TLS), register the session before anything
//! else, dispatch inbound commands, drive the serialized outbound queue,
//! and reconnect with exponential backoff on any transport failure.
//!
//! # Epochs
//!
//! Each established connection is one epoch. The first outbound message
//! of an epoch is always `sessionRegister`; outbound messages enqueued
//! in a prior epoch and never sent are dropped at the start of the next
//! one (idempotency keys make the upstream re-send safe). Within an
//! epoch, wire order equals enqueue order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use crate::backend::ExecutionBackend;
use crate::dispatch::DispatchCoordinator;
use crate::domain::Session;
use crate::infrastructure::config::AuthToken;
use crate::infrastructure::metrics;
use crate::infrastructure::persistence::StateStore;

use super::codec::{CodecError, JsonCodec};
use super::messages::{InboundMessage, Outbound, OutboundMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ChannelPhase, ChannelState};
use super::tls::{TlsError, TlsMode};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the control-channel client.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Codec error on an outbound message.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the control-channel client.
#[derive(Debug, Clone)]
pub struct ControlChannelConfig {
    /// WebSocket URL of the order-management service.
    pub url: String,
    /// Bearer token sent in the `Authorization` header, if required.
    pub auth_token: Option<AuthToken>,
    /// TLS verification mode.
    pub tls: TlsMode,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
    /// Active period after which the backoff resets to its floor.
    pub stable_reset_after: Duration,
    /// How long to spend flushing queued outbound messages on shutdown.
    pub drain_timeout: Duration,
}

// =============================================================================
// Client
// =============================================================================

/// Control-channel WebSocket client.
///
/// Exactly one logical connection exists at a time. All outbound traffic
/// (acknowledgements, relayed backend events, protocol replies) flows
/// through one queue so wire ordering matches enqueue ordering.
pub struct ControlChannelClient {
    config: ControlChannelConfig,
    codec: JsonCodec,
    dispatcher: Arc<DispatchCoordinator>,
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn StateStore>,
    state: Arc<ChannelState>,
    outbound_tx: mpsc::Sender<Outbound>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<Outbound>>,
    cancel: CancellationToken,
}

impl ControlChannelClient {
    /// Create a new client. `outbound` is the shared queue whose sender
    /// side is also held by the event relay.
    #[must_use]
    pub fn new(
        config: ControlChannelConfig,
        dispatcher: Arc<DispatchCoordinator>,
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn StateStore>,
        state: Arc<ChannelState>,
        outbound: (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>),
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            dispatcher,
            backend,
            store,
            state,
            outbound_tx: outbound.0,
            outbound_rx: tokio::sync::Mutex::new(outbound.1),
            cancel,
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::MaxReconnectAttemptsExceeded` if the
    /// reconnect budget is exhausted; all other transport errors are
    /// retried internally.
    pub async fn run(self: Arc<Self>) -> Result<(), ChannelError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Control channel client cancelled");
                return Ok(());
            }

            let mut active_at: Option<Instant> = None;
            match self.connect_and_run(&mut active_at).await {
                Ok(()) => {
                    self.state.set_phase(ChannelPhase::Disconnected);
                    tracing::info!("Control channel closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    self.state.set_phase(ChannelPhase::Disconnected);
                    tracing::warn!(error = %e, "Control channel error");

                    if active_at.is_some_and(|t| t.elapsed() >= self.config.stable_reset_after) {
                        policy.reset();
                    }

                    if let Some(delay) = policy.next_delay() {
                        let attempt = policy.attempt_count();
                        self.state.increment_reconnect_attempts();
                        metrics::record_reconnect();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to control channel"
                        );

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        return Err(ChannelError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// Establish one connection epoch and run it until error or
    /// cancellation. Sets `active_at` once the handshake is on the wire.
    async fn connect_and_run(&self, active_at: &mut Option<Instant>) -> Result<(), ChannelError> {
        self.state.set_phase(ChannelPhase::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to control channel");

        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()?;
        if let Some(token) = &self.config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.reveal()))
                .map_err(|e| ChannelError::ConnectionFailed(format!("invalid auth token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let connector = super::tls::build_connector(&self.config.tls)?;
        let (ws_stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
                .await?;
        let (mut write, mut read) = ws_stream.split();

        self.state.set_phase(ChannelPhase::Handshaking);

        // Messages queued in a prior epoch must not precede this epoch's
        // registration on the wire.
        let mut rx = self.outbound_rx.lock().await;
        let mut stale = 0_u64;
        while rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            metrics::record_outbound_dropped(stale);
            tracing::warn!(count = stale, "Dropped outbound messages from prior epoch");
        }

        let session = self.refresh_session().await;
        let register = OutboundMessage::SessionRegister {
            session_id: session.session_id.clone(),
            accounts: session.accounts.clone(),
        };
        write
            .send(Message::Text(self.codec.encode(&register)?.into()))
            .await?;
        metrics::record_message_sent();

        self.state.set_session(session);
        self.state.set_phase(ChannelPhase::Active);
        *active_at = Some(Instant::now());
        tracing::info!("Control channel active");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let drained = tokio::time::timeout(self.config.drain_timeout, async {
                        while let Ok(outbound) = rx.try_recv() {
                            match self.codec.encode_outbound(&outbound) {
                                Ok(text) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                    metrics::record_message_sent();
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to encode outbound during drain");
                                }
                            }
                        }
                    })
                    .await;
                    if drained.is_err() {
                        tracing::warn!("Outbound drain timed out during shutdown");
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                outbound = rx.recv() => {
                    if let Some(outbound) = outbound {
                        // A message that fails to encode is skipped, not
                        // allowed to fail the epoch.
                        match self.codec.encode_outbound(&outbound) {
                            Ok(text) => {
                                write.send(Message::Text(text.into())).await?;
                                metrics::record_message_sent();
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to encode outbound message, skipping");
                            }
                        }
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.state.increment_frames();
                            metrics::record_frame_received();
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(ChannelError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore other transport frame types
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(ChannelError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Handle one inbound frame. A bad frame never takes down the
    /// connection; dispatch runs off this task so a slow backend call
    /// never stalls frame delivery.
    fn handle_frame(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(InboundMessage::Ping) => {
                self.enqueue(Outbound::Message(OutboundMessage::Pong));
            }
            Ok(InboundMessage::HealthCheck) => {
                let (session_id, accounts) = self
                    .state
                    .session()
                    .map(|s| (s.session_id, s.accounts))
                    .unwrap_or_default();
                self.enqueue(Outbound::Message(OutboundMessage::Health {
                    session_id,
                    accounts,
                }));
            }
            Ok(InboundMessage::PlaceOrder(place)) => {
                let command = place.into_command();
                let key = command.idempotency_key.clone();
                let dispatcher = Arc::clone(&self.dispatcher);
                let tx = self.outbound_tx.clone();
                tokio::spawn(async move {
                    let result = dispatcher.dispatch(command).await;
                    let ack = OutboundMessage::OrderAck {
                        idempotency_key: key,
                        status: result.status,
                        details: result.detail,
                        client_order_id: result.result_id,
                    };
                    if tx.send(Outbound::Message(ack)).await.is_err() {
                        tracing::debug!("Outbound queue closed, dropping acknowledgement");
                    }
                });
            }
            Err(CodecError::UnknownMessageType(message_type)) => {
                tracing::warn!(message_type, "Dropping unrecognized control message");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed control frame");
            }
        }
    }

    /// Queue a protocol reply. Uses `try_send`: this runs on the same
    /// task that drains the queue, so it must never wait for space.
    fn enqueue(&self, outbound: Outbound) {
        match self.outbound_tx.try_send(outbound) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::record_outbound_dropped(1);
                tracing::warn!("Outbound queue full, dropping protocol reply");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Outbound queue closed");
            }
        }
    }

    /// Build this epoch's session: stable id from the store (minted on
    /// first run), accounts listed fresh from the backend with the
    /// stored set as fallback.
    async fn refresh_session(&self) -> Session {
        let stored = match self.store.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored session");
                None
            }
        };

        let session_id = stored.as_ref().map_or_else(
            || uuid::Uuid::new_v4().to_string(),
            |s| s.session_id.clone(),
        );

        let backend = Arc::clone(&self.backend);
        let accounts = match tokio::task::spawn_blocking(move || backend.list_accounts()).await {
            Ok(Ok(accounts)) => Some(accounts),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Account listing failed, using stored accounts");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Account listing task failed");
                None
            }
        };
        let accounts = accounts
            .or_else(|| stored.map(|s| s.accounts))
            .unwrap_or_default();

        let session = Session::new(session_id, accounts);
        if let Err(e) = self.store.set_session(&session).await {
            tracing::warn!(error = %e, "Failed to persist session");
        }
        session
    }
}
