//! Gateway Metrics
//!
//! Prometheus metrics for the control channel, dispatch pipeline, and
//! event relay. The recorder is installed once at startup; the rendered
//! exposition text is served by the admin HTTP server.

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register metric descriptions.
/// Safe to call more than once; later calls are no-ops.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            describe_metrics();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
        }
    }
}

/// Render the current metrics in Prometheus exposition format.
#[must_use]
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

fn describe_metrics() {
    describe_counter!(
        "gateway_frames_received_total",
        "Text frames received on the control channel"
    );
    describe_counter!(
        "gateway_messages_sent_total",
        "Messages written to the control channel"
    );
    describe_counter!(
        "gateway_dispatches_total",
        "Order dispatches by final status"
    );
    describe_counter!(
        "gateway_reconnects_total",
        "Control channel reconnection attempts"
    );
    describe_counter!(
        "gateway_relay_dropped_total",
        "Backend events dropped by the relay, by reason"
    );
    describe_counter!(
        "gateway_backend_recycles_total",
        "Execution backend rebuilds after transient failures"
    );
    describe_counter!(
        "gateway_outbound_dropped_total",
        "Queued outbound messages discarded at epoch start"
    );
}

/// Count one received control frame.
pub fn record_frame_received() {
    counter!("gateway_frames_received_total").increment(1);
}

/// Count one sent control message.
pub fn record_message_sent() {
    counter!("gateway_messages_sent_total").increment(1);
}

/// Count one completed dispatch with its final status.
pub fn record_dispatch(status: &'static str) {
    counter!("gateway_dispatches_total", "status" => status).increment(1);
}

/// Count one reconnection attempt.
pub fn record_reconnect() {
    counter!("gateway_reconnects_total").increment(1);
}

/// Count one dropped backend event.
pub fn record_relay_dropped(reason: &'static str) {
    counter!("gateway_relay_dropped_total", "reason" => reason).increment(1);
}

/// Count one backend rebuild.
pub fn record_backend_recycle() {
    counter!("gateway_backend_recycles_total").increment(1);
}

/// Count outbound messages discarded when a new epoch begins.
pub fn record_outbound_dropped(count: u64) {
    counter!("gateway_outbound_dropped_total").increment(count);
}
