//! Simulated execution backend.
//!
//! An in-process binding that returns deterministic responses without
//! talking to a real trading platform. Used as the default binding in
//! development and by integration tests. Order ids are generated
//! sequentially starting from 1.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::json;

use crate::domain::ValidOrder;

use super::{BackendError, BackendEvent, EventHandler, ExecutionBackend, SubmitOutcome};

/// Simulated trading-platform binding.
pub struct SimBackend {
    accounts: Vec<String>,
    order_counter: AtomicU64,
    handler: RwLock<Option<EventHandler>>,
}

impl SimBackend {
    /// Create a simulator that reports the given accounts.
    #[must_use]
    pub const fn new(accounts: Vec<String>) -> Self {
        Self {
            accounts,
            order_counter: AtomicU64::new(1),
            handler: RwLock::new(None),
        }
    }

    /// Push an event through the registered handler, as the real
    /// platform's notification thread would.
    pub fn emit(&self, event: BackendEvent) {
        if let Some(handler) = self.handler.read().as_ref() {
            handler(event);
        }
    }
}

impl ExecutionBackend for SimBackend {
    fn list_accounts(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.accounts.clone())
    }

    fn submit_order(&self, order: &ValidOrder) -> Result<SubmitOutcome, BackendError> {
        let order_id = self.order_counter.fetch_add(1, Ordering::SeqCst);
        let result_id = format!("sim-{order_id}");

        self.emit(BackendEvent(json!({
            "type": "orderUpdate",
            "orderId": result_id,
            "account": order.account,
            "symbol": order.symbol,
            "side": order.side.as_str(),
            "status": "accepted",
        })));

        Ok(SubmitOutcome {
            result_id,
            detail: "accepted".to_string(),
        })
    }

    fn register_event_handler(&self, handler: EventHandler) {
        *self.handler.write() = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::{OrderKind, OrderSide};

    fn make_order() -> ValidOrder {
        ValidOrder {
            account: "ACC1".to_string(),
            symbol: "XYZ".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::new(100, 0),
            kind: OrderKind::Market,
            limit_price: None,
            time_in_force: "DAY".to_string(),
            route: "DEMO".to_string(),
        }
    }

    #[test]
    fn order_ids_are_sequential() {
        let sim = SimBackend::new(vec!["ACC1".to_string()]);
        let first = sim.submit_order(&make_order()).unwrap();
        let second = sim.submit_order(&make_order()).unwrap();
        assert_eq!(first.result_id, "sim-1");
        assert_eq!(second.result_id, "sim-2");
    }

    #[test]
    fn submit_emits_order_update_event() {
        let sim = SimBackend::new(vec!["ACC1".to_string()]);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        sim.register_event_handler(Arc::new(move |event| {
            assert_eq!(event.0["type"], "orderUpdate");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        sim.submit_order(&make_order()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lists_configured_accounts() {
        let sim = SimBackend::new(vec!["ACC1".to_string(), "ACC2".to_string()]);
        assert_eq!(sim.list_accounts().unwrap(), vec!["ACC1", "ACC2"]);
    }
}
