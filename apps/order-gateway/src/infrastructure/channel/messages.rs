//! Control Channel Wire Messages
//!
//! JSON-object framed messages, one object per frame, discriminated by
//! a `type` field. The inbound and outbound sets are closed; anything
//! else is a protocol error handled by the codec.

use serde::{Deserialize, Serialize};

use crate::backend::BackendEvent;
use crate::domain::{DispatchStatus, OrderCommand};

// =============================================================================
// Inbound
// =============================================================================

/// Messages the order-management service sends to the gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Order placement command.
    PlaceOrder(PlaceOrderMessage),
    /// Liveness probe; answered with `pong`.
    Ping,
    /// Session probe; answered with the current session.
    HealthCheck,
}

/// A `placeOrder` frame. The command arrives either as a nested `order`
/// object or with its fields flattened at the top level; both shapes
/// appear in the wild.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderMessage {
    /// Nested command, if the sender used the wrapped shape.
    #[serde(default)]
    pub order: Option<OrderCommand>,
    /// Flattened command fields.
    #[serde(flatten)]
    pub inline: OrderCommand,
}

impl PlaceOrderMessage {
    /// Collapse the two accepted shapes into one command. The nested
    /// object wins; a top-level `idempotencyKey` fills in for a nested
    /// command that lacks one.
    #[must_use]
    pub fn into_command(self) -> OrderCommand {
        match self.order {
            Some(mut order) => {
                if order.idempotency_key.is_none() {
                    order.idempotency_key = self.inline.idempotency_key;
                }
                order
            }
            None => self.inline,
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Messages the gateway sends upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Handshake, first message of every connection epoch.
    #[serde(rename_all = "camelCase")]
    SessionRegister {
        /// Stable session identifier.
        session_id: String,
        /// Known accounts.
        accounts: Vec<String>,
    },
    /// Acknowledgement for a dispatched `placeOrder`.
    #[serde(rename_all = "camelCase")]
    OrderAck {
        /// Echo of the command's idempotency key, if it carried one.
        idempotency_key: Option<String>,
        /// Dispatch outcome.
        status: DispatchStatus,
        /// Human-readable detail.
        details: String,
        /// Backend order id, when one exists.
        client_order_id: Option<String>,
    },
    /// Reply to `ping`.
    Pong,
    /// Reply to `healthCheck`.
    #[serde(rename_all = "camelCase")]
    Health {
        /// Current session identifier.
        session_id: String,
        /// Known accounts.
        accounts: Vec<String>,
    },
}

/// One entry on the serialized outbound queue: either a gateway message
/// or an opaque backend event relayed verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Gateway-originated message.
    Message(OutboundMessage),
    /// Backend event forwarded by the relay.
    Event(BackendEvent),
}

// =============================================================================
// Tests
// =============================================================================
