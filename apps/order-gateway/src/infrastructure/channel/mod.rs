//! Control Channel
//!
//! WebSocket client for the order-management service: JSON codec,
//! reconnect policy, TLS modes, connection state, and the client loop.

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod state;
pub mod tls;

pub use client::{ChannelError, ControlChannelClient, ControlChannelConfig};
pub use codec::{CodecError, JsonCodec};
pub use messages::{InboundMessage, Outbound, OutboundMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{ChannelPhase, ChannelState};
pub use tls::{TlsError, TlsMode};
