//! Control Channel Codec
//!
//! One JSON object per frame. Decoding inspects the `type` discriminator
//! before full deserialization so that an unknown type is reported as
//! such (logged and dropped by the client, never a closed connection)
//! rather than as a generic parse failure.

use super::messages::{InboundMessage, Outbound, OutboundMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame carried a type outside the closed inbound set.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Frame is not a JSON object with a string `type` field.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for control-channel frames.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMessageType` for a well-formed object with an
    /// unrecognized type, and `InvalidFormat`/`Json` for malformed
    /// frames.
    pub fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let msg_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CodecError::InvalidFormat("missing type field".to_string()))?;

        match msg_type {
            "placeOrder" | "ping" | "healthCheck" => Ok(serde_json::from_value(value)?),
            other => Err(CodecError::UnknownMessageType(other.to_string())),
        }
    }

    /// Encode a gateway message to a JSON frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &OutboundMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encode one outbound queue entry. Backend events are passed
    /// through verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_outbound(&self, outbound: &Outbound) -> Result<String, CodecError> {
        match outbound {
            Outbound::Message(message) => self.encode(message),
            Outbound::Event(event) => Ok(serde_json::to_string(event)?),
        }
    }
}
