use crate::traits::error::{Result, WsHubError};
use crate::traits::message::Message;

/// Trait for turning messages into frame payloads and back
///
/// The router encodes each pushed message exactly once and hands the same
/// payload to every recipient, so `encode` should be deterministic.
pub trait MessageCodec: Send + Sync + 'static {
    /// Serialize a message into a text frame payload
    fn encode(&self, message: &Message) -> Result<String>;

    /// Parse a text frame payload into a message
    fn decode(&self, payload: &str) -> Result<Message>;
}

/// JSON codec matching the wire envelope
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String> {
        serde_json::to_string(message).map_err(|e| WsHubError::Marshal(e.to_string()))
    }

    fn decode(&self, payload: &str) -> Result<Message> {
        serde_json::from_str(payload).map_err(|e| WsHubError::Other(format!("decode: {}", e)))
    }
}
