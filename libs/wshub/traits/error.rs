use crate::core::classifier::CloseReason;
use thiserror::Error;

/// Main error type for wshub
#[derive(Error, Debug)]
pub enum WsHubError {
    /// Transport upgrade failed; the session was never created
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A message could not be serialized for delivery
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// Reading from a session transport failed
    #[error("Transport read error ({reason}): {detail}")]
    TransportRead { reason: CloseReason, detail: String },

    /// Writing to a session transport failed
    #[error("Transport write error: {0}")]
    TransportWrite(String),

    /// Outbound dial failed while reconnecting
    #[error("Reconnect attempt {attempt} failed: {reason}")]
    Reconnect { attempt: usize, reason: String },

    /// Initial outbound dial failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Channel send error (receiving side is gone)
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl WsHubError {
    /// Close reason carried by a read error, if any
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            WsHubError::TransportRead { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for wshub operations
pub type Result<T> = std::result::Result<T, WsHubError>;
