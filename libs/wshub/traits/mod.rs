//! # wshub traits
//!
//! Core traits and types shared by the hub and the client connector:
//!
//! - **Message**: the wire envelope routed by the hub
//! - **MessageCodec**: encode/decode of the envelope (JSON by default)
//! - **Hooks**: message, close, pong and log handlers injected at build time
//! - **ReconnectionStrategy**: delay policy for the client connector

pub mod codec;
pub mod error;
pub mod handlers;
pub mod message;
pub mod reconnect;

// Re-export commonly used types
pub use codec::{JsonCodec, MessageCodec};
pub use error::{Result, WsHubError};
pub use handlers::{
    ClientMessageHandler, CloseObserver, LogHandler, LogLevel, MessageReceiver, PongObserver,
    TracingLog,
};
pub use message::{Message, MessageKind, UnknownKind};
pub use reconnect::{FixedDelay, ReconnectionStrategy};
