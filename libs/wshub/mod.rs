//! # wshub
//!
//! A WebSocket connection hub and a reconnecting client connector.
//!
//! ## Features
//!
//! - **Single-owner registry**: one router task registers, unregisters and
//!   routes, so no lock guards the session map
//! - **Broadcast and targeted delivery**: the sender never receives its own
//!   message
//! - **Heartbeats**: pings every P, sessions silent for T are torn down
//! - **Single writer per transport**: the write loop owns the sink half
//! - **Reconnecting client**: fixed-delay retry, clean close on interrupt

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    builder, classifier, client, config, connection_state, hub, session,
    builder::{states, WsClientBuilder},
    classifier::CloseReason,
    client::{ClientEvent, ClientSender, ConnectionOutcome, Metrics, WsClient},
    config::{ClientConfig, ConfigError, DeliveryPolicy, HubConfig},
    connection_state::{ConnectionState, SessionState},
    correlation::PendingReplies,
    hub::{Hub, HubBuilder, IdentityExtractor, PathIdentity},
    interrupt::Interrupt,
    metrics::HubMetrics,
    session::{SessionHandle, SessionId},
};
