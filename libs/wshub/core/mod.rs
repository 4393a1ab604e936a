//! # wshub core
//!
//! Hub side: [`hub::Hub`] owns the session registry through a single router
//! task and fans out messages to per-session outbound queues. Each session
//! runs a read loop (liveness deadline renewed by pongs) and a write loop
//! (payloads plus periodic pings under a write deadline).
//!
//! Client side: [`client::WsClient`] dials one session, reconnects after a
//! fixed period when the connection drops, and closes cleanly on interrupt.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wshub::{Hub, HubConfig, Message, PathIdentity};
//!
//! let hub = Hub::builder()
//!     .config(HubConfig::default())
//!     .message_receiver(|identity: &str, payload: &str| {
//!         println!("{} sent {}", identity, payload);
//!     })
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8881").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let hub = hub.clone();
//!     tokio::spawn(async move {
//!         if let Err(e) = hub.register_with(stream, &PathIdentity::default()).await {
//!             eprintln!("rejected: {}", e);
//!         }
//!     });
//! }
//! ```

pub mod builder;
pub mod classifier;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod correlation;
pub mod heartbeat;
pub mod hub;
pub mod interrupt;
pub mod liveness;
pub mod metrics;
pub mod session;

// Re-export main types
pub use builder::{states, WsClientBuilder};
pub use classifier::{classify, classify_io, CloseReason};
pub use client::{ClientEvent, ClientSender, ConnectionOutcome, Metrics, WsClient};
pub use config::{ClientConfig, ConfigError, DeliveryPolicy, HubConfig};
pub use connection_state::{
    AtomicConnectionState, AtomicSessionState, ConnectionState, SessionState,
};
pub use correlation::PendingReplies;
pub use heartbeat::SessionTiming;
pub use hub::{Hub, HubBuilder, IdentityExtractor, PathIdentity};
pub use interrupt::Interrupt;
pub use metrics::{AtomicMetrics, HubMetrics};
pub use session::{SessionHandle, SessionId};

// Re-export traits for convenience
pub use crate::traits::*;
