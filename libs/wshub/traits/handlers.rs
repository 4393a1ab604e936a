//! Application hooks injected at construction
//!
//! Each hook is a trait object handed to the hub or client builder. Plain
//! closures implement the hooks too, so tests and small binaries can pass
//! `|identity: &str, payload: &str| { ... }` directly.

use crate::core::classifier::CloseReason;
use crate::traits::message::Message;
use chrono::{DateTime, Utc};
use std::fmt;

/// Severity passed to a [`LogHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Sink for lifecycle log lines emitted by the hub and the client
pub trait LogHandler: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default log handler: forwards to `tracing`
pub struct TracingLog;

impl LogHandler for TracingLog {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
    }
}

impl<F> LogHandler for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// Called by a session read loop for every inbound data frame
///
/// `payload` is the frame content as text; binary frames are converted
/// lossily. Payloads that do not decode as a [`Message`] are still passed.
pub trait MessageReceiver: Send + Sync {
    fn on_message(&self, identity: &str, payload: &str);
}

impl<F> MessageReceiver for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn on_message(&self, identity: &str, payload: &str) {
        self(identity, payload)
    }
}

/// Called once when a session's read loop terminates
pub trait CloseObserver: Send + Sync {
    fn on_close(&self, identity: &str, reason: CloseReason);
}

impl<F> CloseObserver for F
where
    F: Fn(&str, CloseReason) + Send + Sync,
{
    fn on_close(&self, identity: &str, reason: CloseReason) {
        self(identity, reason)
    }
}

/// Called when a heartbeat acknowledgment renews a session's deadline
pub trait PongObserver: Send + Sync {
    fn on_pong(&self, identity: &str, next_deadline: DateTime<Utc>);
}

impl<F> PongObserver for F
where
    F: Fn(&str, DateTime<Utc>) + Send + Sync,
{
    fn on_pong(&self, identity: &str, next_deadline: DateTime<Utc>) {
        self(identity, next_deadline)
    }
}

/// Called by the client connector for every message received from the hub
pub trait ClientMessageHandler: Send + Sync {
    fn on_message(&self, message: Message);
}

impl<F> ClientMessageHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn on_message(&self, message: Message) {
        self(message)
    }
}
