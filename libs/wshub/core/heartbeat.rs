//! Heartbeat timing for hub sessions
//!
//! ```text
//! write loop:  ──ping──────────ping──────────ping──▶   every P
//! read loop:   ◀─pong: deadline = now + T ─────────     T > P
//! ```
//!
//! The write loop owns the ticker and sends ping frames under the write
//! deadline W. The read loop renews its deadline on every pong. A peer that
//! stops answering is torn down once T elapses without a pong.

use crate::core::config::HubConfig;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Timing constants applied to every session of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// T: maximum silence before a session is presumed dead
    pub liveness_timeout: Duration,
    /// W: deadline for each frame write
    pub write_deadline: Duration,
    /// P: ping period, strictly less than T
    pub heartbeat_period: Duration,
}

impl SessionTiming {
    pub fn from_config(config: &HubConfig) -> Self {
        Self {
            liveness_timeout: config.liveness_timeout,
            write_deadline: config.write_deadline,
            heartbeat_period: config.heartbeat_period(),
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from_config(&HubConfig::default())
    }
}

/// Ticker for heartbeat pings
///
/// The first tick fires one full period after creation. Missed ticks are
/// skipped rather than burst.
pub fn heartbeat_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
