//! Liveness deadline for a session's read side
//!
//! The deadline starts at `now + timeout` when the read loop begins and is
//! pushed forward only when a pong arrives. Data frames do not renew it.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Read deadline tracked by a session read loop
#[derive(Debug)]
pub struct LivenessDeadline {
    timeout: Duration,
    deadline: Instant,
    pongs: u64,
}

impl LivenessDeadline {
    /// Start tracking with the first deadline one timeout from now
    pub fn start(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            pongs: 0,
        }
    }

    /// Record a pong and push the deadline forward
    ///
    /// Returns the new deadline as wall-clock time for observers.
    pub fn renew(&mut self) -> DateTime<Utc> {
        self.deadline = Instant::now() + self.timeout;
        self.pongs += 1;
        let ahead =
            chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() + ahead
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn pongs(&self) -> u64 {
        self.pongs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_deadline_not_expired() {
        let liveness = LivenessDeadline::start(Duration::from_secs(15));
        assert!(!liveness.is_expired());
        assert!(liveness.remaining() > Duration::from_secs(14));
        assert_eq!(liveness.pongs(), 0);
    }

    #[tokio::test]
    async fn test_expires_without_pong() {
        let liveness = LivenessDeadline::start(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(liveness.is_expired());
        assert_eq!(liveness.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_renew_pushes_deadline() {
        let mut liveness = LivenessDeadline::start(Duration::from_millis(50));
        let first = liveness.deadline();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let before = Utc::now();
        let wall_clock = liveness.renew();

        assert!(liveness.deadline() > first);
        assert!(wall_clock > before);
        assert_eq!(liveness.pongs(), 1);
    }
}
