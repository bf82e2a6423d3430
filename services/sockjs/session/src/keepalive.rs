//! Liveness tracking: heartbeat scheduling and the detached-session timeout.
//!
//! A session runs two independent timers. While a listener is attached the
//! heartbeat deadline sits one `heartbeat_period` after the last traffic, so
//! every write pushes it back and a quiet listener never goes longer than one
//! period without a frame. While no listener is attached the timeout timer
//! counts down from the moment of detachment; attaching cancels it.

use std::time::Duration;
use tokio::time::Instant;

/// Per-session liveness state
#[derive(Debug, Clone)]
pub struct Liveness {
    heartbeat_period: Duration,
    timeout: Duration,
    last_activity: Instant,
    detached_since: Option<Instant>,
}

impl Liveness {
    /// Start tracking a freshly created, not yet attached session
    pub fn new(heartbeat_period: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            heartbeat_period,
            timeout,
            last_activity: now,
            detached_since: Some(now),
        }
    }

    /// Record traffic in either direction
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time of the last recorded traffic
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// A listener was attached: cancel the timeout
    pub fn attached(&mut self) {
        self.detached_since = None;
    }

    /// The listener went away: restart the timeout
    pub fn detached(&mut self) {
        self.detached_since = Some(Instant::now());
    }

    /// When the session expires, if no listener attaches before then
    pub fn timeout_deadline(&self) -> Option<Instant> {
        self.detached_since.map(|since| since + self.timeout)
    }

    /// Whether a full heartbeat period passed without traffic
    pub fn heartbeat_due(&self) -> bool {
        self.last_activity.elapsed() >= self.heartbeat_period
    }

    /// When a heartbeat is owed if nothing else is written before then
    pub fn heartbeat_deadline(&self) -> Instant {
        self.last_activity + self.heartbeat_period
    }
}

/// Sleep until `deadline`, or forever when there is none
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
