//! Keepalive ticker for WebSocket connections
//!
//! The task that owns the connection selects on [`Keepalive::tick`] next to
//! its read and command branches and writes the returned payload:
//!
//! ```text
//! ┌──────────────────────────┐
//! │  Connection task select! │
//! │                          │
//! │  read frame  ──> route   │
//! │  command     ──> write   │
//! │  keepalive   ──> ping ───┼──> WebSocket
//! └──────────────────────────┘
//! ```
//!
//! The first tick fires one full interval after the connection opens.
//! Missed ticks are skipped rather than bursted.

use crate::traits::WsMessage;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Periodic keepalive source bound to one connection
pub struct Keepalive {
    ticker: Interval,
    payload: WsMessage,
}

impl Keepalive {
    /// Keepalive that emits a transport-level ping every `interval`
    pub fn ping(interval: Duration) -> Self {
        Self::new(interval, WsMessage::Ping(Vec::new()))
    }

    pub fn new(interval: Duration, payload: WsMessage) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("Keepalive started with interval: {:?}", interval);

        Self { ticker, payload }
    }

    /// Wait for the next tick and return the payload to send
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` loop.
    pub async fn tick(&mut self) -> WsMessage {
        self.ticker.tick().await;
        debug!("Keepalive tick - sending payload");
        self.payload.clone()
    }
}
