//! Lock-free connection state and counters
//!
//! Both types are shared between the task that owns a connection and any
//! number of readers, using plain atomics.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection and none being attempted
    Disconnected = 0,
    /// First connection attempt in progress
    Connecting = 1,
    /// Connection established
    Open = 2,
    /// Connection dropped, reconnection in progress
    Reconnecting = 3,
    /// Graceful shutdown requested
    Closing = 4,
    /// Shut down for good
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Closing,
            5 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Move to `next` unless the current state is `Closing` or `Closed`
    ///
    /// Returns false if the state was left untouched.
    pub fn set_unless_closed(&self, next: ConnectionState) -> bool {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ConnectionState::from_u8(current) {
                    ConnectionState::Closing | ConnectionState::Closed => None,
                    _ => Some(next as u8),
                }
            })
            .is_ok()
    }
}

/// Frame and reconnect counters
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_every_state() {
        let state = AtomicConnectionState::new(ConnectionState::Disconnected);
        for s in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Reconnecting,
            ConnectionState::Closing,
            ConnectionState::Closed,
            ConnectionState::Disconnected,
        ] {
            state.set(s);
            assert_eq!(state.get(), s);
        }
    }

    #[test]
    fn test_set_unless_closed() {
        let state = AtomicConnectionState::new(ConnectionState::Open);
        assert!(state.set_unless_closed(ConnectionState::Reconnecting));
        assert_eq!(state.get(), ConnectionState::Reconnecting);

        state.set(ConnectionState::Closing);
        assert!(!state.set_unless_closed(ConnectionState::Open));
        assert_eq!(state.get(), ConnectionState::Closing);
    }
}
