//! # HyperSockets
//!
//! A small WebSocket connection layer for clients that own their own
//! protocol state machine.
//!
//! ## Features
//!
//! - **Signed handshakes**: Headers come from a `HeaderProvider` on every attempt
//! - **Split halves**: One writer serializes frames, one reader yields events
//! - **Close classification**: Normal (1000) vs abnormal endings
//! - **Keepalive**: Interval-driven ping payloads, cancel-safe in `select!`
//! - **Reconnection strategies**: Pluggable delay policies
//! - **Lock-free state**: Atomic connection state and counters

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    config, connection, connection_state, heartbeat,
    config::ConnectionConfig,
    connection::{connect, WsReader, WsWriter},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    heartbeat::Keepalive,
};

/// Type alias for Result with HyperSocketError
pub type Result<T> = std::result::Result<T, traits::HyperSocketError>;
