//! # HyperSockets Traits
//!
//! Core traits and types shared by the connection layer:
//!
//! - **HeaderProvider**: Produce handshake headers for every connection attempt
//! - **ReconnectionStrategy**: Control reconnection behavior
//! - **WsMessage / TransportEvent**: Frames and lifecycle events read from a connection

pub mod error;
pub mod headers;
pub mod message;
pub mod reconnect;

// Re-export commonly used types
pub use error::{HyperSocketError, Result};
pub use headers::{HeaderProvider, Headers, NoHeaders};
pub use message::{CloseReason, TransportEvent, WsMessage};
pub use reconnect::{FastThenPeriodic, NeverReconnect, ReconnectionStrategy};
