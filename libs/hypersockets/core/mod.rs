//! # HyperSockets core
//!
//! The connection layer: opening a WebSocket with handshake headers,
//! split read/write halves, keepalive and shared state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hypersockets::core::*;
//!
//! let config = ConnectionConfig::new("wss://api.example.com")
//!     .with_connect_timeout(Duration::from_secs(5));
//! let headers = my_provider.get_headers().await?;
//! let (mut writer, mut reader) = connection::connect(&config, &headers).await?;
//!
//! writer.send_text("hello".into()).await?;
//! match reader.next_event().await {
//!     TransportEvent::Message(msg) => println!("Frame: {:?}", msg),
//!     TransportEvent::Closed(reason) => println!("Closed: {}", reason),
//! }
//! ```

pub mod config;
pub mod connection;
pub mod connection_state;
pub mod heartbeat;

// Re-export main types
pub use config::ConnectionConfig;
pub use connection::{connect, WsReader, WsWriter};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use heartbeat::Keepalive;

// Re-export traits for convenience
pub use crate::traits::*;
