//! Pub/sub WebSocket client
//!
//! Authenticates with scoped permission keys, subscribes to channels,
//! publishes (optionally waiting for the server's acknowledgment) and keeps
//! the session alive across network failures by reconnecting, resuming the
//! server session and resubscribing.
//!
//! ## Architecture
//!
//! - **auth**: permission keys and the signed handshake headers
//! - **request** / **response**: wire frames and inbound classification
//! - **socket**: connection driver, request correlation, reconnect loop
//! - **handle**: public session object and callback dispatcher
//! - **client**: entry point that opens handles
//! - **config** / **logging**: YAML + env configuration, tracing setup

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod logging;
pub mod request;
pub mod response;
pub mod session;
pub mod socket;
pub mod subscriptions;

// Re-export commonly used items
pub use auth::{AuthMaterial, PermissionKey, PermissionKeys, Role};
pub use client::Client;
pub use config::{config_path_from_env, load_keys_from_env, ClientOptions, ConfigError};
pub use error::{PubSubError, Result};
pub use handle::Handle;
pub use hypersockets::{CloseReason, ConnectionState};
pub use logging::{init_tracing, init_tracing_with_level};
pub use response::{ErrorResponse, MessageRecord, Response, ServerErrorKind};
pub use socket::Metrics;
