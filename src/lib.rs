//! Pub/sub WebSocket client
//!
//! Root package of the workspace. It re-exports the member libraries so
//! applications can depend on a single crate.
//!
//! ## Architecture
//!
//! - **pubsub**: authentication, request correlation, session handle (re-exported from workspace)
//! - **hypersockets**: WebSocket transport (re-exported from workspace)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubsub_client::pubsub::{config_path_from_env, load_keys_from_env, Client, ClientOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions::load(config_path_from_env())?;
//! let handle = Client::new(options).connect(load_keys_from_env()?).await?;
//! println!("session {:?}", handle.session_uuid());
//! # Ok(())
//! # }
//! ```

// Re-export workspace libraries for convenience
pub use hypersockets;
pub use pubsub;
