//! Integration test: Configuration utilities
//!
//! Tests config path resolution and loading through the root crate.

use pubsub_client::pubsub::{config_path_from_env, ClientOptions, ConfigError};
use std::env;
use std::io::Write;

#[test]
fn test_config_path_default_and_override() {
    // Both cases in one test: env vars are process-wide
    env::remove_var("PUBSUB_CONFIG_PATH");
    let config_path = config_path_from_env();
    assert_eq!(config_path.to_str().unwrap(), "config.yaml");

    env::set_var("PUBSUB_CONFIG_PATH", "custom/path.yaml");
    let config_path = config_path_from_env();
    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");

    env::remove_var("PUBSUB_CONFIG_PATH");
}

#[test]
fn test_load_from_file() {
    env::remove_var("PUBSUB_URL");
    env::remove_var("PUBSUB_SESSION_UUID");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "url: wss://pubsub.example.com/ws").unwrap();
    writeln!(file, "fast_retry_attempts: 3").unwrap();

    let options = ClientOptions::load(file.path()).unwrap();
    assert_eq!(options.url, "wss://pubsub.example.com/ws");
    assert_eq!(options.fast_retry_attempts, 3);
    assert!(options.auto_reconnect);
}

#[test]
fn test_load_rejects_invalid_url() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "url: https://pubsub.example.com").unwrap();

    env::remove_var("PUBSUB_URL");
    assert!(matches!(
        ClientOptions::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}
