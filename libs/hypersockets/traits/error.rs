use thiserror::Error;

/// Main error type for hypersockets
#[derive(Error, Debug, Clone)]
pub enum HyperSocketError {
    /// WebSocket protocol or I/O error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Opening the connection failed (DNS, TCP, TLS or HTTP upgrade)
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Opening the connection did not finish within the connect timeout
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Header provider could not produce handshake headers
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A header name or value could not be used in the handshake request
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for hypersockets operations
pub type Result<T> = std::result::Result<T, HyperSocketError>;
