use crate::response::{ErrorResponse, ServerErrorKind};
use hypersockets::HyperSocketError;
use thiserror::Error;

/// Errors surfaced by the pub/sub client
#[derive(Error, Debug, Clone)]
pub enum PubSubError {
    /// Opening the socket or writing a frame failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A reply carried an action this client does not know
    #[error("Unhandled response action: {0}")]
    UnhandledResponse(String),

    /// The server rejected a request
    #[error("Server error: {0}")]
    Server(ErrorResponse),

    /// No connection is open and none is being re-established
    #[error("Not connected")]
    NotConnected,

    /// The connection dropped while the request was in flight
    #[error("Connection lost before a reply arrived")]
    ConnectionLost,

    /// The handle was closed
    #[error("Connection closed")]
    Closed,

    /// Permission keys could not be parsed or signed with
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl PubSubError {
    /// The server error kind, if this is a server error
    pub fn server_kind(&self) -> Option<ServerErrorKind> {
        match self {
            PubSubError::Server(response) => Some(response.kind),
            _ => None,
        }
    }

    pub fn is_server_kind(&self, kind: ServerErrorKind) -> bool {
        self.server_kind() == Some(kind)
    }
}

impl From<HyperSocketError> for PubSubError {
    fn from(err: HyperSocketError) -> Self {
        match err {
            HyperSocketError::AuthenticationFailed(reason) => PubSubError::Crypto(reason),
            other => PubSubError::Transport(other.to_string()),
        }
    }
}

/// Result type for pub/sub operations
pub type Result<T> = std::result::Result<T, PubSubError>;
