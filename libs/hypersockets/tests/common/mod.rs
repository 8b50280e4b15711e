//! Common test utilities for HyperSockets integration tests
//!
//! This module provides a mock WebSocket server that echoes frames and
//! records what the client sent during the handshake and at close time.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the server observed from its clients
#[derive(Default)]
pub struct Observed {
    /// Handshake headers per accepted connection, lowercase names
    pub handshakes: Vec<HashMap<String, String>>,
    /// Close codes received from clients (None = close frame without status)
    pub close_codes: Vec<Option<u16>>,
}

/// A simple mock WebSocket server for testing
///
/// Echoes text and binary frames. The text frame `"close-away"` makes the
/// server close the connection with code 1001.
pub struct MockWsServer {
    pub addr: SocketAddr,
    pub observed: Arc<Mutex<Observed>>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let observed = Arc::new(Mutex::new(Observed::default()));

        let shutdown_clone = shutdown.clone();
        let observed_clone = observed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let observed = observed_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, observed, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            observed,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        observed: Arc<Mutex<Observed>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
        use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        use tokio_tungstenite::tungstenite::Message;

        let handshake_observed = observed.clone();
        let callback = move |req: &Request, resp: Response| {
            let headers = req
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_lowercase(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            handshake_observed.lock().unwrap().handshakes.push(headers);
            Ok(resp)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) if text == "close-away" => {
                            let frame = CloseFrame {
                                code: CloseCode::Away,
                                reason: "going away".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            break;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            observed.lock().unwrap().close_codes.push(code);
                            break;
                        }
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_ping() {
                                let pong = Message::Pong(msg.into_data());
                                if write.send(pong).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Test fixture for connection states
pub mod fixtures {
    use hypersockets::core::connection_state::{AtomicConnectionState, ConnectionState};

    pub fn disconnected_state() -> AtomicConnectionState {
        AtomicConnectionState::new(ConnectionState::Disconnected)
    }

    pub fn open_state() -> AtomicConnectionState {
        AtomicConnectionState::new(ConnectionState::Open)
    }
}
