//! Common test utilities for pub/sub integration tests
//!
//! Provides a mock pub/sub server that checks the signed handshake, keeps
//! per-connection subscriptions, enforces role permissions and fans
//! published messages out to subscribers.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{SecondsFormat, Utc};
use pubsub::auth::{sign_payload, PermissionKeys};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

pub const READ_KEY: &str = "R-alice-00112233445566778899aabbccddeeff";
pub const WRITE_KEY: &str = "W-alice-ffeeddccbbaa99887766554433221100";
pub const ADMIN_KEY: &str = "A-alice-0f1e2d3c4b5a69788796a5b4c3d2e1f0";
/// Same identity and role as `WRITE_KEY`, different secret
pub const FORGED_WRITE_KEY: &str = "W-alice-0000000000000000000000000000beef";

pub fn all_keys() -> Vec<&'static str> {
    vec![READ_KEY, WRITE_KEY, ADMIN_KEY]
}

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

struct Connection {
    session: Uuid,
    permissions: String,
    channels: BTreeSet<String>,
    outbox: mpsc::UnboundedSender<Message>,
}

/// Everything the server knows and has seen
#[derive(Default)]
pub struct ServerState {
    known_keys: HashMap<char, String>,
    sessions: BTreeSet<Uuid>,
    connections: HashMap<u64, Connection>,
    next_connection: u64,
    /// When false every handshake gets a fresh session
    pub resume_sessions: bool,
    /// Session UUID each accepted handshake asked to resume
    pub requested_sessions: Vec<Option<Uuid>>,
    pub rejected_handshakes: usize,
    /// Fail every handshake with 401
    pub reject_all: bool,
    /// Every text frame received, in order
    pub received: Vec<Value>,
    /// Record requests but never answer them
    pub hold_replies: bool,
    /// Ping frames received across all connections
    pub pings: usize,
    /// Wait this long before answering the WebSocket upgrade
    pub handshake_delay: Duration,
}

struct Claims {
    permissions: String,
    session: Option<Uuid>,
}

/// Mock pub/sub server on 127.0.0.1
pub struct MockPubSubServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<ServerState>>,
    shutdown: Arc<Notify>,
}

impl MockPubSubServer {
    /// Start a server that accepts `READ_KEY`, `WRITE_KEY` and `ADMIN_KEY`
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());

        let mut state = ServerState {
            resume_sessions: true,
            ..Default::default()
        };
        for key in all_keys() {
            let role = key.chars().next().unwrap();
            state.known_keys.insert(role, key.to_string());
        }
        let state = Arc::new(Mutex::new(state));

        let shutdown_clone = shutdown.clone();
        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let state = state_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, state, shutdown).await;
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
            state,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        state: Arc<Mutex<ServerState>>,
        shutdown: Arc<Notify>,
    ) {
        use futures::{SinkExt, StreamExt};

        let delay = state.lock().unwrap().handshake_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let verify_state = state.clone();
        let mut claims = None;
        let claims_slot = &mut claims;
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let mut state = verify_state.lock().unwrap();
            let verified = if state.reject_all {
                Err("server is rejecting connections".to_string())
            } else {
                verify(req, &state.known_keys)
            };
            match verified {
                Ok(verified) => {
                    state.requested_sessions.push(verified.session);
                    *claims_slot = Some(verified);
                    Ok(resp)
                }
                Err(reason) => {
                    state.rejected_handshakes += 1;
                    let mut rejection = http::Response::new(Some(reason));
                    *rejection.status_mut() = http::StatusCode::UNAUTHORIZED;
                    Err(rejection)
                }
            }
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };
        let Some(claims) = claims else { return };

        let (outbox, mut outgoing) = mpsc::unbounded_channel();
        let connection_id = {
            let mut state = state.lock().unwrap();
            let session = match claims.session {
                Some(session) if state.resume_sessions && state.sessions.contains(&session) => session,
                _ => Uuid::new_v4(),
            };
            state.sessions.insert(session);
            let id = state.next_connection;
            state.next_connection += 1;
            state.connections.insert(
                id,
                Connection {
                    session,
                    permissions: claims.permissions,
                    channels: BTreeSet::new(),
                    outbox,
                },
            );
            id
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_frame(&state, connection_id, &text);
                        }
                        Some(Ok(Message::Ping(_))) => {
                            state.lock().unwrap().pings += 1;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                out = outgoing.recv() => {
                    let Some(out) = out else { break };
                    let closing = matches!(out, Message::Close(_));
                    if write.send(out).await.is_err() || closing {
                        break;
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }

        state.lock().unwrap().connections.remove(&connection_id);
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn set_resume_sessions(&self, resume: bool) {
        self.state.lock().unwrap().resume_sessions = resume;
    }

    pub fn reject_handshakes(&self, reject: bool) {
        self.state.lock().unwrap().reject_all = reject;
    }

    pub fn hold_replies(&self, hold: bool) {
        self.state.lock().unwrap().hold_replies = hold;
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        self.state.lock().unwrap().handshake_delay = delay;
    }

    pub fn ping_count(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    pub fn handshake_count(&self) -> usize {
        self.state.lock().unwrap().requested_sessions.len()
    }

    /// Close every open connection with code 1001
    pub fn close_all(&self) {
        let state = self.state.lock().unwrap();
        for connection in state.connections.values() {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "server restart".into(),
            };
            let _ = connection.outbox.send(Message::Close(Some(frame)));
        }
    }

    /// Send a raw text frame to every open connection
    pub fn push_raw(&self, text: &str) {
        let state = self.state.lock().unwrap();
        for connection in state.connections.values() {
            let _ = connection.outbox.send(Message::Text(text.to_string()));
        }
    }

    /// Actions received so far, in order
    pub fn received_actions(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .received
            .iter()
            .filter_map(|frame| frame["action"].as_str().map(String::from))
            .collect()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockPubSubServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn verify(req: &Request, known_keys: &HashMap<char, String>) -> Result<Claims, String> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or_else(|| format!("missing {}", name))
    };
    let payload = header("x-auth-payload")?;
    let signature = header("x-auth-signature")?;

    let decoded = STANDARD.decode(&payload).map_err(|e| e.to_string())?;
    let body: Value = serde_json::from_slice(&decoded).map_err(|e| e.to_string())?;
    let permissions = body["permissions"].as_str().ok_or("missing permissions")?.to_string();
    let identity = body["identity"].as_str().ok_or("missing identity")?;
    if body["security_timestamp"].as_str().is_none() {
        return Err("missing security_timestamp".into());
    }

    let keys = permissions
        .chars()
        .map(|role| known_keys.get(&role).cloned().ok_or(format!("unknown role {}", role)))
        .collect::<Result<Vec<_>, _>>()?;
    let keys = PermissionKeys::parse(keys).map_err(|e| e.to_string())?;
    if keys.identity() != identity {
        return Err(format!("unknown identity {}", identity));
    }
    let expected = sign_payload(&payload, &keys).map_err(|e| e.to_string())?;
    if expected != signature {
        return Err("signature mismatch".into());
    }

    let session = match body["uuid"].as_str() {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|e| e.to_string())?),
        None => None,
    };
    Ok(Claims {
        permissions,
        session,
    })
}

fn reply(frame: Value) -> Message {
    Message::Text(frame.to_string())
}

fn error(seq: &Value, action: &str, code: u16, message: &str) -> Message {
    reply(json!({"seq": seq, "action": action, "code": code, "message": message}))
}

fn handle_frame(state: &Arc<Mutex<ServerState>>, connection_id: u64, text: &str) {
    let mut state = state.lock().unwrap();

    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            if let Some(connection) = state.connections.get(&connection_id) {
                let _ = connection
                    .outbox
                    .send(reply(json!({"code": 400, "message": "invalid request"})));
            }
            return;
        }
    };
    state.received.push(frame.clone());
    if state.hold_replies {
        return;
    }

    let seq = frame["seq"].clone();
    let action = frame["action"].as_str().unwrap_or_default().to_string();
    let Some(connection) = state.connections.get(&connection_id) else { return };
    let outbox = connection.outbox.clone();
    let session = connection.session;
    let permitted = match action.as_str() {
        "session-uuid" => true,
        "pub" => connection.permissions.contains('W'),
        _ => connection.permissions.contains('R'),
    };
    if !permitted {
        let _ = outbox.send(error(&seq, &action, 401, "incorrect permissions"));
        return;
    }

    let response = match action.as_str() {
        "session-uuid" => {
            reply(json!({"seq": seq, "action": action, "code": 200, "uuid": session.to_string()}))
        }
        "subscribe" | "unsubscribe" | "unsubscribe-all" | "subscriptions" => {
            let channel = frame["channel"].as_str().map(String::from);
            let Some(connection) = state.connections.get_mut(&connection_id) else { return };
            match (action.as_str(), channel) {
                ("subscribe", Some(channel)) => {
                    connection.channels.insert(channel);
                }
                ("unsubscribe", Some(channel)) => {
                    if !connection.channels.remove(&channel) {
                        let _ = outbox.send(error(&seq, &action, 404, "subscription not found"));
                        return;
                    }
                }
                ("unsubscribe-all", _) => connection.channels.clear(),
                ("subscriptions", _) => {}
                _ => {
                    let _ = outbox.send(error(&seq, &action, 400, "missing channel"));
                    return;
                }
            }
            let channels: Vec<&String> = connection.channels.iter().collect();
            reply(json!({"seq": seq, "action": action, "code": 200, "channels": channels}))
        }
        "pub" => {
            let (Some(chan), Some(msg)) = (frame["chan"].as_str(), frame["msg"].as_str()) else {
                let _ = outbox.send(error(&seq, &action, 400, "missing chan or msg"));
                return;
            };
            let subscribers: Vec<_> = state
                .connections
                .values()
                .filter(|c| c.channels.contains(chan))
                .map(|c| c.outbox.clone())
                .collect();
            if subscribers.is_empty() {
                let _ = outbox.send(error(&seq, &action, 404, "no subscribers"));
                return;
            }

            let id = Uuid::new_v4();
            let push = json!({
                "action": "msg",
                "id": id.to_string(),
                "chan": chan,
                "msg": msg,
                "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            });
            for subscriber in subscribers {
                let _ = subscriber.send(reply(push.clone()));
            }
            reply(json!({"seq": seq, "action": action, "code": 200, "id": id.to_string()}))
        }
        _ => error(&seq, &action, 400, "unknown action"),
    };

    let _ = outbox.send(response);
}
