use crate::config::ConnectionConfig;
use crate::traits::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection with the given handshake headers
///
/// The whole handshake (TCP, TLS, HTTP upgrade) is bounded by the
/// configured connect timeout. The returned halves can be used
/// independently: the writer by whoever serializes outgoing frames, the
/// reader by whoever consumes inbound events.
pub async fn connect(config: &ConnectionConfig, headers: &Headers) -> Result<(WsWriter, WsReader)> {
    let mut request = config.url().into_client_request().map_err(|e| {
        HyperSocketError::Configuration(format!("Invalid URL '{}': {}", config.url(), e))
    })?;

    for (key, value) in headers {
        let header_name = key
            .parse::<http::header::HeaderName>()
            .map_err(|_| HyperSocketError::InvalidHeader(format!("invalid name '{}'", key)))?;
        let header_value = value
            .parse::<http::header::HeaderValue>()
            .map_err(|_| HyperSocketError::InvalidHeader(format!("invalid value for '{}'", key)))?;
        request.headers_mut().insert(header_name, header_value);
    }

    debug!("Connecting to {} with {} custom headers", config.url(), headers.len());

    let (ws_stream, _) = tokio::time::timeout(config.connect_timeout(), connect_async(request))
        .await
        .map_err(|_| HyperSocketError::ConnectTimeout(config.connect_timeout()))?
        .map_err(|e| HyperSocketError::ConnectFailed(e.to_string()))?;

    info!("Connected to {}", config.url());

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Write half of an open connection
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

impl WsWriter {
    /// Send one frame and flush it
    pub async fn send(&mut self, message: WsMessage) -> Result<()> {
        self.sink
            .send(ws_message_to_tungstenite(message))
            .await
            .map_err(|e| HyperSocketError::WebSocket(e.to_string()))
    }

    pub async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(WsMessage::Text(text)).await
    }

    /// Send a normal-closure (1000) close frame and shut the write half
    pub async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| HyperSocketError::WebSocket(format!("Failed to send close frame: {}", e)))?;
        let _ = self.sink.close().await;
        Ok(())
    }
}

/// Read half of an open connection
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Wait for the next frame or the end of the connection
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    /// After a `TransportEvent::Closed` is returned the reader is spent.
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(frame))) => {
                    return TransportEvent::Closed(classify_close(frame));
                }
                Some(Ok(msg)) => {
                    if let Some(ws_msg) = tungstenite_to_ws_message(msg) {
                        return TransportEvent::Message(ws_msg);
                    }
                }
                Some(Err(e)) => {
                    return TransportEvent::Closed(CloseReason::abnormal(e.to_string()));
                }
                None => {
                    return TransportEvent::Closed(CloseReason::abnormal("Stream ended"));
                }
            }
        }
    }
}

fn classify_close(frame: Option<CloseFrame<'_>>) -> CloseReason {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => CloseReason::Normal,
        Some(frame) => CloseReason::Abnormal {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.to_string(),
        },
        None => CloseReason::abnormal("Close frame without status"),
    }
}

/// Convert WsMessage to tungstenite Message
fn ws_message_to_tungstenite(msg: WsMessage) -> Message {
    match msg {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
        WsMessage::Ping(data) => Message::Ping(data),
        WsMessage::Pong(data) => Message::Pong(data),
    }
}

/// Convert tungstenite Message to WsMessage
fn tungstenite_to_ws_message(msg: Message) -> Option<WsMessage> {
    match msg {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(data) => Some(WsMessage::Ping(data)),
        Message::Pong(data) => Some(WsMessage::Pong(data)),
        Message::Close(_) | Message::Frame(_) => None,
    }
}
