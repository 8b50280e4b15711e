//! Inbound frame classification
//!
//! Every text frame from the server is one of:
//! - a reply to a request (carries `seq`), successful or not
//! - a pushed channel message (`action: "msg"`, no `seq`)
//! - an error the server could not tie to a request (no `seq`)

use crate::error::{PubSubError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Code the server uses for success
const CODE_OK: u16 = 200;

/// Server error categories, derived from code, action and whether a seq was present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    /// 400 on a request the server could parse: malformed fields
    InvalidFormat,
    /// 400 without seq: the request was not JSON at all
    InvalidRequest,
    /// 401: keys lack the role the action needs
    IncorrectPermissions,
    /// 404 on `pub`
    NoSubscribers,
    /// 404 on `unsubscribe`
    SubscriptionNotFound,
    /// Any other code/action pair
    UnknownServerError,
}

impl ServerErrorKind {
    pub fn classify(code: u16, action: Option<&str>, has_seq: bool) -> Self {
        match (code, action) {
            (400, _) if !has_seq => ServerErrorKind::InvalidRequest,
            (400, _) => ServerErrorKind::InvalidFormat,
            (401, _) => ServerErrorKind::IncorrectPermissions,
            (404, Some("pub")) => ServerErrorKind::NoSubscribers,
            (404, Some("unsubscribe")) => ServerErrorKind::SubscriptionNotFound,
            _ => ServerErrorKind::UnknownServerError,
        }
    }
}

/// A failure reported by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub kind: ServerErrorKind,
    pub code: u16,
    pub action: Option<String>,
    pub seq: Option<u64>,
    pub message: String,
    pub details: Option<Value>,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.code, self.message)?;
        if let Some(action) = &self.action {
            write!(f, " [action: {}]", action)?;
        }
        Ok(())
    }
}

/// One message delivered on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub channel: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Successful replies, one per request action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    SessionUuid(Uuid),
    Subscribed(Vec<String>),
    Unsubscribed(Vec<String>),
    UnsubscribedAll(Vec<String>),
    Subscriptions(Vec<String>),
    PublishAck(Uuid),
}

/// A classified inbound frame
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Completes the request sent with `seq`
    Reply { seq: u64, result: Result<Response> },
    /// Pushed channel message
    Message(MessageRecord),
    /// Error without a seq
    Error(ErrorResponse),
}

#[derive(Deserialize)]
struct RawFrame {
    seq: Option<u64>,
    action: Option<String>,
    code: Option<u16>,
    message: Option<String>,
    details: Option<Value>,
    uuid: Option<String>,
    channels: Option<Vec<String>>,
    id: Option<String>,
    chan: Option<String>,
    msg: Option<String>,
    time: Option<String>,
}

/// Classify one inbound text frame
///
/// Returns `Err` only when the frame cannot be tied to any request: it is not
/// a JSON object, or it has no seq and is neither a push nor an error.
pub fn classify(text: &str) -> Result<Inbound> {
    let frame: RawFrame = serde_json::from_str(text)
        .map_err(|e| PubSubError::Protocol(format!("unparseable frame: {}", e)))?;

    if let Some(code) = frame.code.filter(|code| *code != CODE_OK) {
        let error = ErrorResponse {
            kind: ServerErrorKind::classify(code, frame.action.as_deref(), frame.seq.is_some()),
            code,
            action: frame.action,
            seq: frame.seq,
            message: frame.message.unwrap_or_default(),
            details: frame.details,
        };
        return Ok(match error.seq {
            Some(seq) => Inbound::Reply {
                seq,
                result: Err(PubSubError::Server(error)),
            },
            None => Inbound::Error(error),
        });
    }

    match (frame.seq, frame.action.as_deref()) {
        (None, Some("msg")) => parse_message(frame).map(Inbound::Message),
        (None, Some(other)) => Err(PubSubError::UnhandledResponse(other.to_string())),
        (None, None) => Err(PubSubError::Protocol("frame has neither seq nor action".into())),
        (Some(seq), _) => Ok(Inbound::Reply {
            seq,
            result: parse_reply(frame),
        }),
    }
}

fn parse_reply(frame: RawFrame) -> Result<Response> {
    let action = frame
        .action
        .ok_or_else(|| PubSubError::Protocol("reply without action".into()))?;

    match action.as_str() {
        "session-uuid" => parse_uuid(frame.uuid, "uuid").map(Response::SessionUuid),
        "subscribe" => channels(frame.channels).map(Response::Subscribed),
        "unsubscribe" => channels(frame.channels).map(Response::Unsubscribed),
        "unsubscribe-all" => Ok(Response::UnsubscribedAll(frame.channels.unwrap_or_default())),
        "subscriptions" => channels(frame.channels).map(Response::Subscriptions),
        "pub" => parse_uuid(frame.id, "id").map(Response::PublishAck),
        _ => Err(PubSubError::UnhandledResponse(action)),
    }
}

fn parse_message(frame: RawFrame) -> Result<MessageRecord> {
    let id = parse_uuid(frame.id, "id")?;
    let channel = frame
        .chan
        .ok_or_else(|| PubSubError::Protocol("message without chan".into()))?;
    let message = frame
        .msg
        .ok_or_else(|| PubSubError::Protocol("message without msg".into()))?;
    let time = frame
        .time
        .ok_or_else(|| PubSubError::Protocol("message without time".into()))?;
    let timestamp = DateTime::parse_from_rfc3339(&time)
        .map_err(|e| PubSubError::Protocol(format!("invalid message time '{}': {}", time, e)))?
        .with_timezone(&Utc);

    Ok(MessageRecord {
        id,
        channel,
        message,
        timestamp,
    })
}

fn parse_uuid(value: Option<String>, field: &str) -> Result<Uuid> {
    let value = value.ok_or_else(|| PubSubError::Protocol(format!("reply without {}", field)))?;
    Uuid::parse_str(&value)
        .map_err(|e| PubSubError::Protocol(format!("invalid {} '{}': {}", field, value, e)))
}

fn channels(value: Option<Vec<String>>) -> Result<Vec<String>> {
    value.ok_or_else(|| PubSubError::Protocol("reply without channels".into()))
}
