//! Outgoing request frames

use crate::error::{PubSubError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// A request the client can send; serialized with its `action` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "session-uuid")]
    SessionUuid,
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "unsubscribe-all")]
    UnsubscribeAll,
    #[serde(rename = "subscriptions")]
    Subscriptions,
    #[serde(rename = "pub")]
    Publish { chan: String, msg: String },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::SessionUuid => "session-uuid",
            Request::Subscribe { .. } => "subscribe",
            Request::Unsubscribe { .. } => "unsubscribe",
            Request::UnsubscribeAll => "unsubscribe-all",
            Request::Subscriptions => "subscriptions",
            Request::Publish { .. } => "pub",
        }
    }

    /// Serialize as `{"seq": .., "action": .., ...}`
    pub fn to_frame(&self, seq: u64) -> Result<String> {
        let body = serde_json::to_value(self)
            .map_err(|e| PubSubError::Protocol(format!("failed to encode request: {}", e)))?;
        let Value::Object(fields) = body else {
            return Err(PubSubError::Protocol("request did not encode to an object".into()));
        };

        let mut frame = Map::with_capacity(fields.len() + 1);
        frame.insert("seq".to_string(), Value::from(seq));
        frame.extend(fields);

        serde_json::to_string(&Value::Object(frame))
            .map_err(|e| PubSubError::Protocol(format!("failed to encode request: {}", e)))
    }
}
