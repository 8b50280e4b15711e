//! Events flowing from the connection driver to the handle's dispatcher,
//! and the user callback slots they end up in.
//!
//! Each callback kind has exactly one slot. Registering a callback replaces
//! whatever was there. Slots are read by cloning the `Arc` out of the lock,
//! so a callback may register another callback without deadlocking. A
//! callback that panics is logged and the dispatcher keeps going.

use crate::error::PubSubError;
use crate::response::{ErrorResponse, MessageRecord};
use hypersockets::CloseReason;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Everything the dispatcher thread reacts to
#[derive(Debug, Clone)]
pub enum Event {
    /// Every inbound text frame, verbatim, before routing
    Raw(String),
    /// Pushed channel message
    Message(MessageRecord),
    /// Server error nobody was waiting for
    ErrorResponse(ErrorResponse),
    /// Connection-level failure
    Error(PubSubError),
    /// Restore finished and the server resumed the previous session
    Reconnected(Uuid),
    /// Restore finished and the server assigned a different session
    NewSession(Uuid),
    /// The socket stopped for good
    Closed(CloseReason),
}

pub type MessageCallback = Arc<dyn Fn(&MessageRecord) + Send + Sync>;
pub type RawRecordCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type SessionCallback = Arc<dyn Fn(Uuid) + Send + Sync>;
pub type ErrorResponseCallback = Arc<dyn Fn(&ErrorResponse) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&PubSubError) + Send + Sync>;
pub type CloseCallback = Arc<dyn Fn(&CloseReason) + Send + Sync>;

/// One replaceable slot per callback kind
#[derive(Default)]
pub struct Callbacks {
    message: RwLock<Option<MessageCallback>>,
    raw_record: RwLock<Option<RawRecordCallback>>,
    reconnect: RwLock<Option<SessionCallback>>,
    new_session: RwLock<Option<SessionCallback>>,
    error_response: RwLock<Option<ErrorResponseCallback>>,
    error: RwLock<Option<ErrorCallback>>,
    close: RwLock<Option<CloseCallback>>,
}

fn current<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().clone()
}

fn guarded(kind: &str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        error!("{} callback panicked", kind);
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_message(&self, callback: MessageCallback) {
        *self.message.write() = Some(callback);
    }

    pub fn set_raw_record(&self, callback: RawRecordCallback) {
        *self.raw_record.write() = Some(callback);
    }

    pub fn set_reconnect(&self, callback: SessionCallback) {
        *self.reconnect.write() = Some(callback);
    }

    pub fn set_new_session(&self, callback: SessionCallback) {
        *self.new_session.write() = Some(callback);
    }

    pub fn set_error_response(&self, callback: ErrorResponseCallback) {
        *self.error_response.write() = Some(callback);
    }

    pub fn set_error(&self, callback: ErrorCallback) {
        *self.error.write() = Some(callback);
    }

    pub fn set_close(&self, callback: CloseCallback) {
        *self.close.write() = Some(callback);
    }

    pub fn message(&self, record: &MessageRecord) {
        if let Some(callback) = current(&self.message) {
            guarded("message", || callback(record));
        }
    }

    pub fn raw_record(&self, text: &str) {
        if let Some(callback) = current(&self.raw_record) {
            guarded("raw_record", || callback(text));
        }
    }

    pub fn reconnect(&self, session: Uuid) {
        if let Some(callback) = current(&self.reconnect) {
            guarded("reconnect", || callback(session));
        }
    }

    pub fn new_session(&self, session: Uuid) {
        if let Some(callback) = current(&self.new_session) {
            guarded("new_session", || callback(session));
        }
    }

    pub fn error_response(&self, response: &ErrorResponse) {
        if let Some(callback) = current(&self.error_response) {
            guarded("error_response", || callback(response));
        }
    }

    pub fn error(&self, error: &PubSubError) {
        if let Some(callback) = current(&self.error) {
            guarded("error", || callback(error));
        }
    }

    pub fn close(&self, reason: &CloseReason) {
        if let Some(callback) = current(&self.close) {
            guarded("close", || callback(reason));
        }
    }
}
