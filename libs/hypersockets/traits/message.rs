/// WebSocket data and control frames surfaced to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// Why a connection ended
///
/// Only a close frame carrying code 1000 counts as normal. Errors, other
/// close codes and a stream that ends without a close frame are abnormal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Abnormal { code: Option<u16>, reason: String },
}

impl CloseReason {
    pub fn abnormal(reason: impl Into<String>) -> Self {
        CloseReason::Abnormal {
            code: None,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn is_normal(&self) -> bool {
        matches!(self, CloseReason::Normal)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Normal => write!(f, "normal closure"),
            CloseReason::Abnormal {
                code: Some(code),
                reason,
            } => write!(f, "abnormal closure ({}): {}", code, reason),
            CloseReason::Abnormal { code: None, reason } => {
                write!(f, "abnormal closure: {}", reason)
            }
        }
    }
}

/// One event read from an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data or control frame
    Message(WsMessage),
    /// The connection ended; no further events follow
    Closed(CloseReason),
}
