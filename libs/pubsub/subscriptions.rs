//! Local channel subscriptions
//!
//! Remembers the handler for every channel the caller subscribed to, so
//! pushed messages can be routed and the set can be replayed after a
//! reconnect.

use crate::response::MessageRecord;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Handler invoked for every message on one channel
pub type ChannelHandler = Arc<dyn Fn(&MessageRecord) + Send + Sync>;

/// Channel name to handler map, shared between the handle and its dispatcher
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    handlers: Arc<DashMap<String, ChannelHandler>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `channel`; returns true if it replaced one
    pub fn insert(&self, channel: impl Into<String>, handler: ChannelHandler) -> bool {
        self.handlers.insert(channel.into(), handler).is_some()
    }

    pub fn remove(&self, channel: &str) -> bool {
        self.handlers.remove(channel).is_some()
    }

    /// Forget every channel; returns how many there were
    pub fn clear(&self) -> usize {
        let count = self.handlers.len();
        self.handlers.clear();
        count
    }

    /// Subscribed channel names, sorted
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        channels.sort();
        channels
    }

    /// Route a message to the handler for its channel
    ///
    /// The handler is cloned out of the map before it runs, so it may
    /// subscribe or unsubscribe without deadlocking. Returns false when no
    /// handler is registered for the channel. A panicking handler is logged
    /// and does not take the caller down with it.
    pub fn dispatch(&self, record: &MessageRecord) -> bool {
        let handler = self
            .handlers
            .get(&record.channel)
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(record))).is_err() {
                    error!("Handler for channel '{}' panicked", record.channel);
                }
                true
            }
            None => false,
        }
    }
}
