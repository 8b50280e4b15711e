//! Public session object
//!
//! A [`Handle`] wraps one [`Socket`] together with the local subscription
//! registry, the callback slots and the cached session UUID. Clones share
//! all of it; dropping the last clone closes the connection.
//!
//! User callbacks never run on the tokio runtime. Each handle owns one
//! dispatcher OS thread that drains the socket's event channel in order, so
//! messages for one channel reach its handler in the order they arrived.
//! Restoring subscriptions after a reconnect happens on a separate tokio
//! task, so a slow or failing callback cannot hold it up.

use crate::error::{PubSubError, Result};
use crate::events::{Callbacks, Event};
use crate::request::Request;
use crate::response::{ErrorResponse, MessageRecord, Response};
use crate::session::SessionCell;
use crate::socket::{Metrics, Socket};
use crate::subscriptions::SubscriptionRegistry;
use crossbeam_channel::{Receiver, Sender};
use futures::future::join_all;
use hypersockets::{CloseReason, ConnectionState};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct HandleInner {
    socket: Socket,
    registry: SubscriptionRegistry,
    callbacks: Arc<Callbacks>,
    session: SessionCell,
    /// Lets restore results reach the dispatcher alongside socket events
    events: Sender<Event>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        debug!("Last handle dropped, closing socket");
        self.socket.close_detached();
    }
}

/// Authenticated pub/sub session
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    pub(crate) fn new(
        socket: Socket,
        session: SessionCell,
        events: Sender<Event>,
        event_rx: Receiver<Event>,
        reopened: mpsc::UnboundedReceiver<()>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PubSubError::Transport(format!("no tokio runtime: {}", e)))?;

        let inner = Arc::new(HandleInner {
            socket,
            registry: SubscriptionRegistry::new(),
            callbacks: Arc::new(Callbacks::new()),
            session,
            events,
        });

        let dispatcher = Dispatcher {
            events: event_rx,
            callbacks: Arc::clone(&inner.callbacks),
            registry: inner.registry.clone(),
        };
        std::thread::Builder::new()
            .name("pubsub-dispatcher".to_string())
            .spawn(move || dispatcher.run())
            .map_err(|e| PubSubError::Transport(format!("failed to spawn dispatcher: {}", e)))?;

        runtime.spawn(restore_on_reopen(Arc::downgrade(&inner), reopened));

        Ok(Self { inner })
    }

    /// Ask the server for the session UUID and cache it
    pub async fn get_session_uuid(&self) -> Result<Uuid> {
        match self.inner.socket.request(Request::SessionUuid).await? {
            Response::SessionUuid(session) => {
                self.inner.session.set(session);
                Ok(session)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Subscribe to `channel`, routing its messages to `handler`
    ///
    /// Replaces any handler already registered for the channel. Resolves
    /// with every channel the server now has for this session.
    pub async fn subscribe<F>(&self, channel: &str, handler: F) -> Result<Vec<String>>
    where
        F: Fn(&MessageRecord) + Send + Sync + 'static,
    {
        let replaced = self.inner.registry.insert(channel, Arc::new(handler));

        let result = self
            .inner
            .socket
            .request(Request::Subscribe {
                channel: channel.to_string(),
            })
            .await;

        match result {
            Ok(Response::Subscribed(channels)) => {
                info!("Subscribed to '{}'", channel);
                Ok(channels)
            }
            Ok(other) => Err(unexpected(other)),
            Err(e) => {
                // A rejected first subscription leaves nothing to restore
                if matches!(e, PubSubError::Server(_)) && !replaced {
                    self.inner.registry.remove(channel);
                }
                Err(e)
            }
        }
    }

    /// Unsubscribe from `channel`
    ///
    /// The local handler is removed before the request goes out and stays
    /// removed even if the server reports no such subscription.
    pub async fn unsubscribe(&self, channel: &str) -> Result<Vec<String>> {
        self.inner.registry.remove(channel);

        match self
            .inner
            .socket
            .request(Request::Unsubscribe {
                channel: channel.to_string(),
            })
            .await?
        {
            Response::Unsubscribed(channels) => {
                info!("Unsubscribed from '{}'", channel);
                Ok(channels)
            }
            other => Err(unexpected(other)),
        }
    }

    pub async fn unsubscribe_all(&self) -> Result<Vec<String>> {
        let cleared = self.inner.registry.clear();
        debug!("Cleared {} local subscription(s)", cleared);

        match self.inner.socket.request(Request::UnsubscribeAll).await? {
            Response::UnsubscribedAll(channels) => Ok(channels),
            other => Err(unexpected(other)),
        }
    }

    /// Channels the server has for this session
    pub async fn list_subscriptions(&self) -> Result<Vec<String>> {
        match self.inner.socket.request(Request::Subscriptions).await? {
            Response::Subscriptions(channels) => Ok(channels),
            other => Err(unexpected(other)),
        }
    }

    /// Publish without waiting for the server; resolves with the frame's seq
    ///
    /// A rejection arriving later goes to the `on_error_response` callback.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        self.inner.socket.publish(channel, message).await
    }

    /// Publish and wait for the acknowledgment; resolves with the message id
    pub async fn publish_with_ack(&self, channel: &str, message: &str) -> Result<Uuid> {
        match self
            .inner
            .socket
            .request(Request::Publish {
                chan: channel.to_string(),
                msg: message.to_string(),
            })
            .await?
        {
            Response::PublishAck(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Wait `delay`, then abandon the connection without a close handshake
    ///
    /// The socket reconnects as it would after any network failure.
    pub async fn drop_connection(&self, delay: Duration) -> Result<()> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.socket.drop_connection()
    }

    /// Graceful shutdown; nothing is retried afterwards
    pub async fn close(&self) {
        self.inner.socket.close().await;
    }

    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&MessageRecord) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_message(Arc::new(callback));
    }

    pub fn on_raw_record<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_raw_record(Arc::new(callback));
    }

    /// Called after a reconnect when the server resumed the same session
    pub fn on_reconnect<F>(&self, callback: F)
    where
        F: Fn(Uuid) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_reconnect(Arc::new(callback));
    }

    /// Called after a reconnect when the server started a different session
    pub fn on_new_session<F>(&self, callback: F)
    where
        F: Fn(Uuid) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_new_session(Arc::new(callback));
    }

    pub fn on_error_response<F>(&self, callback: F)
    where
        F: Fn(&ErrorResponse) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_error_response(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&PubSubError) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_error(Arc::new(callback));
    }

    pub fn on_close<F>(&self, callback: F)
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        self.inner.callbacks.set_close(Arc::new(callback));
    }

    /// Last session UUID seen, without a round trip
    pub fn session_uuid(&self) -> Option<Uuid> {
        self.inner.session.get()
    }

    /// Channels with a local handler
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.inner.registry.channels()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.socket.state()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.socket.metrics()
    }

    /// Replay subscriptions and re-check the session after a reconnect
    async fn restore(&self) {
        let channels = self.inner.registry.channels();
        info!("Connection reopened, restoring {} subscription(s)", channels.len());

        let requests = channels.iter().map(|channel| {
            self.inner.socket.request(Request::Subscribe {
                channel: channel.clone(),
            })
        });
        for (channel, result) in channels.iter().zip(join_all(requests).await) {
            if let Err(e) = result {
                warn!("Resubscribe to '{}' failed: {}", channel, e);
                self.notify(Event::Error(e));
            }
        }

        match self.inner.socket.request(Request::SessionUuid).await {
            Ok(Response::SessionUuid(session)) => {
                let previous = self.inner.session.replace(session);
                if previous == Some(session) {
                    info!("Session {} resumed", session);
                    self.notify(Event::Reconnected(session));
                } else {
                    info!("New session {} (previous: {:?})", session, previous);
                    self.notify(Event::NewSession(session));
                }
            }
            Ok(other) => self.notify(Event::Error(unexpected(other))),
            Err(e) => {
                warn!("Failed to fetch session after reconnect: {}", e);
                self.notify(Event::Error(e));
            }
        }
    }

    fn notify(&self, event: Event) {
        let _ = self.inner.events.send(event);
    }
}

fn unexpected(response: Response) -> PubSubError {
    PubSubError::Protocol(format!("unexpected reply: {:?}", response))
}

/// Run [`Handle::restore`] once per reopen until the socket driver stops
async fn restore_on_reopen(handle: Weak<HandleInner>, mut reopened: mpsc::UnboundedReceiver<()>) {
    while reopened.recv().await.is_some() {
        let Some(inner) = handle.upgrade() else { break };
        Handle { inner }.restore().await;
    }
    debug!("Restore task stopped");
}

/// Runs user callbacks on a dedicated thread
struct Dispatcher {
    events: Receiver<Event>,
    callbacks: Arc<Callbacks>,
    registry: SubscriptionRegistry,
}

impl Dispatcher {
    fn run(self) {
        debug!("Dispatcher started");

        // Ends once the socket driver and every handle have dropped their senders
        for event in self.events.iter() {
            match event {
                Event::Raw(text) => self.callbacks.raw_record(&text),
                Event::Message(record) => {
                    if !self.registry.dispatch(&record) {
                        debug!("No handler for channel '{}'", record.channel);
                    }
                    self.callbacks.message(&record);
                }
                Event::ErrorResponse(response) => self.callbacks.error_response(&response),
                Event::Error(error) => self.callbacks.error(&error),
                Event::Reconnected(session) => self.callbacks.reconnect(session),
                Event::NewSession(session) => self.callbacks.new_session(session),
                Event::Closed(reason) => self.callbacks.close(&reason),
            }
        }

        debug!("Dispatcher stopped");
    }
}
