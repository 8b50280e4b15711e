//! Connection driver
//!
//! One tokio task per socket owns the transport. It reads frames, writes
//! queued requests, sends keepalive pings and runs the reconnect loop, all
//! from a single `select!`, so frames never interleave on the wire.
//!
//! ```text
//!  Socket (cloneable) ──commands──> driver task ──frames──> server
//!        │                              │
//!        └── pending: seq -> reply <────┘ (replies complete pending)
//!                                       ├──events──> dispatcher thread
//!                                       └──reopened──> restore task
//! ```
//!
//! Callers register a reply slot under the request's seq before handing the
//! frame to the driver. On a drop, requests already written on that
//! connection fail with `ConnectionLost`; requests still waiting to be
//! written are kept and go out once the connection reopens.

use crate::error::{PubSubError, Result};
use crate::events::Event;
use crate::request::Request;
use crate::response::{classify, Inbound, Response};
use crossbeam_channel::Sender;
use dashmap::DashMap;
use hypersockets::{
    connect, AtomicConnectionState, AtomicMetrics, CloseReason, ConnectionConfig, ConnectionState,
    HeaderProvider, Keepalive, ReconnectionStrategy, TransportEvent, WsMessage, WsReader, WsWriter,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type ReplySender = oneshot::Sender<Result<Response>>;

/// A serialized frame waiting to be written
struct Outbound {
    seq: u64,
    text: String,
    /// Set for fire-and-forget frames: resolved once the write completes
    written: Option<oneshot::Sender<Result<()>>>,
}

enum SocketCommand {
    Send(Outbound),
    /// Abandon the current connection without a close handshake
    DropConnection,
    Close { done: oneshot::Sender<()> },
}

/// Snapshot of socket counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

struct SocketShared {
    next_seq: AtomicU64,
    pending: DashMap<u64, ReplySender>,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
}

/// Client side of one logical pub/sub connection
///
/// Cheap to clone; all clones talk to the same driver task. The driver shuts
/// down gracefully once every clone is gone or [`Socket::close`] is called.
#[derive(Clone)]
pub struct Socket {
    shared: Arc<SocketShared>,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl Socket {
    /// Open the first connection and start the driver task
    ///
    /// The initial connection is not retried: its failure is returned here.
    /// Every later reopen is signalled on `reopened`.
    pub async fn open(
        config: ConnectionConfig,
        headers: Arc<dyn HeaderProvider>,
        strategy: Arc<dyn ReconnectionStrategy>,
        events: Sender<Event>,
        reopened: mpsc::UnboundedSender<()>,
    ) -> Result<Self> {
        let shared = Arc::new(SocketShared {
            next_seq: AtomicU64::new(1),
            pending: DashMap::new(),
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            metrics: AtomicMetrics::new(),
        });

        let (writer, reader) = match connect_once(&config, headers.as_ref()).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("Failed to connect to {}: {}", config.url(), e);
                shared.state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            config,
            headers,
            strategy,
            shared: Arc::clone(&shared),
            events,
            reopened,
            commands: command_rx,
            in_flight: HashSet::new(),
            backlog: VecDeque::new(),
        };
        tokio::spawn(driver.run(writer, reader));

        Ok(Self { shared, commands })
    }

    fn next_seq(&self) -> u64 {
        self.shared.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for its reply
    pub async fn request(&self, request: Request) -> Result<Response> {
        let seq = self.next_seq();
        let text = request.to_frame(seq)?;
        let (reply, response) = oneshot::channel();
        self.shared.pending.insert(seq, reply);

        debug!("Sending {} request (seq {})", request.action(), seq);

        if let Err(e) = self.submit(Outbound {
            seq,
            text,
            written: None,
        }) {
            self.shared.pending.remove(&seq);
            return Err(e);
        }

        response.await.unwrap_or(Err(PubSubError::Closed))
    }

    /// Publish without waiting for the acknowledgment
    ///
    /// Resolves with the frame's seq once it has been written.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        let seq = self.next_seq();
        let text = Request::Publish {
            chan: channel.to_string(),
            msg: message.to_string(),
        }
        .to_frame(seq)?;
        let (written, write_result) = oneshot::channel();

        self.submit(Outbound {
            seq,
            text,
            written: Some(written),
        })?;

        write_result.await.unwrap_or(Err(PubSubError::Closed))?;
        Ok(seq)
    }

    fn submit(&self, outbound: Outbound) -> Result<()> {
        self.check_sendable()?;
        self.commands
            .send(SocketCommand::Send(outbound))
            .map_err(|_| self.check_sendable().err().unwrap_or(PubSubError::Closed))
    }

    fn check_sendable(&self) -> Result<()> {
        match self.shared.state.get() {
            ConnectionState::Closing | ConnectionState::Closed => Err(PubSubError::Closed),
            ConnectionState::Disconnected => Err(PubSubError::NotConnected),
            _ => Ok(()),
        }
    }

    /// Force the current connection down without a close handshake
    pub fn drop_connection(&self) -> Result<()> {
        self.check_sendable()?;
        self.commands
            .send(SocketCommand::DropConnection)
            .map_err(|_| PubSubError::NotConnected)
    }

    /// Graceful shutdown; returns once the driver has stopped
    pub async fn close(&self) {
        self.shared.state.set_unless_closed(ConnectionState::Closing);
        let (done, finished) = oneshot::channel();
        if self.commands.send(SocketCommand::Close { done }).is_ok() {
            let _ = finished.await;
        }
        self.shared.state.set(ConnectionState::Closed);
    }

    /// Ask the driver to shut down without waiting for it
    pub(crate) fn close_detached(&self) {
        let (done, _) = oneshot::channel();
        let _ = self.commands.send(SocketCommand::Close { done });
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.shared.metrics.messages_sent(),
            messages_received: self.shared.metrics.messages_received(),
            reconnect_count: self.shared.metrics.reconnect_count(),
            connection_state: self.shared.state.get(),
        }
    }
}

async fn connect_once(
    config: &ConnectionConfig,
    headers: &dyn HeaderProvider,
) -> Result<(WsWriter, WsReader)> {
    let headers = headers.get_headers().await?;
    Ok(connect(config, &headers).await?)
}

enum Served {
    Lost(CloseReason),
    Close {
        writer: WsWriter,
        done: Option<oneshot::Sender<()>>,
    },
}

enum Reconnected {
    Open(WsWriter, WsReader),
    Close(Option<oneshot::Sender<()>>),
    GaveUp(CloseReason),
}

struct Driver {
    config: ConnectionConfig,
    headers: Arc<dyn HeaderProvider>,
    strategy: Arc<dyn ReconnectionStrategy>,
    shared: Arc<SocketShared>,
    events: Sender<Event>,
    reopened: mpsc::UnboundedSender<()>,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    /// Seqs of requests written on the current connection and not yet answered
    in_flight: HashSet<u64>,
    /// Frames received while no connection was open
    backlog: VecDeque<Outbound>,
}

impl Driver {
    async fn run(mut self, mut writer: WsWriter, mut reader: WsReader) {
        loop {
            let reason = match self.serve(writer, reader).await {
                Served::Lost(reason) => reason,
                Served::Close { writer, done } => {
                    self.shutdown(Some(writer), done).await;
                    return;
                }
            };

            self.fail_in_flight();

            match self.reconnect(reason).await {
                Reconnected::Open(next_writer, next_reader) => {
                    writer = next_writer;
                    reader = next_reader;
                    if self.reopened.send(()).is_err() {
                        debug!("Nobody to restore subscriptions, continuing");
                    }
                }
                Reconnected::Close(done) => {
                    self.shutdown(None, done).await;
                    return;
                }
                Reconnected::GaveUp(reason) => {
                    self.give_up(reason);
                    return;
                }
            }
        }
    }

    /// Drive one open connection until it is lost or closed
    async fn serve(&mut self, mut writer: WsWriter, mut reader: WsReader) -> Served {
        self.shared.state.set_unless_closed(ConnectionState::Open);
        let mut keepalive = Keepalive::ping(self.config.keepalive_interval());

        while let Some(outbound) = self.backlog.pop_front() {
            if let Err(reason) = self.write(&mut writer, outbound).await {
                return Served::Lost(reason);
            }
        }

        loop {
            tokio::select! {
                event = reader.next_event() => match event {
                    TransportEvent::Message(WsMessage::Text(text)) => self.route_inbound(text),
                    TransportEvent::Message(WsMessage::Binary(data)) => {
                        debug!("Ignoring {} byte binary frame", data.len());
                    }
                    TransportEvent::Message(_) => {}
                    TransportEvent::Closed(reason) => {
                        warn!("Connection lost: {}", reason);
                        return Served::Lost(reason);
                    }
                },
                command = self.commands.recv() => match command {
                    Some(SocketCommand::Send(outbound)) => {
                        if let Err(reason) = self.write(&mut writer, outbound).await {
                            return Served::Lost(reason);
                        }
                    }
                    Some(SocketCommand::DropConnection) => {
                        info!("Dropping connection without close handshake");
                        return Served::Lost(CloseReason::abnormal("connection dropped by client"));
                    }
                    Some(SocketCommand::Close { done }) => {
                        return Served::Close { writer, done: Some(done) };
                    }
                    None => {
                        debug!("All socket handles dropped, closing");
                        return Served::Close { writer, done: None };
                    }
                },
                payload = keepalive.tick() => {
                    if let Err(e) = writer.send(payload).await {
                        warn!("Keepalive failed: {}", e);
                        return Served::Lost(CloseReason::abnormal(format!("keepalive failed: {}", e)));
                    }
                }
            }
        }
    }

    async fn write(
        &mut self,
        writer: &mut WsWriter,
        outbound: Outbound,
    ) -> std::result::Result<(), CloseReason> {
        let Outbound { seq, text, written } = outbound;

        match writer.send_text(text).await {
            Ok(()) => {
                self.shared.metrics.increment_sent();
                if self.shared.pending.contains_key(&seq) {
                    self.in_flight.insert(seq);
                }
                if let Some(written) = written {
                    let _ = written.send(Ok(()));
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to write frame (seq {}): {}", seq, e);
                let error = PubSubError::from(e.clone());
                match written {
                    Some(written) => {
                        let _ = written.send(Err(error));
                    }
                    None => self.fail_pending(seq, error),
                }
                Err(CloseReason::abnormal(format!("write failed: {}", e)))
            }
        }
    }

    fn route_inbound(&mut self, text: String) {
        self.shared.metrics.increment_received();
        self.emit(Event::Raw(text.clone()));

        match classify(&text) {
            Ok(Inbound::Reply { seq, result }) => {
                self.in_flight.remove(&seq);
                match self.shared.pending.remove(&seq) {
                    Some((_, reply)) => {
                        let _ = reply.send(result);
                    }
                    None => match result {
                        Err(PubSubError::Server(response)) => {
                            debug!("Unclaimed error reply (seq {}): {}", seq, response);
                            self.emit(Event::ErrorResponse(response));
                        }
                        Err(e) => self.emit(Event::Error(e)),
                        Ok(response) => {
                            debug!("Dropping reply with no pending request (seq {}): {:?}", seq, response);
                        }
                    },
                }
            }
            Ok(Inbound::Message(record)) => self.emit(Event::Message(record)),
            Ok(Inbound::Error(response)) => {
                warn!("Server error: {}", response);
                self.emit(Event::ErrorResponse(response));
            }
            Err(e) => {
                warn!("Unrecognized frame: {}", e);
                self.emit(Event::Error(e));
            }
        }
    }

    /// Keep trying to reopen until the strategy gives up or the socket is closed
    async fn reconnect(&mut self, reason: CloseReason) -> Reconnected {
        let mut attempt = 0usize;

        loop {
            let Some(delay) = self.strategy.next_delay(attempt) else {
                return Reconnected::GaveUp(reason);
            };
            self.shared.state.set_unless_closed(ConnectionState::Reconnecting);

            if !delay.is_zero() {
                info!("Reconnecting in {:?} (attempt {})", delay, attempt + 1);
            }
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    command = self.commands.recv() => match command {
                        Some(SocketCommand::Send(outbound)) => self.backlog.push_back(outbound),
                        Some(SocketCommand::DropConnection) => {}
                        Some(SocketCommand::Close { done }) => return Reconnected::Close(Some(done)),
                        None => return Reconnected::Close(None),
                    }
                }
            }

            // A close issued mid-handshake abandons the attempt
            let connected = {
                let connecting = connect_once(&self.config, self.headers.as_ref());
                tokio::pin!(connecting);
                loop {
                    tokio::select! {
                        result = &mut connecting => break result,
                        command = self.commands.recv() => match command {
                            Some(SocketCommand::Send(outbound)) => self.backlog.push_back(outbound),
                            Some(SocketCommand::DropConnection) => {}
                            Some(SocketCommand::Close { done }) => return Reconnected::Close(Some(done)),
                            None => return Reconnected::Close(None),
                        }
                    }
                }
            };

            match connected {
                Ok((writer, reader)) => {
                    self.shared.metrics.increment_reconnects();
                    info!("Reconnected to {} (attempt {})", self.config.url(), attempt + 1);
                    return Reconnected::Open(writer, reader);
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt + 1, e);
                    let error = match e {
                        PubSubError::Transport(_) => e,
                        other => PubSubError::Transport(other.to_string()),
                    };
                    self.emit(Event::Error(error));
                    attempt += 1;
                }
            }
        }
    }

    async fn shutdown(mut self, writer: Option<WsWriter>, done: Option<oneshot::Sender<()>>) {
        self.shared.state.set(ConnectionState::Closing);
        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                debug!("Close frame not delivered: {}", e);
            }
        }
        self.shared.state.set(ConnectionState::Closed);
        self.fail_everything(PubSubError::Closed);

        info!("Connection closed");
        self.emit(Event::Closed(CloseReason::Normal));
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn give_up(mut self, reason: CloseReason) {
        warn!("Not reconnecting, connection is down: {}", reason);
        self.shared.state.set_unless_closed(ConnectionState::Disconnected);
        self.fail_everything(PubSubError::ConnectionLost);

        let reason = if reason.is_normal() {
            CloseReason::abnormal("server closed the connection")
        } else {
            reason
        };
        self.emit(Event::Closed(reason));
    }

    fn fail_in_flight(&mut self) {
        if !self.in_flight.is_empty() {
            debug!("Failing {} in-flight request(s)", self.in_flight.len());
        }
        for seq in self.in_flight.drain() {
            if let Some((_, reply)) = self.shared.pending.remove(&seq) {
                let _ = reply.send(Err(PubSubError::ConnectionLost));
            }
        }
    }

    fn fail_pending(&self, seq: u64, error: PubSubError) {
        if let Some((_, reply)) = self.shared.pending.remove(&seq) {
            let _ = reply.send(Err(error));
        }
    }

    fn fail_outbound(&self, outbound: Outbound, error: PubSubError) {
        match outbound.written {
            Some(written) => {
                let _ = written.send(Err(error));
            }
            None => self.fail_pending(outbound.seq, error),
        }
    }

    /// Stop accepting commands and fail everything still waiting
    fn fail_everything(&mut self, error: PubSubError) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SocketCommand::Send(outbound) => self.fail_outbound(outbound, error.clone()),
                SocketCommand::Close { done } => {
                    let _ = done.send(());
                }
                SocketCommand::DropConnection => {}
            }
        }

        while let Some(outbound) = self.backlog.pop_front() {
            self.fail_outbound(outbound, error.clone());
        }

        self.in_flight.clear();
        let seqs: Vec<u64> = self.shared.pending.iter().map(|entry| *entry.key()).collect();
        for seq in seqs {
            self.fail_pending(seq, error.clone());
        }
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("Event dispatcher gone, dropping event");
        }
    }
}
