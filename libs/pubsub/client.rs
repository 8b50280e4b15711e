use crate::auth::{AuthHeaders, PermissionKeys};
use crate::config::ClientOptions;
use crate::error::Result;
use crate::handle::Handle;
use crate::session::SessionCell;
use crate::socket::Socket;
use hypersockets::{
    ConnectionConfig, FastThenPeriodic, HeaderProvider, NeverReconnect, ReconnectionStrategy,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Entry point: holds options and opens authenticated sessions
///
/// # Example
/// ```rust,no_run
/// use pubsub::{Client, ClientOptions};
///
/// # async fn run() -> pubsub::Result<()> {
/// let client = Client::new(ClientOptions::new("wss://pubsub.example.com/ws"));
/// let handle = client
///     .connect(["R-alice-00112233445566778899aabbccddeeff"])
///     .await?;
///
/// handle
///     .subscribe("BOOKS", |record| println!("{}: {}", record.channel, record.message))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    options: ClientOptions,
}

impl Client {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Open a session authenticated with `keys`
    ///
    /// Fails with `Crypto` if the keys are malformed and with `Transport` if
    /// the server cannot be reached or rejects the handshake. On success the
    /// session UUID has already been fetched and cached on the handle.
    pub async fn connect<I, S>(&self, keys: I) -> Result<Handle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = PermissionKeys::parse(keys)?;
        info!(
            "Connecting to {} as '{}' with permissions {}",
            self.options.url,
            keys.identity(),
            keys.permissions()
        );

        let session = SessionCell::new(self.options.session_uuid);
        let headers: Arc<dyn HeaderProvider> = Arc::new(AuthHeaders::new(keys, session.clone()));
        let config = ConnectionConfig::new(self.options.url.clone())
            .with_connect_timeout(self.options.connect_timeout())
            .with_keepalive_interval(self.options.keepalive_interval());

        let (events, event_rx) = crossbeam_channel::unbounded();
        let (reopened, reopened_rx) = mpsc::unbounded_channel();
        let socket = Socket::open(
            config,
            headers,
            self.reconnection_strategy(),
            events.clone(),
            reopened,
        )
        .await?;
        let handle = Handle::new(socket, session, events, event_rx, reopened_rx)?;

        let session = handle.get_session_uuid().await?;
        info!("Session established: {}", session);

        Ok(handle)
    }

    fn reconnection_strategy(&self) -> Arc<dyn ReconnectionStrategy> {
        if self.options.auto_reconnect {
            Arc::new(FastThenPeriodic::new(
                self.options.fast_retry_attempts,
                self.options.retry_interval(),
            ))
        } else {
            Arc::new(NeverReconnect)
        }
    }
}
