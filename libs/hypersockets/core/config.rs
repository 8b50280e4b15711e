use std::time::Duration;

/// Default bound on a full connection handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between keepalive pings
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Connection parameters shared by every attempt to reach one endpoint
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL (wss:// or ws://)
    url: String,

    /// Upper bound on TCP + TLS + upgrade
    connect_timeout: Duration,

    /// Interval between transport-level pings while open
    keepalive_interval: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }
}
