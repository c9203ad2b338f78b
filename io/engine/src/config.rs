use std::time::Duration;

/// Delay before reconnecting after a failure or disconnect.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How long a single candidate may stay in the connecting state.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness events collected per wait.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for the connection engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host name or address literal to resolve.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Delay before the next resolution after a failure or disconnect.
    pub retry_delay: Duration,
    /// Per-candidate connect deadline.
    pub connect_timeout: Duration,
    /// Readiness events collected per wait.
    pub event_capacity: usize,
    /// Enable TCP_NODELAY on outbound sockets.
    pub tcp_nodelay: bool,
}

impl Config {
    /// Configuration for `host:port` with default timing.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            tcp_nodelay: true,
        }
    }
}
