use std::net::IpAddr;

use meshwire_net::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_PAYLOAD_SIZE};
use meshwire_timing::Duration;

/// Builder-style configuration for [`crate::Server`] over a
/// `Default`-derived inner struct.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub(crate) port: u16,
    pub(crate) bind_ip: Option<IpAddr>,
    pub(crate) max_payload_size: usize,
    pub(crate) handshake_timeout: Duration,
    pub(crate) tick_interval: Duration,
    pub(crate) ping_interval: Duration,
    pub(crate) send_timeout: Duration,
    pub(crate) connection_limit: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5050,
            bind_ip: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tick_interval: Duration::from_millis(2),
            ping_interval: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            connection_limit: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Binds to a specific local address instead of the unspecified address
    /// (`0.0.0.0` / `::`).
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = Some(ip);
        self
    }

    /// Size of the inbound reassembly chunk cache. Production default is 4
    /// MiB; tests typically shrink this to a couple hundred bytes to force
    /// the multi-chunk fragmentation path on ordinary small payloads.
    #[must_use]
    pub fn with_max_payload_size(mut self, bytes: usize) -> Self {
        self.max_payload_size = bytes;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Caps the number of concurrent peers this server will accept.
    /// Connections beyond the cap are refused at accept time. Unset
    /// (`None`, the default) means unbounded.
    #[must_use]
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = Some(limit);
        self
    }
}
