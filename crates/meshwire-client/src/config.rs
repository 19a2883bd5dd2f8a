use std::net::SocketAddr;

use meshwire_net::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_PAYLOAD_SIZE};
use meshwire_timing::Duration;

/// Builder-style configuration for [`crate::Client`], mirroring
/// [`meshwire_server::ServerConfig`]'s shape.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) server_addr: SocketAddr,
    pub(crate) max_payload_size: usize,
    pub(crate) handshake_timeout: Duration,
    pub(crate) tick_interval: Duration,
    /// How many times the dial loop retries `TcpStream::connect` before
    /// giving up.
    pub(crate) connect_retries: u32,
    /// Gap between dial attempts — see DESIGN.md for why this defaults to
    /// the same cadence as the handshake-write retry without sharing its
    /// constant.
    pub(crate) connect_retry_gap: Duration,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tick_interval: Duration::from_millis(2),
            connect_retries: 10,
            connect_retry_gap: Duration::from_secs(1),
        }
    }

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
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    #[must_use]
    pub fn with_connect_retry_gap(mut self, gap: Duration) -> Self {
        self.connect_retry_gap = gap;
        self
    }
}
