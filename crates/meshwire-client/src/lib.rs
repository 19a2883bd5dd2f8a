//! Connects to a single server peer, redials on disconnect, and drives that
//! peer's runtime tick (keepalive response, inbound dispatch, outbound
//! flush) on a dedicated thread.

mod client;
mod config;

pub use client::Client;
pub use config::ClientConfig;
pub use meshwire_conn::Connection;
