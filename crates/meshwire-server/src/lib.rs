//! TCP accept loop, peer registry, and keepalive/expiry sweep for the
//! "accepts many peers" half of meshwire.
//!
//! A [`Server`] owns one accept thread (blocking `TcpListener::accept` in a
//! non-blocking, cooperatively-polled loop) and one runtime-tick thread that
//! advances every tracked [`Socket`](meshwire_net::Socket)'s handshake or
//! `runtime_update`, pings authorized peers every `ping_interval`, and
//! sweeps sockets that have been shut down but are still observed by an
//! external [`Connection`](meshwire_conn::Connection) into (and eventually
//! out of) the expired list.

mod config;
mod server;

pub use config::ServerConfig;
pub use meshwire_conn::Connection;
pub use server::Server;

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration as StdDuration,
    };

    use meshwire_timing::Duration;
    use meshwire_wire::CommandKind;

    use super::*;

    fn spin_until(mut cond: impl FnMut() -> bool, timeout: StdDuration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            std::thread::sleep(StdDuration::from_millis(1));
        }
        false
    }

    #[test]
    fn client_join_hook_fires_and_broadcast_reaches_it() {
        use meshwire_net::Socket;

        let port = 45_231;
        let server = Server::start(
            ServerConfig::new().with_port(port).with_tick_interval(Duration::from_millis(1)),
        )
        .expect("server start");

        let joined = Arc::new(Mutex::new(false));
        let joined2 = joined.clone();
        server.on_client_join(move |_conn| {
            *joined2.lock().unwrap() = true;
        });

        let client_stream = std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect");
        client_stream.set_nonblocking(true).expect("nonblocking");
        let client = Socket::connected(
            mio::net::TcpStream::from_std(client_stream),
            4096,
            Duration::from_secs(5),
        );

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        client.hooks().register_hook("pre_command", move |_, data| {
            if let Ok(cmd) = meshwire_wire::Command::decode(data) {
                received2.lock().unwrap().push(cmd);
            }
        });

        spin_until(
            || {
                let _ = client.authorize();
                client.runtime_update();
                client.is_authorized() && *joined.lock().unwrap()
            },
            StdDuration::from_secs(2),
        );
        assert!(*joined.lock().unwrap());

        server.broadcast_string("hello");
        spin_until(
            || {
                client.runtime_update();
                !received.lock().unwrap().is_empty()
            },
            StdDuration::from_secs(2),
        );

        let msgs = received.lock().unwrap();
        assert!(msgs.iter().any(|c| c.kind == CommandKind::String && c.as_str() == Some("hello")));

        server.stop();
    }

    #[test]
    fn expired_socket_survives_while_an_external_connection_holds_it() {
        use meshwire_net::Socket;

        let port = 45_232;
        let server = Server::start(
            ServerConfig::new().with_port(port).with_tick_interval(Duration::from_millis(1)),
        )
        .expect("server start");

        let client_stream = std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect");
        client_stream.set_nonblocking(true).expect("nonblocking");
        let client = Socket::connected(
            mio::net::TcpStream::from_std(client_stream),
            4096,
            Duration::from_secs(5),
        );
        spin_until(
            || {
                let _ = client.authorize();
                client.runtime_update();
                client.is_authorized() && server.get_client_count() == 1
            },
            StdDuration::from_secs(2),
        );

        let server_side_id = server.get_client_list()[0].id();
        let held_connection = server.connection(server_side_id).expect("present");

        // Drop the client side; the server's copy of the socket should be
        // shut down (invalid) but must not be freed while `held_connection`
        // is alive.
        drop(client);
        spin_until(|| !held_connection.is_connected(), StdDuration::from_secs(2));
        assert!(!held_connection.is_connected());
        // Holding the Connection doesn't crash or panic on further use.
        held_connection.send_string("into the void");

        server.stop();
    }
}
