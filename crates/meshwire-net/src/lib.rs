//! Connection-level transport: handshake authorization, length-prefixed
//! frame reassembly, and a double-buffered outbound writer, all driven by
//! non-blocking `mio` sockets.
//!
//! This crate knows nothing about accept loops, dial loops, or keepalive
//! scheduling — that belongs to the server and client runtimes built on top
//! of [`Socket`]. What it owns is the per-connection state machine: the
//! 128-byte shared-secret handshake, frame-level I/O, and the hook registry
//! each socket carries so callers can observe `on_authorized`,
//! `pre_command`, and `on_disconnected` without reaching into private state.

mod error;
mod io;
mod proto;
mod socket;
mod socket_ref;
mod sockopt;

pub use error::SocketError;
pub use proto::{
    CLIENT_HANDSHAKE_RETRIES, CLIENT_HANDSHAKE_RETRY_GAP, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_MAX_PAYLOAD_SIZE, MAX_CONSECUTIVE_ERRORS, OUTBOUND_SOFT_CAP, OUTGOING_BATCH_SIZE,
    PROTO_ACCESS_LEN,
};
pub use socket::{Role, Socket, SocketId};
pub use socket_ref::SocketRef;
pub use sockopt::{set_nodelay, set_send_timeout};

#[cfg(test)]
mod tests {
    use std::{
        net::TcpListener as StdTcpListener,
        time::Duration as StdDuration,
    };

    use meshwire_timing::Duration;
    use meshwire_wire::Command;
    use mio::net::TcpStream;

    use super::*;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let client = std::net::TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        server.set_nonblocking(true).expect("nonblocking");
        client.set_nonblocking(true).expect("nonblocking");
        (TcpStream::from_std(server), TcpStream::from_std(client))
    }

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
    fn handshake_authorizes_both_sides() {
        let (server_stream, client_stream) = connected_pair();
        let server = Socket::accepted(server_stream, 4096, Duration::from_secs(5));
        let client = Socket::connected(client_stream, 4096, Duration::from_secs(5));

        spin_until(
            || {
                let _ = server.authorize();
                let _ = client.authorize();
                server.is_authorized() && client.is_authorized()
            },
            StdDuration::from_secs(2),
        );

        assert!(server.is_authorized());
        assert!(client.is_authorized());
        assert!(!server.is_authorizing());
        assert!(!client.is_authorizing());
    }

    #[test]
    fn frame_round_trips_after_authorization() {
        let (server_stream, client_stream) = connected_pair();
        let server = Socket::accepted(server_stream, 4096, Duration::from_secs(5));
        let client = Socket::connected(client_stream, 4096, Duration::from_secs(5));

        spin_until(
            || {
                let _ = server.authorize();
                let _ = client.authorize();
                server.is_authorized() && client.is_authorized()
            },
            StdDuration::from_secs(2),
        );

        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received2 = received.clone();
        server.hooks().register_hook("pre_command", move |_, data| {
            received2.lock().unwrap().push(Command::decode(data).expect("decode"));
        });

        client.send_command(Command::string("hello"));
        spin_until(
            || {
                client.runtime_update();
                server.runtime_update();
                !received.lock().unwrap().is_empty()
            },
            StdDuration::from_secs(2),
        );

        assert_eq!(received.lock().unwrap()[0].as_str(), Some("hello"));
    }

    #[test]
    fn vetoing_global_pre_command_hook_does_not_skip_kind_dispatch_or_post_command() {
        let (server_stream, client_stream) = connected_pair();
        let server = Socket::accepted(server_stream, 4096, Duration::from_secs(5));
        let client = Socket::connected(client_stream, 4096, Duration::from_secs(5));

        spin_until(
            || {
                let _ = server.authorize();
                let _ = client.authorize();
                server.is_authorized() && client.is_authorized()
            },
            StdDuration::from_secs(2),
        );

        // A global `pre_command` hook that vetoes dispatch must still let
        // the socket's own default PING->RESPONSE action and `post_command`
        // run; the veto only short-circuits other hooks of the same event.
        server.hooks().register_global_hook(|_, _name, _data| false);
        let post_command_ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let post_command_ran2 = post_command_ran.clone();
        server.hooks().register_hook("post_command", move |_, _| {
            post_command_ran2.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        client.send_command(Command::ping());
        let response_received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let response_received2 = response_received.clone();
        client.hooks().register_hook("pre_command", move |_, data| {
            response_received2.lock().unwrap().push(Command::decode(data).expect("decode"));
        });

        spin_until(
            || {
                client.runtime_update();
                server.runtime_update();
                client.runtime_update();
                !response_received.lock().unwrap().is_empty()
            },
            StdDuration::from_secs(2),
        );

        assert_eq!(response_received.lock().unwrap()[0].kind, meshwire_wire::CommandKind::Response);
        assert!(post_command_ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn mismatched_secret_never_authorizes() {
        use std::io::Write;

        let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let mut bogus_client = std::net::TcpStream::connect(addr).expect("connect");
        let (server_std, _) = listener.accept().expect("accept");
        server_std.set_nonblocking(true).expect("nonblocking");
        bogus_client.write_all(&[0u8; PROTO_ACCESS_LEN]).expect("write garbage");

        let server = Socket::accepted(TcpStream::from_std(server_std), 4096, Duration::from_millis(200));
        spin_until(|| server.authorize().is_ok(), StdDuration::from_millis(500));

        assert!(!server.is_authorized());
        std::thread::sleep(StdDuration::from_millis(250));
        assert!(server.handshake_timed_out());
    }
}
