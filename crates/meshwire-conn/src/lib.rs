//! Safe facade over a [`SocketRef`]: a copyable value wrapping a
//! `Server`/`Client`-owned `Socket` that degrades to silent no-ops once its
//! underlying socket is gone, instead of forcing every call site to juggle
//! `Option<SocketRef>`.

use std::sync::Arc;

use meshwire_hooks::HookId;
use meshwire_net::{Socket, SocketId, SocketRef};
use meshwire_wire::Command;

/// Resolves a [`SocketId`] to a live [`SocketRef`]. Implemented by both the
/// server and client runtimes so [`Connection`] can stay agnostic of which
/// one created it — a lookup failing (unknown id, controller shut down) is
/// not an error, just "not connected".
pub trait ConnectionController: Send + Sync {
    fn resolve(&self, id: SocketId) -> Option<SocketRef>;
}

/// A copyable handle to a peer, safe to hold past the peer's disconnection
/// or destruction. Every method first resolves the live [`SocketRef`]
/// through the controller; if that fails, the call is a silent no-op:
/// `send_string` drops the message, `is_connected` returns `false`,
/// `register_global_hook` registers nothing and returns `None`.
#[derive(Clone)]
pub struct Connection {
    id: SocketId,
    controller: Arc<dyn ConnectionController>,
}

impl Connection {
    pub fn new(id: SocketId, controller: Arc<dyn ConnectionController>) -> Self {
        Self { id, controller }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    fn resolve(&self) -> Option<SocketRef> {
        self.controller.resolve(self.id)
    }

    /// `false` if the underlying socket can't be resolved or has been shut
    /// down.
    pub fn is_connected(&self) -> bool {
        self.resolve().is_some_and(|s| s.is_valid())
    }

    /// Current peer name, refreshed from the live socket on every call.
    /// Empty string if the socket can't be resolved.
    pub fn name(&self) -> String {
        self.resolve().map(|s| s.name()).unwrap_or_default()
    }

    /// Builds and enqueues a `STRING` command. No-op if the peer is gone.
    pub fn send_string(&self, s: impl Into<String>) {
        if let Some(socket) = self.resolve() {
            socket.send_command(Command::string(s));
        }
    }

    /// Enqueues an arbitrary command. No-op if the peer is gone.
    pub fn send_command(&self, cmd: Command) {
        if let Some(socket) = self.resolve() {
            socket.send_command(cmd);
        }
    }

    /// Registers a global hook on the underlying socket's registry, wrapping
    /// the callback so it observes this `Connection` rather than the raw
    /// `Socket`. Returns `None` without registering anything if the peer
    /// can't be resolved right now.
    pub fn register_global_hook<F>(&self, cb: F) -> Option<HookId>
    where
        F: Fn(&Connection, &str, &[u8]) -> bool + Send + Sync + 'static,
    {
        let socket = self.resolve()?;
        let conn = self.clone();
        Some(socket.hooks().register_global_hook(move |_socket: &Socket, name, data| {
            cb(&conn, name, data)
        }))
    }

    /// Registers a named hook, wrapped the same way as
    /// [`register_global_hook`](Self::register_global_hook).
    pub fn register_hook<F>(&self, name: impl Into<String>, cb: F) -> Option<HookId>
    where
        F: Fn(&Connection, &[u8]) + Send + Sync + 'static,
    {
        let socket = self.resolve()?;
        let conn = self.clone();
        Some(socket.hooks().register_hook(name, move |_socket: &Socket, data| {
            cb(&conn, data);
        }))
    }

    pub fn unregister_hook(&self, id: HookId) {
        if let Some(socket) = self.resolve() {
            socket.hooks().unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use meshwire_net::Socket;
    use meshwire_timing::Duration;

    use super::*;

    struct SingleSocket(Option<Arc<Socket>>);

    impl ConnectionController for SingleSocket {
        fn resolve(&self, id: SocketId) -> Option<SocketRef> {
            self.0.as_ref().filter(|s| s.id() == id).cloned().map(SocketRef::from)
        }
    }

    fn loopback_socket() -> Arc<Socket> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let client = std::net::TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        server.set_nonblocking(true).expect("nonblocking");
        client.set_nonblocking(true).expect("nonblocking");
        drop(client);
        Arc::new(Socket::accepted(
            mio::net::TcpStream::from_std(server),
            4096,
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn unresolvable_connection_is_silently_inert() {
        let controller = Arc::new(SingleSocket(None));
        let conn = Connection::new(1, controller);

        assert!(!conn.is_connected());
        assert_eq!(conn.name(), "");
        conn.send_string("hello"); // must not panic
        assert!(conn.register_global_hook(|_, _, _| true).is_none());
    }

    #[test]
    fn resolvable_connection_reports_connected_and_forwards_hooks() {
        let socket = loopback_socket();
        let id = socket.id();
        let controller = Arc::new(SingleSocket(Some(socket)));
        let conn = Connection::new(id, controller);

        assert!(conn.is_connected());

        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let hook_id = conn
            .register_hook("evt", move |observed, _| {
                fired2.store(observed.is_connected(), Ordering::SeqCst);
            })
            .expect("socket resolvable");

        // Trigger through the raw socket's hook registry, as the server
        // runtime would when processing a command.
        let raw = conn.resolve().expect("resolvable");
        raw.hooks().trigger(&raw, "evt", &[]); // Deref coercion: &SocketRef -> &Socket
        assert!(fired.load(Ordering::SeqCst));

        conn.unregister_hook(hook_id);
    }
}
