use std::{
    net::TcpStream as StdTcpStream,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
};

use meshwire_block::Block;
use meshwire_conn::{Connection, ConnectionController};
use meshwire_net::{
    CLIENT_HANDSHAKE_RETRIES, CLIENT_HANDSHAKE_RETRY_GAP, Socket, SocketId, SocketRef, set_nodelay,
};
use meshwire_timing::Repeater;
use meshwire_wire::Command;

use crate::config::ClientConfig;

type ConnectCallback = Box<dyn Fn(Connection) + Send + Sync>;

struct ClientInner {
    config: ClientConfig,
    /// The single peer, or `None` between a disconnect and the next
    /// successful dial. `None` is also the signal the context thread polls
    /// to know it should redial.
    peer: RwLock<Option<Arc<Socket>>>,
    /// Consecutive handshake-write failures for the current peer; reset to
    /// zero whenever a fresh peer is installed. Drives the
    /// `CLIENT_HANDSHAKE_RETRIES` retry/gap policy.
    handshake_failures: AtomicUsize,
    handshake_retry_gate: Mutex<Repeater>,
    block: Block,
    on_connect: RwLock<Option<ConnectCallback>>,
    stop: AtomicBool,
    context_handle: Mutex<Option<JoinHandle<()>>>,
    runtime_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionController for ClientInner {
    fn resolve(&self, id: SocketId) -> Option<SocketRef> {
        let peer = self.peer.read().expect("client peer poisoned");
        peer.as_ref().filter(|s| s.id() == id).cloned().map(SocketRef::from)
    }
}

impl ClientInner {
    /// Attempts `TcpStream::connect` up to `config.connect_retries` times,
    /// sleeping `connect_retry_gap` between attempts. Installs the new
    /// [`Socket`] and fires hook setup on success.
    fn dial(self: &Arc<Self>) {
        for attempt in 1..=self.config.connect_retries {
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            match StdTcpStream::connect(self.config.server_addr) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!(%e, "couldn't set connected stream nonblocking");
                        continue;
                    }
                    let mio_stream = mio::net::TcpStream::from_std(stream);
                    set_nodelay(&mio_stream, true);
                    let socket = Arc::new(Socket::connected(
                        mio_stream,
                        self.config.max_payload_size,
                        self.config.handshake_timeout,
                    ));
                    tracing::info!(socket_id = socket.id(), attempt, "connected to server");
                    self.install_default_hooks(&socket);
                    self.handshake_failures.store(0, Ordering::Release);
                    *self.peer.write().expect("client peer poisoned") = Some(socket);
                    return;
                }
                Err(e) => {
                    tracing::warn!(%e, attempt, addr = %self.config.server_addr, "connect failed");
                    std::thread::sleep(self.config.connect_retry_gap.into());
                }
            }
        }
        tracing::error!(
            retries = self.config.connect_retries,
            "giving up on connecting to server after exhausting retries"
        );
    }

    fn install_default_hooks(self: &Arc<Self>, socket: &Arc<Socket>) {
        let controller: Arc<dyn ConnectionController> = self.clone();
        let conn = Connection::new(socket.id(), controller);
        let inner = self.clone();
        socket.hooks().register_hook("on_authorized", move |_, _| {
            if let Some(cb) = inner.on_connect.read().expect("on_connect poisoned").as_ref() {
                cb(conn.clone());
            }
        });
    }

    /// Advances the handshake for the current peer: an initial write attempt,
    /// then up to `CLIENT_HANDSHAKE_RETRIES` more (4 total), each gated
    /// `handshake_retry_gate` apart from the previous failure, before giving
    /// up and shutting the peer down (the context thread then redials).
    fn advance_handshake(&self, socket: &Socket) {
        if socket.handshake_timed_out() {
            tracing::warn!(socket_id = socket.id(), "handshake watchdog expired");
            socket.shutdown();
            return;
        }
        let first_attempt = self.handshake_failures.load(Ordering::Acquire) == 0;
        let due = first_attempt || self.handshake_retry_gate.lock().expect("gate poisoned").fired();
        if !due {
            return;
        }
        if let Err(e) = socket.authorize() {
            // Start the retry-gap clock from *this* failure, not from
            // construction — otherwise the gate's fires-immediately default
            // lets the 2nd attempt happen on the very next tick instead of
            // CLIENT_HANDSHAKE_RETRY_GAP later.
            self.handshake_retry_gate.lock().expect("gate poisoned").reset();
            let failures = self.handshake_failures.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::warn!(socket_id = socket.id(), %e, failures, "handshake write failed");
            if failures > CLIENT_HANDSHAKE_RETRIES as usize {
                tracing::error!(
                    socket_id = socket.id(),
                    "giving up on handshake after exhausting retries"
                );
                socket.shutdown();
            }
        }
    }

    fn tick(self: &Arc<Self>) {
        let current = self.peer.read().expect("client peer poisoned").clone();
        let Some(socket) = current else { return };
        if !socket.is_valid() {
            tracing::info!(socket_id = socket.id(), "peer disconnected");
            *self.peer.write().expect("client peer poisoned") = None;
            return;
        }
        if !socket.is_authorized() {
            self.advance_handshake(&socket);
        } else {
            socket.runtime_update();
        }
    }
}

fn context_loop(inner: Arc<ClientInner>) {
    while !inner.stop.load(Ordering::Acquire) {
        let needs_dial = inner.peer.read().expect("client peer poisoned").is_none();
        if needs_dial {
            inner.dial();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}

fn runtime_loop(inner: Arc<ClientInner>) {
    while !inner.stop.load(Ordering::Acquire) {
        inner.tick();
        std::thread::sleep(inner.config.tick_interval.into());
    }
}

/// Connects to a single server peer and drives its runtime tick on a
/// dedicated thread, redialing automatically if the connection drops.
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Spawns the context thread (dial + redial loop) and the runtime tick
    /// thread. Does not block waiting for the first connection to succeed —
    /// use [`Connection::is_connected`] or the `on_connect` hook to observe
    /// that.
    pub fn start(config: ClientConfig) -> Self {
        let inner = Arc::new(ClientInner {
            handshake_retry_gate: Mutex::new(Repeater::every(CLIENT_HANDSHAKE_RETRY_GAP)),
            config,
            peer: RwLock::new(None),
            handshake_failures: AtomicUsize::new(0),
            block: Block::new(),
            on_connect: RwLock::new(None),
            stop: AtomicBool::new(false),
            context_handle: Mutex::new(None),
            runtime_handle: Mutex::new(None),
        });

        let context_inner = inner.clone();
        let context_handle = std::thread::Builder::new()
            .name("meshwire-client-context".into())
            .spawn(move || context_loop(context_inner))
            .expect("failed to spawn client context thread");
        *inner.context_handle.lock().expect("context handle poisoned") = Some(context_handle);

        let runtime_inner = inner.clone();
        let runtime_handle = std::thread::Builder::new()
            .name("meshwire-client-runtime".into())
            .spawn(move || runtime_loop(runtime_inner))
            .expect("failed to spawn client runtime thread");
        *inner.runtime_handle.lock().expect("runtime handle poisoned") = Some(runtime_handle);

        Self { inner }
    }

    /// Installs the callback invoked every time this client completes a
    /// handshake with the server (including after an automatic reconnect).
    pub fn on_connect<F>(&self, cb: F)
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        *self.inner.on_connect.write().expect("on_connect poisoned") = Some(Box::new(cb));
    }

    pub fn block(&self) -> &Block {
        &self.inner.block
    }

    /// A facade over the current peer, if any. Stays a (silently inert)
    /// valid `Connection` even after the peer this snapshot pointed to is
    /// gone.
    pub fn connection(&self) -> Option<Connection> {
        let peer = self.inner.peer.read().expect("client peer poisoned");
        let socket = peer.as_ref()?;
        let controller: Arc<dyn ConnectionController> = self.inner.clone();
        Some(Connection::new(socket.id(), controller))
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .peer
            .read()
            .expect("client peer poisoned")
            .as_ref()
            .is_some_and(|s| s.is_authorized() && s.is_valid())
    }

    /// Enqueues a `STRING` command on the current peer. No-op if not
    /// connected.
    pub fn send_string(&self, s: impl Into<String>) {
        if let Some(conn) = self.connection() {
            conn.send_string(s);
        }
    }

    pub fn send_command(&self, cmd: Command) {
        if let Some(conn) = self.connection() {
            conn.send_command(cmd);
        }
    }

    /// Signals both background threads to stop, drops the peer, and waits
    /// for both threads to finish. Idempotent.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        if let Some(handle) =
            self.inner.context_handle.lock().expect("context handle poisoned").take()
        {
            let _ = handle.join();
        }
        if let Some(handle) =
            self.inner.runtime_handle.lock().expect("runtime handle poisoned").take()
        {
            let _ = handle.join();
        }
        if let Some(peer) = self.inner.peer.write().expect("client peer poisoned").take() {
            peer.shutdown();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}
