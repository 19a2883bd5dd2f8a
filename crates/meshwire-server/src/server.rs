use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use meshwire_block::Block;
use meshwire_conn::{Connection, ConnectionController};
use meshwire_net::{Socket, SocketId, SocketRef, set_nodelay, set_send_timeout};
use meshwire_timing::Repeater;
use meshwire_wire::{Command, CommandKind};

use crate::config::ServerConfig;

type JoinClientCallback = Box<dyn Fn(Connection) + Send + Sync>;

struct ServerInner {
    config: ServerConfig,
    sockets: RwLock<HashMap<SocketId, Arc<Socket>>>,
    /// Shut-down sockets that an external `SocketRef`/`Connection` still
    /// holds onto. Swept by the ping clock once nothing but this list holds
    /// the last reference.
    expired: Mutex<Vec<Arc<Socket>>>,
    block: Block,
    on_client_join: RwLock<Option<JoinClientCallback>>,
    stop: AtomicBool,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    runtime_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionController for ServerInner {
    fn resolve(&self, id: SocketId) -> Option<SocketRef> {
        let sockets = self.sockets.read().expect("server socket list poisoned");
        sockets.get(&id).cloned().map(SocketRef::from)
    }
}

impl ServerInner {
    fn accept_connection(self: &Arc<Self>, stream: std::net::TcpStream, addr: SocketAddr) {
        if let Some(limit) = self.config.connection_limit {
            let count = self.sockets.read().expect("server socket list poisoned").len();
            if count >= limit {
                tracing::warn!(?addr, limit, "refusing connection: at connection_limit");
                let _ = stream.shutdown(std::net::Shutdown::Both);
                return;
            }
        }
        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(%e, ?addr, "couldn't set accepted stream nonblocking");
            return;
        }
        let mio_stream = mio::net::TcpStream::from_std(stream);
        set_nodelay(&mio_stream, true);
        set_send_timeout(&mio_stream, self.config.send_timeout);

        let socket = Arc::new(Socket::accepted(
            mio_stream,
            self.config.max_payload_size,
            self.config.handshake_timeout,
        ));
        socket.set_name(addr.to_string());
        tracing::info!(?addr, socket_id = socket.id(), "client connected");
        self.install_default_hooks(&socket);
        self.sockets.write().expect("server socket list poisoned").insert(socket.id(), socket);
    }

    /// Registers the two hooks every accepted socket carries:
    /// `on_authorized` forwards to the user's `on_client_join` callback, and
    /// `pre_command` echoes a `RESPONSE` back immediately whenever one
    /// arrives — the client's own default handler answers a `PING` with a
    /// `RESPONSE`, and this hook answers that `RESPONSE` with one more, so
    /// the keepalive round trip is observable end to end without the client
    /// needing any extra logic of its own.
    fn install_default_hooks(self: &Arc<Self>, socket: &Arc<Socket>) {
        let controller: Arc<dyn ConnectionController> = self.clone();
        let conn = Connection::new(socket.id(), controller);
        let inner = self.clone();
        socket.hooks().register_hook("on_authorized", move |_, _| {
            if let Some(cb) = inner.on_client_join.read().expect("on_client_join poisoned").as_ref()
            {
                cb(conn.clone());
            }
        });
        socket.hooks().register_hook("pre_command", |sock, data| {
            if let Ok(cmd) = Command::decode(data) {
                if cmd.kind == CommandKind::Response {
                    sock.send_command(Command::response());
                }
            }
        });
    }

    /// One runtime tick: sweep dead sockets into (or out of) the expired
    /// list, advance handshakes, drain queues, and fire the ping clock.
    fn tick(self: &Arc<Self>, ping_repeater: &mut Repeater) {
        let mut newly_expired = Vec::new();
        {
            let mut sockets = self.sockets.write().expect("server socket list poisoned");
            sockets.retain(|_, sock| {
                if sock.is_valid() || sock.is_authorizing() {
                    return true;
                }
                if Arc::strong_count(sock) > 1 {
                    newly_expired.push(sock.clone());
                }
                false
            });
        }
        if !newly_expired.is_empty() {
            self.expired.lock().expect("expired list poisoned").extend(newly_expired);
        }

        {
            let sockets = self.sockets.read().expect("server socket list poisoned");
            for sock in sockets.values() {
                if !sock.is_valid() {
                    continue; // invalid but still authorizing or externally held; wait it out
                }
                if !sock.is_authorized() {
                    if sock.handshake_timed_out() {
                        tracing::warn!(socket_id = sock.id(), "handshake watchdog expired");
                        sock.shutdown();
                    } else {
                        let _ = sock.authorize();
                    }
                } else {
                    sock.runtime_update();
                }
            }
        }

        ping_repeater.maybe(|_elapsed| {
            let sockets = self.sockets.read().expect("server socket list poisoned");
            for sock in sockets.values() {
                if sock.is_authorized() {
                    sock.send_command(Command::ping());
                }
            }
            self.expired.lock().expect("expired list poisoned").retain(|sock| Arc::strong_count(sock) > 1);
        });
    }
}

fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener) {
    if let Err(e) = listener.set_nonblocking(true) {
        tracing::error!(%e, "couldn't set listener nonblocking; accept loop exiting");
        return;
    }
    while !inner.stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, addr)) => inner.accept_connection(stream, addr),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Err(e) => {
                tracing::warn!(%e, "accept() failed");
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }
}

fn runtime_loop(inner: Arc<ServerInner>) {
    let mut ping_repeater = Repeater::every(inner.config.ping_interval);
    while !inner.stop.load(Ordering::Acquire) {
        inner.tick(&mut ping_repeater);
        std::thread::sleep(inner.config.tick_interval.into());
    }
}

/// Accepts many peers on a TCP port, authorizes each against the fixed
/// shared secret, and drives their runtime ticks (keepalive ping, inbound
/// dispatch, outbound flush) on a dedicated thread.
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Binds `config.port` (and optional `bind_ip`), then starts the accept
    /// thread and the ~2 ms runtime tick thread. Returns an error only if
    /// the initial bind fails; everything after that degrades by logging
    /// rather than propagating.
    pub fn start(config: ServerConfig) -> std::io::Result<Self> {
        let ip = config.bind_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let listener = TcpListener::bind(SocketAddr::new(ip, config.port))?;
        tracing::info!(addr = ?listener.local_addr().ok(), "server listening");

        let inner = Arc::new(ServerInner {
            config,
            sockets: RwLock::new(HashMap::new()),
            expired: Mutex::new(Vec::new()),
            block: Block::new(),
            on_client_join: RwLock::new(None),
            stop: AtomicBool::new(false),
            accept_handle: Mutex::new(None),
            runtime_handle: Mutex::new(None),
        });

        let accept_inner = inner.clone();
        let accept_handle =
            std::thread::Builder::new()
                .name("meshwire-server-accept".into())
                .spawn(move || accept_loop(accept_inner, listener))
                .expect("failed to spawn accept thread");
        *inner.accept_handle.lock().expect("accept handle poisoned") = Some(accept_handle);

        let runtime_inner = inner.clone();
        let runtime_handle = std::thread::Builder::new()
            .name("meshwire-server-runtime".into())
            .spawn(move || runtime_loop(runtime_inner))
            .expect("failed to spawn runtime thread");
        *inner.runtime_handle.lock().expect("runtime handle poisoned") = Some(runtime_handle);

        Ok(Self { inner })
    }

    /// Installs the callback invoked every time a peer completes the
    /// handshake (the accept-side `on_authorized` hook).
    pub fn on_client_join<F>(&self, cb: F)
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        *self.inner.on_client_join.write().expect("on_client_join poisoned") = Some(Box::new(cb));
    }

    /// The server-maintained named-blob store shared across all peers.
    pub fn block(&self) -> &Block {
        &self.inner.block
    }

    /// Enqueues a `STRING` command to every currently-authorized peer.
    pub fn broadcast_string(&self, s: impl Into<String>) {
        let s = s.into();
        let sockets = self.inner.sockets.read().expect("server socket list poisoned");
        for sock in sockets.values() {
            if sock.is_authorized() {
                sock.send_command(Command::string(s.clone()));
            }
        }
    }

    /// Enqueues an arbitrary command to every currently-authorized peer.
    pub fn broadcast(&self, cmd: Command) {
        let sockets = self.inner.sockets.read().expect("server socket list poisoned");
        for sock in sockets.values() {
            if sock.is_authorized() {
                sock.send_command(cmd.clone());
            }
        }
    }

    pub fn get_client_count(&self) -> usize {
        self.inner.sockets.read().expect("server socket list poisoned").len()
    }

    /// Snapshot of every currently-tracked peer as a [`Connection`] facade.
    pub fn get_client_list(&self) -> Vec<Connection> {
        let controller: Arc<dyn ConnectionController> = self.inner.clone();
        let sockets = self.inner.sockets.read().expect("server socket list poisoned");
        sockets.keys().map(|&id| Connection::new(id, controller.clone())).collect()
    }

    /// Looks up a single peer by id, if it is still tracked.
    pub fn connection(&self, id: SocketId) -> Option<Connection> {
        let controller: Arc<dyn ConnectionController> = self.inner.clone();
        self.inner.sockets.read().expect("server socket list poisoned").contains_key(&id).then(
            || Connection::new(id, controller),
        )
    }

    /// Signals both background threads to stop, clears the socket list, and
    /// waits for both threads to finish. Idempotent: calling this twice
    /// just joins already-finished handles.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        if let Some(handle) = self.inner.accept_handle.lock().expect("accept handle poisoned").take()
        {
            let _ = handle.join();
        }
        if let Some(handle) =
            self.inner.runtime_handle.lock().expect("runtime handle poisoned").take()
        {
            let _ = handle.join();
        }
        let mut sockets = self.inner.sockets.write().expect("server socket list poisoned");
        for sock in sockets.values() {
            sock.shutdown();
        }
        sockets.clear();
        self.inner.expired.lock().expect("expired list poisoned").clear();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
