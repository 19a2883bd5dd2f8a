use std::{
    collections::VecDeque,
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use meshwire_hooks::Hookable;
use meshwire_timing::{Duration, Instant};
use meshwire_wire::{Command, CommandKind};
use mio::net::TcpStream;

use crate::{
    error::SocketError,
    io::{ConnIo, HandshakeRead, HandshakeWrite},
    proto::{MAX_CONSECUTIVE_ERRORS, OUTBOUND_SOFT_CAP, OUTGOING_BATCH_SIZE},
};

pub type SocketId = u64;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_socket_id() -> SocketId {
    NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed)
}

/// Which side of the handshake a socket plays: the server reads the shared
/// secret off the wire, the client writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

enum HandshakeIo {
    Server(HandshakeRead),
    Client(HandshakeWrite),
}

/// One TCP connection, from either the accepting or the dialing side.
///
/// A `Socket` moves through three observable states: not yet authorized
/// (`is_authorizing`), authorized (`is_authorized`), and shut down
/// (`!is_valid`). Reads happen as soon as the underlying stream is
/// readable; writes are batched through a double-buffered queue so a burst
/// of `send_command` calls never blocks on the wire.
pub struct Socket {
    id: SocketId,
    role: Role,
    name: RwLock<String>,
    valid: AtomicBool,
    authorizing: AtomicBool,
    authorized: AtomicBool,
    consecutive_errors: AtomicUsize,
    handshake_started: Instant,
    handshake_timeout: Duration,
    handshake_io: Mutex<HandshakeIo>,
    io: Mutex<ConnIo>,
    inbound: Mutex<VecDeque<Command>>,
    outbound: Mutex<VecDeque<Command>>,
    hooks: Hookable<Socket>,
}

impl Socket {
    /// Wraps a freshly-accepted inbound connection. The server reads the
    /// handshake secret off the wire to authorize it.
    pub fn accepted(stream: TcpStream, max_payload_size: usize, handshake_timeout: Duration) -> Self {
        Self::new(Role::Server, stream, max_payload_size, handshake_timeout)
    }

    /// Wraps a freshly-established outbound connection. The client writes
    /// the handshake secret onto the wire to authorize it.
    pub fn connected(stream: TcpStream, max_payload_size: usize, handshake_timeout: Duration) -> Self {
        Self::new(Role::Client, stream, max_payload_size, handshake_timeout)
    }

    fn new(
        role: Role,
        stream: TcpStream,
        max_payload_size: usize,
        handshake_timeout: Duration,
    ) -> Self {
        let handshake_io = match role {
            Role::Server => HandshakeIo::Server(HandshakeRead::default()),
            Role::Client => HandshakeIo::Client(HandshakeWrite::default()),
        };
        Self {
            id: next_socket_id(),
            role,
            name: RwLock::new(String::new()),
            valid: AtomicBool::new(true),
            authorizing: AtomicBool::new(true),
            authorized: AtomicBool::new(false),
            consecutive_errors: AtomicUsize::new(0),
            handshake_started: Instant::now(),
            handshake_timeout,
            handshake_io: Mutex::new(handshake_io),
            io: Mutex::new(ConnIo::new(stream, max_payload_size)),
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            hooks: Hookable::new(),
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> String {
        self.name.read().expect("socket name lock poisoned").clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().expect("socket name lock poisoned") = name.into();
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn is_authorizing(&self) -> bool {
        self.authorizing.load(Ordering::Acquire)
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    pub fn hooks(&self) -> &Hookable<Socket> {
        &self.hooks
    }

    /// Queues `cmd` for delivery. Silently dropped if the socket has already
    /// been shut down — callers that need delivery confirmation should
    /// check [`is_valid`](Self::is_valid) first.
    ///
    /// If the outbound queue is already over [`OUTBOUND_SOFT_CAP`], the
    /// caller cooperatively yields with short sleeps until it drains back
    /// under the cap (or the socket goes invalid), so a runaway producer
    /// cannot grow the queue without bound. This is a spin with a 1ms
    /// sleep, not a condition variable.
    pub fn send_command(&self, cmd: Command) {
        if !self.is_valid() {
            return;
        }
        while self.is_valid() {
            let len = self.outbound.lock().expect("outbound queue poisoned").len();
            if len <= OUTBOUND_SOFT_CAP {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        if !self.is_valid() {
            return;
        }
        self.outbound.lock().expect("outbound queue poisoned").push_back(cmd);
    }

    fn shutdown_with_reason(&self, reason: &str) {
        // Unconditional, not just on the first call: a socket that times
        // out mid-handshake must stop reporting `is_authorizing` even
        // though it never reached `authorized`.
        self.authorizing.store(false, Ordering::Release);
        if self.valid.swap(false, Ordering::AcqRel) {
            tracing::debug!(socket_id = self.id, reason, "socket shut down");
            // A live SocketRef elsewhere keeps this Socket's memory around,
            // but the peer must see the connection go away immediately, so
            // close the fd now rather than waiting on Drop.
            let io = self.io.lock().expect("socket io lock poisoned");
            let _ = io.stream.shutdown(std::net::Shutdown::Both);
            drop(io);
            self.hooks.trigger(self, "on_disconnected", &[]);
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_with_reason("requested");
    }

    /// A closed peer cannot recover by retrying, so it shuts the socket down
    /// immediately. Any other I/O error counts toward the transient-error
    /// budget instead — a single dropped read or write does not tear the
    /// connection down, and only the 5th consecutive one does (`> 4`, not
    /// `>= 4`).
    fn note_error(&self, err: SocketError) {
        match err {
            SocketError::Closed => {
                tracing::debug!(socket_id = self.id, "peer closed the connection");
                self.shutdown_with_reason("peer closed the connection");
            }
            SocketError::Io(_) => {
                let count = self.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::warn!(socket_id = self.id, %err, count, "socket transport error");
                self.hooks.trigger(self, "internal_error", err.to_string().as_bytes());
                if count > MAX_CONSECUTIVE_ERRORS {
                    self.shutdown_with_reason("too many consecutive transport errors");
                }
            }
        }
    }

    fn note_success(&self) {
        self.consecutive_errors.store(0, Ordering::Release);
    }

    /// Advances the handshake. Returns `Ok(true)` the tick authorization
    /// completes, `Ok(false)` while still in progress. The caller is
    /// responsible for enforcing `handshake_timeout` via
    /// [`handshake_elapsed`](Self::handshake_elapsed) and shutting the
    /// socket down on expiry.
    pub fn authorize(&self) -> Result<bool, SocketError> {
        if self.authorized.load(Ordering::Acquire) {
            return Ok(true);
        }
        let mut handshake_io = self.handshake_io.lock().expect("handshake lock poisoned");
        let mut io = self.io.lock().expect("socket io lock poisoned");
        let done = match &mut *handshake_io {
            HandshakeIo::Server(r) => r.poll(&mut io.stream)?,
            HandshakeIo::Client(w) => w.poll(&mut io.stream)?,
        };
        drop(io);
        drop(handshake_io);
        if done {
            self.authorizing.store(false, Ordering::Release);
            self.authorized.store(true, Ordering::Release);
            let role = self.role;
            tracing::debug!(socket_id = self.id, ?role, "socket authorized");
            self.hooks.trigger(self, "on_authorized", &[]);
        }
        Ok(done)
    }

    pub fn handshake_elapsed(&self) -> Duration {
        self.handshake_started.elapsed()
    }

    pub fn handshake_timed_out(&self) -> bool {
        self.is_authorizing() && self.handshake_elapsed() >= self.handshake_timeout
    }

    /// Drains whatever frames are currently readable into the inbound
    /// queue, processes every queued command (`pre_command` hooks, the
    /// kind-dispatched default action, `post_command` hooks), flushes
    /// whatever is queued for writing, and reports transport errors back
    /// through the error-policy counter rather than propagating them — a
    /// single bad read does not tear the connection down immediately.
    pub fn runtime_update(&self) {
        if !self.is_valid() {
            return;
        }
        if let Err(e) = self.pump_reads() {
            self.note_error(e);
            return;
        }
        self.drain_inbound();
        if let Err(e) = self.pump_writes() {
            self.note_error(e);
            return;
        }
        self.note_success();
    }

    fn pump_reads(&self) -> Result<(), SocketError> {
        let payloads = {
            let mut io = self.io.lock().expect("socket io lock poisoned");
            io.reader.poll(&mut io.stream)?
        };
        for payload in payloads {
            match Command::decode(&payload) {
                Ok(cmd) => self.inbound.lock().expect("inbound queue poisoned").push_back(cmd),
                Err(e) => {
                    tracing::warn!(socket_id = self.id, %e, "dropping malformed frame");
                }
            }
        }
        Ok(())
    }

    fn drain_inbound(&self) {
        loop {
            let cmd = self.inbound.lock().expect("inbound queue poisoned").pop_front();
            let Some(cmd) = cmd else { break };
            self.process_command(cmd);
        }
    }

    /// Mirrors the default per-command pipeline: `pre_command` hooks run
    /// first, then the one built-in default action (a `PING` always earns an
    /// immediate `RESPONSE`), then `post_command` hooks — unconditionally,
    /// all three steps. `Hookable::trigger`'s `bool` return only tells the
    /// registry whether a global hook vetoed *further hooks of that same
    /// event*; it is not a signal for this caller to skip its own kind
    /// dispatch or the next hook. Both hooks receive the command's
    /// archive-encoded form — `kind` and `data` together — rather than the
    /// raw payload, so listeners can recover the full command with
    /// [`Command::decode`].
    fn process_command(&self, cmd: Command) {
        let encoded = cmd.encode();
        self.hooks.trigger(self, "pre_command", &encoded);
        if cmd.kind == CommandKind::Ping {
            self.send_command(Command::response());
        }
        self.hooks.trigger(self, "post_command", &encoded);
    }

    /// Mirrors `process_outgoing_commands`: drains up to
    /// [`OUTGOING_BATCH_SIZE`] queued commands into the writer's pending
    /// buffer (one call per runtime tick — a producer that outpaces this
    /// simply sees its commands carried over to the next tick), then
    /// flushes whatever the writer can push onto the wire right now.
    fn pump_writes(&self) -> Result<(), SocketError> {
        let mut outbound = self.outbound.lock().expect("outbound queue poisoned");
        let mut io = self.io.lock().expect("socket io lock poisoned");
        for _ in 0..OUTGOING_BATCH_SIZE {
            let Some(cmd) = outbound.pop_front() else { break };
            let encoded = cmd.encode();
            if encoded.is_empty() {
                tracing::warn!(socket_id = self.id, "skipping zero-length encoded command");
                continue;
            }
            io.writer.enqueue(&encoded);
        }
        drop(outbound);
        io.writer.poll(&mut io.stream)?;
        Ok(())
    }

    /// Queues a zero-length keepalive frame.
    pub fn send_keepalive(&self) {
        if !self.is_valid() {
            return;
        }
        let mut io = self.io.lock().expect("socket io lock poisoned");
        io.writer.enqueue_keepalive();
    }

    /// Blocks the calling thread until the outbound queue and write buffers
    /// drain, or `timeout` elapses. Intended for tests and graceful
    /// shutdown, not the runtime hot path.
    pub fn wait_for_flush(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            let drained = {
                let outbound = self.outbound.lock().expect("outbound queue poisoned");
                let io = self.io.lock().expect("socket io lock poisoned");
                outbound.is_empty() && !io.writer.has_pending()
            };
            if drained {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
