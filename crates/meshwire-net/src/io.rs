use std::io::{ErrorKind, Read, Write};

use mio::net::TcpStream;

use crate::{
    error::SocketError,
    proto::{PROTO_ACCESS, PROTO_ACCESS_LEN},
};

/// Progress reading the fixed-size handshake secret off the wire.
pub(crate) struct HandshakeRead {
    buf: [u8; PROTO_ACCESS_LEN],
    have: usize,
}

impl Default for HandshakeRead {
    fn default() -> Self {
        Self { buf: [0u8; PROTO_ACCESS_LEN], have: 0 }
    }
}

impl HandshakeRead {
    /// Pulls whatever is currently readable off `stream`. Returns `Ok(true)`
    /// once the full secret has arrived and matched, `Ok(false)` if more
    /// bytes are still expected or the secret that did arrive does not
    /// match (a mismatch is not itself an error — the caller's handshake
    /// watchdog is what eventually shuts the connection down), and an error
    /// only on EOF or a genuine I/O failure.
    pub(crate) fn poll(&mut self, stream: &mut TcpStream) -> Result<bool, SocketError> {
        loop {
            if self.have == PROTO_ACCESS_LEN {
                return Ok(self.buf == PROTO_ACCESS);
            }
            match stream.read(&mut self.buf[self.have..]) {
                Ok(0) => return Err(SocketError::Closed),
                Ok(n) => self.have += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Progress writing the fixed-size handshake secret onto the wire.
#[derive(Default)]
pub(crate) struct HandshakeWrite {
    sent: usize,
}

impl HandshakeWrite {
    pub(crate) fn poll(&mut self, stream: &mut TcpStream) -> Result<bool, SocketError> {
        loop {
            if self.sent == PROTO_ACCESS_LEN {
                return Ok(true);
            }
            match stream.write(&PROTO_ACCESS[self.sent..]) {
                Ok(0) => return Err(SocketError::Closed),
                Ok(n) => self.sent += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// State machine for reassembling length-prefixed frames off the wire. A
/// frame with `len == 0` is a keepalive: it carries no payload and is
/// swallowed by [`RxState::poll`] without ever surfacing to the caller.
///
/// `max_payload_size` bounds the size of a single chunk read into `chunk`,
/// not the total size of a frame: a frame bigger than `max_payload_size` is
/// reassembled from however many chunks it takes, each copied into `data` as
/// it completes. Production deployments want this large (so a typical frame
/// lands in one read); a small value forces the multi-chunk path under
/// test.
enum RxState {
    Header { buf: [u8; meshwire_wire::FRAME_HEADER_SIZE], have: usize },
    Payload { data: Vec<u8>, remaining: usize, chunk: Vec<u8>, have: usize },
}

impl RxState {
    fn header() -> Self {
        Self::Header { buf: [0u8; meshwire_wire::FRAME_HEADER_SIZE], have: 0 }
    }

    fn payload(len: usize, max_payload_size: usize) -> Self {
        let chunk_len = len.min(max_payload_size.max(1));
        Self::Payload { data: Vec::with_capacity(len), remaining: len, chunk: vec![0u8; chunk_len], have: 0 }
    }
}

pub(crate) struct FrameReader {
    state: RxState,
    max_payload_size: usize,
}

impl FrameReader {
    pub(crate) fn new(max_payload_size: usize) -> Self {
        Self { state: RxState::header(), max_payload_size }
    }

    /// Drains everything currently readable from `stream`, returning every
    /// fully-reassembled payload in arrival order. Stops at the first
    /// would-block; callers loop this from the readiness-driven poll.
    pub(crate) fn poll(&mut self, stream: &mut TcpStream) -> Result<Vec<Vec<u8>>, SocketError> {
        let max_payload_size = self.max_payload_size;
        let mut out = Vec::new();
        loop {
            match &mut self.state {
                RxState::Header { buf, have } => match stream.read(&mut buf[*have..]) {
                    Ok(0) => return Err(SocketError::Closed),
                    Ok(n) => {
                        *have += n;
                        if *have < buf.len() {
                            continue;
                        }
                        let len = meshwire_wire::read_frame_len(buf) as usize;
                        if len == 0 {
                            self.state = RxState::header();
                            continue;
                        }
                        self.state = RxState::payload(len, max_payload_size);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(out),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                },
                RxState::Payload { data, remaining, chunk, have } => {
                    match stream.read(&mut chunk[*have..]) {
                        Ok(0) => return Err(SocketError::Closed),
                        Ok(n) => {
                            *have += n;
                            if *have < chunk.len() {
                                continue;
                            }
                            data.extend_from_slice(chunk);
                            *remaining -= chunk.len();
                            if *remaining == 0 {
                                let RxState::Payload { data, .. } =
                                    std::mem::replace(&mut self.state, RxState::header())
                                else {
                                    unreachable!()
                                };
                                out.push(data);
                            } else {
                                let next_len = (*remaining).min(max_payload_size.max(1));
                                *chunk = vec![0u8; next_len];
                                *have = 0;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(out),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

/// Double-buffered outbound payload. Producers append encoded frames to
/// `pending`; the runtime thread swaps `pending` into `flushing` and drains
/// it onto the wire, so a slow writer never blocks producers building the
/// next batch.
#[derive(Default)]
pub(crate) struct FrameWriter {
    pending: Vec<u8>,
    flushing: Vec<u8>,
    cursor: usize,
}

impl FrameWriter {
    pub(crate) fn enqueue(&mut self, payload: &[u8]) {
        let mut header = [0u8; meshwire_wire::FRAME_HEADER_SIZE];
        meshwire_wire::write_frame_len(&mut header, payload.len());
        self.pending.extend_from_slice(&header);
        self.pending.extend_from_slice(payload);
    }

    pub(crate) fn enqueue_keepalive(&mut self) {
        let mut header = [0u8; meshwire_wire::FRAME_HEADER_SIZE];
        meshwire_wire::write_frame_len(&mut header, 0);
        self.pending.extend_from_slice(&header);
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.cursor < self.flushing.len()
    }

    /// Writes as much of the buffered payload as the socket will currently
    /// accept. Returns `Ok(true)` once both buffers are fully drained.
    pub(crate) fn poll(&mut self, stream: &mut TcpStream) -> Result<bool, SocketError> {
        loop {
            if self.cursor >= self.flushing.len() {
                self.flushing.clear();
                self.cursor = 0;
                if self.pending.is_empty() {
                    return Ok(true);
                }
                std::mem::swap(&mut self.flushing, &mut self.pending);
            }
            match stream.write(&self.flushing[self.cursor..]) {
                Ok(0) => return Err(SocketError::Closed),
                Ok(n) => self.cursor += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Bundles a connected stream with its read and write state machines behind
/// one guard so the context thread (reads) and the runtime thread (writes)
/// never touch the file descriptor without holding the socket's single I/O
/// mutex, even though they run concurrently.
pub(crate) struct ConnIo {
    pub(crate) stream: TcpStream,
    pub(crate) reader: FrameReader,
    pub(crate) writer: FrameWriter,
}

impl ConnIo {
    pub(crate) fn new(stream: TcpStream, max_payload_size: usize) -> Self {
        Self { stream, reader: FrameReader::new(max_payload_size), writer: FrameWriter::default() }
    }
}
