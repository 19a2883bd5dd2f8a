use std::sync::Arc;

use crate::socket::{Socket, SocketId};

/// A strong, clonable observer handle onto a [`Socket`].
///
/// Built on an ordinary `Arc` rather than a raw pointer plus a manual
/// refcount: as long as any `SocketRef` is alive the socket it points
/// to is guaranteed valid memory (it may still have been shut down —
/// callers must check [`Socket::is_valid`] — but it is never dangling).
/// Holding a `SocketRef` after the owning registry has dropped its own
/// reference is exactly what keeps a socket on the server's
/// `expired_clients` list instead of being freed outright.
#[derive(Clone)]
pub struct SocketRef(Arc<Socket>);

impl SocketRef {
    pub(crate) fn new(socket: Arc<Socket>) -> Self {
        Self(socket)
    }

    pub fn id(&self) -> SocketId {
        self.0.id()
    }

    /// Number of outstanding `SocketRef`/owning handles pointing at the same
    /// socket. A registry uses this to detect when an externally-held
    /// reference is the only thing keeping a shut-down socket alive.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub(crate) fn into_inner(self) -> Arc<Socket> {
        self.0
    }
}

impl std::ops::Deref for SocketRef {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.0
    }
}

impl From<Arc<Socket>> for SocketRef {
    fn from(socket: Arc<Socket>) -> Self {
        Self::new(socket)
    }
}
