use std::os::fd::AsRawFd;

use meshwire_timing::Duration;
use mio::net::TcpStream;

/// Sets `SO_SNDTIMEO` on `stream`'s underlying file descriptor. Mirrors the
/// accepted-socket default from the wire interface section: a server that
/// never unblocks a stalled write would eventually exhaust memory queuing
/// unsent frames.
pub fn set_send_timeout(stream: &TcpStream, timeout: Duration) {
    let fd = stream.as_raw_fd();
    let tv = libc::timeval {
        tv_sec: (timeout.as_millis() / 1000) as libc::time_t,
        tv_usec: ((timeout.as_millis() % 1000) * 1000) as libc::suseconds_t,
    };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDTIMEO,
            std::ptr::addr_of!(tv).cast::<libc::c_void>(),
            core::mem::size_of::<libc::timeval>() as libc::socklen_t,
        );
    }
}

/// Disables Nagle's algorithm. `mio::net::TcpStream` exposes this directly;
/// this wrapper just logs failures instead of making every call site
/// handle an error that is never actionable.
pub fn set_nodelay(stream: &TcpStream, enabled: bool) {
    if let Err(e) = stream.set_nodelay(enabled) {
        tracing::warn!(%e, "failed to set TCP_NODELAY");
    }
}
