//! Wire types shared between the server and client halves of meshwire.
//!
//! A frame on the wire is a 4-byte little-endian length `L` followed by `L`
//! bytes of archive-encoded [`Command`]. `L == 0` is a reserved keepalive /
//! no-op and carries no payload.

mod command;
mod frame;

pub use command::{Command, CommandKind, DecodeError};
pub use frame::{FRAME_HEADER_SIZE, read_frame_len, write_frame_len};
