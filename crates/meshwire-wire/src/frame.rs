/// Size in bytes of a frame's length header.
pub const FRAME_HEADER_SIZE: usize = core::mem::size_of::<u32>();

/// Writes `len` as a little-endian `u32` frame header. Panics if `len`
/// doesn't fit in 32 bits — callers are expected to reject oversized
/// payloads before framing them.
#[inline]
pub fn write_frame_len(buf: &mut [u8; FRAME_HEADER_SIZE], len: usize) {
    let len = u32::try_from(len).expect("encoded command exceeds u32::MAX bytes");
    buf.copy_from_slice(&len.to_le_bytes());
}

/// Reads a little-endian `u32` frame header.
#[inline]
pub fn read_frame_len(buf: &[u8; FRAME_HEADER_SIZE]) -> u32 {
    u32::from_le_bytes(*buf)
}
