use meshwire_timing::Duration;

/// Fixed 128-byte shared secret exchanged in plaintext as the handshake
/// gate. Any mismatch or incomplete read silently closes the connection;
/// no diagnostic is ever sent back to the peer.
pub const PROTO_ACCESS: [u8; 128] = [
    0xbb, 0x54, 0xaa, 0xc4, 0xb8, 0x9d, 0xc8, 0x68, 0xba, 0x37, 0xd9, 0xcc, 0x21, 0xb2, 0xce, 0xce,
    0x9f, 0x09, 0xb4, 0x3c, 0xeb, 0x7e, 0x57, 0xa0, 0xea, 0x87, 0x66, 0x22, 0x16, 0x24, 0xd0, 0x1b,
    0x08, 0x64, 0x64, 0x35, 0x91, 0x64, 0xe7, 0xa0, 0x06, 0xaa, 0xdd, 0x75, 0x17, 0x9d, 0x6d, 0x5c,
    0x5e, 0x19, 0xfd, 0xe9, 0x0c, 0xf9, 0xb4, 0x83, 0x86, 0x22, 0x42, 0x1e, 0x57, 0xa1, 0x28, 0x62,
    0xe1, 0x81, 0x1b, 0x4c, 0xda, 0xb2, 0x15, 0xdc, 0x93, 0x4f, 0x1c, 0xec, 0xb1, 0xc2, 0x23, 0x6a,
    0xb4, 0x86, 0x6d, 0x62, 0x45, 0xf7, 0xc8, 0xdb, 0x81, 0x51, 0x71, 0xaa, 0xc9, 0x63, 0xd5, 0x51,
    0xf0, 0xa4, 0x14, 0x0f, 0x62, 0xdf, 0x9d, 0xa1, 0xce, 0xb7, 0x73, 0x9c, 0xe1, 0xc2, 0xc2, 0x49,
    0x8d, 0x79, 0xc5, 0x2b, 0xeb, 0x01, 0xaf, 0x2b, 0x8c, 0xfb, 0xc7, 0x47, 0x13, 0xc1, 0x64, 0xe3,
];

pub const PROTO_ACCESS_LEN: usize = PROTO_ACCESS.len();

/// Production default for the inbound reassembly chunk cache: 4 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 4 * 1024 * 1024;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
pub const CLIENT_HANDSHAKE_RETRIES: u32 = 3;
pub const CLIENT_HANDSHAKE_RETRY_GAP: Duration = Duration::from_secs(1);

/// Consecutive transport errors tolerated before a socket is shut down.
pub const MAX_CONSECUTIVE_ERRORS: usize = 4;

/// Commands drained from the outbound queue into a single payload buffer per
/// `process_outgoing_commands` call.
pub const OUTGOING_BATCH_SIZE: usize = 128;

/// Soft cap on the outbound queue depth before `send_command` cooperatively
/// yields to the transport.
pub const OUTBOUND_SOFT_CAP: usize = 512;
