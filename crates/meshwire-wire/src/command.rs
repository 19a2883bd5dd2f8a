use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag identifying what a [`Command`]'s payload means.
///
/// `String` is the one payload kind application code actually constructs
/// through [`Command::string`]; the rest are protocol-level (`Ping`,
/// `Response`) or reserved for future use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CommandKind {
    #[default]
    Nil = 0,
    Ping = 1,
    Response = 2,
    String = 3,
    Test = 4,
    /// Reserved for application-defined command kinds layered on top of this
    /// protocol; never emitted by meshwire itself.
    Inherited = 5,
}

/// A tagged, length-prefixed message exchanged between peers.
///
/// Encoded form is the concatenation of the 2-byte `kind` discriminant and a
/// length-prefixed `data` byte sequence, produced by `bitcode`'s serde
/// integration. Both ends must use the same encoder; see
/// [`Command::encode`]/[`Command::decode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed command payload: {0}")]
    Malformed(String),
}

impl Command {
    #[inline]
    pub fn new(kind: CommandKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    #[inline]
    pub fn ping() -> Self {
        Self::new(CommandKind::Ping, Vec::new())
    }

    #[inline]
    pub fn response() -> Self {
        Self::new(CommandKind::Response, Vec::new())
    }

    #[inline]
    pub fn string(s: impl Into<String>) -> Self {
        Self::new(CommandKind::String, s.into().into_bytes())
    }

    /// Interprets `data` as UTF-8. Returns `None` if it isn't (e.g. wrong
    /// command kind or corrupted payload).
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Encodes this command into the archive form carried inside a frame's
    /// length-prefixed body. Self-consistent with [`Command::decode`].
    pub fn encode(&self) -> Vec<u8> {
        bitcode::serialize(self).expect("Command encoding is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        bitcode::deserialize(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_kind_and_data() {
        let cmd = Command::string("hello");
        let bytes = cmd.encode();
        let back = Command::decode(&bytes).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn roundtrip_empty_payload() {
        let cmd = Command::ping();
        let bytes = cmd.encode();
        let back = Command::decode(&bytes).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn decode_garbage_is_an_error_not_a_panic() {
        let garbage = vec![0xffu8; 3];
        assert!(Command::decode(&garbage).is_err());
    }

    #[test]
    fn large_payload_roundtrips_byte_identical() {
        let payload = vec![0x5au8; 100_000];
        let cmd = Command::new(CommandKind::String, payload.clone());
        let bytes = cmd.encode();
        let back = Command::decode(&bytes).unwrap();
        assert_eq!(back.data, payload);
    }
}
