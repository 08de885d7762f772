//! Wire codec: assemble and parse the fixed 42-byte CHIRP datagram.

use crate::identity::Md5Hash;
use crate::protocol::{MessageType, ServiceIdentifier, PROTOCOL_MAGIC, PROTOCOL_VERSION};

/// Every CHIRP datagram is exactly this long.
pub const MESSAGE_LEN: usize = 42;

const OFFSET_VERSION: usize = 5;
const OFFSET_TYPE: usize = 6;
const OFFSET_GROUP: usize = 7;
const OFFSET_NAME: usize = 23;
const OFFSET_SERVICE: usize = 39;
const OFFSET_PORT: usize = 40;

/// One decoded CHIRP message.
///
/// Layout on the wire: `CHIRP` magic + version byte, message type byte, group
/// hash (16), name hash (16), service identifier byte, port in network byte
/// order. A REQUEST carries port 0 by convention, but any value parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub group_hash: Md5Hash,
    pub name_hash: Md5Hash,
    pub identifier: ServiceIdentifier,
    pub port: u16,
}

impl Message {
    /// Encode into the fixed wire layout. Deterministic and side-effect free.
    pub fn assemble(&self) -> [u8; MESSAGE_LEN] {
        let mut buf = [0u8; MESSAGE_LEN];
        buf[..OFFSET_VERSION].copy_from_slice(&PROTOCOL_MAGIC);
        buf[OFFSET_VERSION] = PROTOCOL_VERSION;
        buf[OFFSET_TYPE] = self.kind as u8;
        buf[OFFSET_GROUP..OFFSET_NAME].copy_from_slice(self.group_hash.as_bytes());
        buf[OFFSET_NAME..OFFSET_SERVICE].copy_from_slice(self.name_hash.as_bytes());
        buf[OFFSET_SERVICE] = self.identifier.as_u8();
        buf[OFFSET_PORT..].copy_from_slice(&self.port.to_be_bytes());
        buf
    }

    /// Decode a received datagram.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != MESSAGE_LEN {
            return Err(DecodeError::BadLength(bytes.len()));
        }
        if bytes[..OFFSET_VERSION] != PROTOCOL_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        if bytes[OFFSET_VERSION] != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(bytes[OFFSET_VERSION]));
        }
        let kind = MessageType::from_raw(bytes[OFFSET_TYPE])
            .ok_or(DecodeError::InvalidType(bytes[OFFSET_TYPE]))?;

        let mut group = [0u8; 16];
        group.copy_from_slice(&bytes[OFFSET_GROUP..OFFSET_NAME]);
        let mut name = [0u8; 16];
        name.copy_from_slice(&bytes[OFFSET_NAME..OFFSET_SERVICE]);

        Ok(Message {
            kind,
            group_hash: Md5Hash::from_bytes(group),
            name_hash: Md5Hash::from_bytes(name),
            identifier: ServiceIdentifier::new(bytes[OFFSET_SERVICE]),
            port: u16::from_be_bytes([bytes[OFFSET_PORT], bytes[OFFSET_PORT + 1]]),
        })
    }
}

/// A datagram that is not a valid CHIRP message. Never fatal: the receive
/// loop drops the datagram and keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {MESSAGE_LEN} bytes, got {0}")]
    BadLength(usize),
    #[error("magic bytes mismatch")]
    BadMagic,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid message type {0}")]
    InvalidType(u8),
}
