//! CHIRP wire protocol: port, magic, message types and version.

use std::fmt;
use std::str::FromStr;

/// Fixed UDP port shared by every CHIRP process on the broadcast domain.
pub const CHIRP_PORT: u16 = 7123;

/// Protocol identification bytes at the start of every datagram.
pub const PROTOCOL_MAGIC: [u8; 5] = *b"CHIRP";

/// Current protocol version. Follows the magic on the wire.
pub const PROTOCOL_VERSION: u8 = 1;

/// The three CHIRP message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Ask peers to re-announce services of a given kind.
    Request = 1,
    /// Announce a hosted service.
    Offer = 2,
    /// Announce that a service is going away.
    Leaving = 3,
}

impl MessageType {
    /// Decode a wire byte. Returns `None` for anything outside the closed set.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(MessageType::Request),
            2 => Some(MessageType::Offer),
            3 => Some(MessageType::Leaving),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Request => "REQUEST",
            MessageType::Offer => "OFFER",
            MessageType::Leaving => "LEAVING",
        };
        f.write_str(name)
    }
}

/// Service kind tag, one byte on the wire.
///
/// The roster of kinds is deployment configuration: both peers only have to
/// agree on the byte. Unknown bytes are carried through untouched, so a newer
/// peer can announce kinds an older peer has no name for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceIdentifier(u8);

impl ServiceIdentifier {
    pub const CONTROL: Self = Self(1);
    pub const HEARTBEAT: Self = Self(2);
    pub const MONITORING: Self = Self(3);
    pub const DATA: Self = Self(4);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Name of a well-known kind, if this is one.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::CONTROL => Some("CONTROL"),
            Self::HEARTBEAT => Some("HEARTBEAT"),
            Self::MONITORING => Some("MONITORING"),
            Self::DATA => Some("DATA"),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for ServiceIdentifier {
    type Err = UnknownServiceIdentifier;

    /// Accepts a well-known name (case-insensitive) or a raw byte value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONTROL" => Ok(Self::CONTROL),
            "HEARTBEAT" => Ok(Self::HEARTBEAT),
            "MONITORING" => Ok(Self::MONITORING),
            "DATA" => Ok(Self::DATA),
            other => other
                .parse::<u8>()
                .map(Self::new)
                .map_err(|_| UnknownServiceIdentifier(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown service identifier '{0}'")]
pub struct UnknownServiceIdentifier(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_values() {
        assert_eq!(MessageType::Request as u8, 1);
        assert_eq!(MessageType::Offer as u8, 2);
        assert_eq!(MessageType::Leaving as u8, 3);
        assert_eq!(MessageType::from_raw(2), Some(MessageType::Offer));
        assert_eq!(MessageType::from_raw(0), None);
        assert_eq!(MessageType::from_raw(4), None);
    }

    #[test]
    fn identifier_opaque_passthrough() {
        let id = ServiceIdentifier::new(200);
        assert_eq!(id.as_u8(), 200);
        assert_eq!(id.name(), None);
        assert_eq!(id.to_string(), "200");
    }

    #[test]
    fn identifier_ordering_by_byte() {
        assert!(ServiceIdentifier::CONTROL < ServiceIdentifier::DATA);
        assert!(ServiceIdentifier::new(4) < ServiceIdentifier::new(200));
    }

    #[test]
    fn identifier_from_str() {
        assert_eq!(
            "control".parse::<ServiceIdentifier>().unwrap(),
            ServiceIdentifier::CONTROL
        );
        assert_eq!(
            "DATA".parse::<ServiceIdentifier>().unwrap(),
            ServiceIdentifier::DATA
        );
        assert_eq!(
            "42".parse::<ServiceIdentifier>().unwrap(),
            ServiceIdentifier::new(42)
        );
        assert!("bogus".parse::<ServiceIdentifier>().is_err());
    }
}
