//! CHIRP: Constellation Host Identification and Reconnaissance Protocol.
//!
//! Lightweight peer-to-peer service discovery over IPv4 UDP broadcast for
//! small fleets of cooperating processes with no central registry. Processes
//! in the same logical group announce which services they host (kind plus
//! TCP port), ask peers to re-announce a kind, and withdraw announcements on
//! the way out. Only MD5 fingerprints of the group and instance names travel
//! on the wire.
//!
//! The [`Manager`] is the per-process engine: it owns the broadcast sockets,
//! the registered and discovered service sets, the callback registry, and a
//! background receive loop that filters by group and drops self-echo.
//!
//! UDP broadcast is lossy and unordered; CHIRP adds no reliability,
//! authentication or routing on top.

pub mod identity;
pub mod manager;
pub mod protocol;
pub mod socket;
pub mod wire;

pub use identity::Md5Hash;
pub use manager::{DiscoverCallback, DiscoveredService, Manager, RegisteredService};
pub use protocol::{
    MessageType, ServiceIdentifier, CHIRP_PORT, PROTOCOL_MAGIC, PROTOCOL_VERSION,
};
pub use socket::{BroadcastReceiver, BroadcastSender, Datagram};
pub use wire::{DecodeError, Message, MESSAGE_LEN};
