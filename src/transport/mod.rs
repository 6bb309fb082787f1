//! Transport Module - WebRTC Peer Connection
//!
//! Liefert Verbindungsereignisse an den Call-Lifecycle. Signaling und
//! Medienverarbeitung liegen außerhalb dieses Crates.

mod peer;

pub use peer::{default_ice_servers, PeerTransport, TransportError, TransportEvent};
