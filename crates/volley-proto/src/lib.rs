//! Wire protocol for Volley.
//!
//! Volley is a connection-oriented, datagram-based client/server protocol
//! for real-time games. This crate owns everything between raw datagram
//! bytes and typed packets:
//!
//! - [`PacketHeader`]: fixed 20-byte binary header (zero-copy parse)
//! - [`Packet`] / [`PacketType`]: the tagged packet set with CBOR payloads
//! - [`ConnectToken`], [`ChallengeToken`], [`TokenNonce`], [`Key`]:
//!   fixed-size credential types, zeroed on drop
//! - [`PacketCipher`]: per-packet ChaCha20-Poly1305 sealing
//! - [`wire`]: datagram assembly ([`write_datagram`] / [`read_datagram`])
//!
//! The client state machine lives in `volley-client`; servers and tools
//! share this crate so both ends agree on the wire format.

#![deny(missing_docs)]

pub mod errors;
mod header;
mod packet;
pub mod token;

pub mod crypto;
pub mod wire;

pub use crypto::PacketCipher;
pub use errors::ProtocolError;
pub use header::{PacketHeader, FLAG_ENCRYPTED};
pub use packet::{
    ConnectionChallengePayload, ConnectionHeartBeatPayload, ConnectionRequestPayload,
    ConnectionResponsePayload, InsecureConnectPayload, Packet, PacketType, GAME_PACKET_BASE,
};
pub use token::{ChallengeToken, ConnectToken, Key, TokenNonce};
pub use wire::{read_datagram, write_datagram, ParsedDatagram};
