//! Error types for the Volley wire protocol.
//!
//! Everything that can go wrong between raw datagram bytes and a typed
//! [`Packet`](crate::Packet): malformed headers, unknown packet types,
//! payload codec failures, and packet cipher failures. Higher layers treat
//! most of these as silent drops; the variants exist so the transport can
//! log precisely what was dropped.

use thiserror::Error;

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding, sealing, or opening
/// packets.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Datagram is shorter than a packet header
    #[error("datagram too short: expected at least {expected} bytes, got {actual}")]
    DatagramTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes received
        actual: usize,
    },

    /// Header magic number does not identify a Volley datagram
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unsupported protocol version byte
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Packet type byte does not map to any known packet kind
    #[error("unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    /// Payload exceeds the maximum datagram payload size
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual payload size in bytes
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Header claims a different payload length than the datagram carries
    #[error("payload size mismatch: header claims {claimed}, datagram carries {actual}")]
    PayloadSizeMismatch {
        /// Length claimed by the header
        claimed: usize,
        /// Length actually present after the header
        actual: usize,
    },

    /// CBOR payload failed to encode
    #[error("payload encode failed for {packet_type}: {detail}")]
    Encode {
        /// Packet kind being encoded
        packet_type: &'static str,
        /// Underlying codec error
        detail: String,
    },

    /// CBOR payload failed to decode
    #[error("payload decode failed for {packet_type}: {detail}")]
    Decode {
        /// Packet kind being decoded
        packet_type: &'static str,
        /// Underlying codec error
        detail: String,
    },

    /// Datagram is flagged as encrypted but no key is known for the peer
    #[error("encrypted datagram from peer with no encryption mapping")]
    MissingKey,

    /// Plaintext datagram for a packet type the receiver requires to be
    /// encrypted
    #[error("plaintext datagram for encrypted packet type {packet_type:#04x}")]
    EncryptionRequired {
        /// Raw type byte of the offending packet
        packet_type: u8,
    },

    /// AEAD seal failed
    #[error("packet seal failed")]
    Seal,

    /// AEAD open failed (authentication failure: tampered, truncated, or
    /// sealed under a different key or sequence)
    #[error("packet authentication failed")]
    Open,
}

impl ProtocolError {
    /// Returns true if the datagram should be dropped without surfacing an
    /// error to the application.
    ///
    /// Anything a remote peer can trigger by sending garbage is a silent
    /// drop; only local encode failures indicate a bug worth surfacing.
    #[must_use]
    pub fn is_silent_drop(&self) -> bool {
        !matches!(self, Self::Encode { .. } | Self::Seal)
    }
}
