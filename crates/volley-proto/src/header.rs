//! Packet header with zero-copy parsing.
//!
//! Every Volley datagram starts with a fixed 20-byte header serialized as
//! raw binary (Big Endian). The header carries everything the receiver
//! needs before touching the payload: the packet type for dispatch, the
//! sequence number for the cipher nonce, and the payload length for
//! framing. The header bytes double as the AEAD associated data, so a
//! peer cannot flip the encrypted bit or the type byte without failing
//! authentication.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Bit set in [`PacketHeader::flags`] when the payload is AEAD-sealed.
pub const FLAG_ENCRYPTED: u8 = 0b0000_0001;

/// Fixed 20-byte packet header (Big Endian network byte order).
///
/// Fields are stored as raw byte arrays to avoid alignment issues; all
/// bit patterns are valid, so casting from untrusted network bytes cannot
/// cause undefined behavior.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    magic: [u8; 4],
    version: u8,
    packet_type: u8,
    flags: u8,
    reserved: u8,
    sequence: [u8; 8],
    pub(crate) payload_size: [u8; 4],
}

impl PacketHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 20;

    /// Magic number: "VLLY" in ASCII.
    pub const MAGIC: u32 = 0x564C_4C59;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size per datagram.
    ///
    /// Large enough for a connection request (1 KiB connect token plus
    /// nonce and timestamp, CBOR-framed, sealed) with room to spare.
    /// Larger datagrams would fragment on most paths anyway.
    pub const MAX_PAYLOAD_SIZE: u32 = 4 * 1024;

    /// Create a header for the given raw packet type byte and sequence
    /// number, with zero payload size and no flags.
    #[must_use]
    pub fn new(packet_type: u8, sequence: u64) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            packet_type,
            flags: 0,
            reserved: 0,
            sequence: sequence.to_be_bytes(),
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the front of a datagram (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::DatagramTooShort`] if fewer than 20 bytes
    /// - [`ProtocolError::InvalidMagic`] if the magic number is wrong
    /// - [`ProtocolError::UnsupportedVersion`] for an unknown version byte
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload size
    ///   exceeds [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::DatagramTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Raw packet type byte.
    #[must_use]
    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    /// Packet sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        u64::from_be_bytes(self.sequence)
    }

    /// Payload length in bytes (sealed length when encrypted).
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Whether the payload is AEAD-sealed.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Set or clear the encrypted flag.
    pub fn set_encrypted(&mut self, encrypted: bool) {
        if encrypted {
            self.flags |= FLAG_ENCRYPTED;
        } else {
            self.flags &= !FLAG_ENCRYPTED;
        }
    }

    /// Set the payload length field.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("packet_type", &self.packet_type)
            .field("sequence", &self.sequence())
            .field("payload_size", &self.payload_size())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = PacketHeader::new(3, 0xDEAD_BEEF_0000_0001);
        header.set_payload_size(280);
        header.set_encrypted(true);

        let bytes = header.to_bytes();
        let parsed = PacketHeader::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.packet_type(), 3);
        assert_eq!(parsed.sequence(), 0xDEAD_BEEF_0000_0001);
        assert_eq!(parsed.payload_size(), 280);
        assert!(parsed.is_encrypted());
    }

    #[test]
    fn rejects_short_datagram() {
        let bytes = [0u8; PacketHeader::SIZE - 1];
        assert!(matches!(
            PacketHeader::from_bytes(&bytes),
            Err(ProtocolError::DatagramTooShort { .. })
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = PacketHeader::new(1, 0).to_bytes();
        bytes[0] ^= 0xff;
        assert!(matches!(PacketHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = PacketHeader::new(1, 0).to_bytes();
        bytes[4] = 0x7f;
        assert!(matches!(
            PacketHeader::from_bytes(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x7f))
        ));
    }

    #[test]
    fn rejects_oversized_payload_claim() {
        let mut header = PacketHeader::new(1, 0);
        header.set_payload_size(PacketHeader::MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(
            PacketHeader::from_bytes(&header.to_bytes()),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn encrypted_flag_toggles() {
        let mut header = PacketHeader::new(1, 0);
        assert!(!header.is_encrypted());
        header.set_encrypted(true);
        assert!(header.is_encrypted());
        header.set_encrypted(false);
        assert!(!header.is_encrypted());
    }
}
