//! Datagram assembly and parsing.
//!
//! A datagram is a [`PacketHeader`] followed by the packet payload,
//! sealed when the sender's encryption policy says so. The header's
//! payload length always describes the on-wire (possibly sealed) length,
//! and the finished header bytes are the AEAD associated data, so the
//! length field itself is authenticated.

use bytes::{BufMut, BytesMut};

use crate::crypto::PacketCipher;
use crate::errors::{ProtocolError, Result};
use crate::header::PacketHeader;
use crate::packet::{Packet, PacketType};

/// A packet parsed out of a raw datagram.
#[derive(Debug)]
pub struct ParsedDatagram {
    /// The decoded packet.
    pub packet: Packet,
    /// Sender-assigned sequence number from the header.
    pub sequence: u64,
    /// Whether the payload arrived sealed.
    pub encrypted: bool,
}

/// Assemble a datagram for `packet`, sealing the payload when `cipher`
/// is provided.
///
/// # Errors
///
/// - [`ProtocolError::Encode`] if the payload fails to serialize
/// - [`ProtocolError::PayloadTooLarge`] if the on-wire payload exceeds
///   [`PacketHeader::MAX_PAYLOAD_SIZE`]
/// - [`ProtocolError::Seal`] on cipher failure
pub fn write_datagram(
    packet: &Packet,
    sequence: u64,
    cipher: Option<&PacketCipher>,
    out: &mut BytesMut,
) -> Result<()> {
    let mut payload = Vec::new();
    packet.encode_payload(&mut payload)?;

    let mut header = PacketHeader::new(packet.packet_type().to_u8(), sequence);
    header.set_encrypted(cipher.is_some());

    let wire_len = match cipher {
        Some(_) => payload.len() + crate::crypto::SEAL_OVERHEAD,
        None => payload.len(),
    };
    if wire_len > PacketHeader::MAX_PAYLOAD_SIZE as usize {
        return Err(ProtocolError::PayloadTooLarge {
            size: wire_len,
            max: PacketHeader::MAX_PAYLOAD_SIZE as usize,
        });
    }
    header.set_payload_size(wire_len as u32);

    let header_bytes = header.to_bytes();
    out.reserve(PacketHeader::SIZE + wire_len);
    out.put_slice(&header_bytes);

    match cipher {
        Some(cipher) => {
            let sealed = cipher.seal(sequence, &header_bytes, &payload)?;
            debug_assert_eq!(sealed.len(), wire_len);
            out.put_slice(&sealed);
        },
        None => out.put_slice(&payload),
    }

    Ok(())
}

/// Parse a raw datagram.
///
/// `cipher` is the opener for the claimed sender, if one is known; it is
/// only consulted when the header's encrypted flag is set.
///
/// # Errors
///
/// - header validation errors from [`PacketHeader::from_bytes`]
/// - [`ProtocolError::PayloadSizeMismatch`] if the datagram length does
///   not match the header's claim
/// - [`ProtocolError::UnknownPacketType`] for unassigned type bytes
/// - [`ProtocolError::MissingKey`] for an encrypted datagram with no
///   cipher available
/// - [`ProtocolError::Open`] on authentication failure
/// - [`ProtocolError::Decode`] if the payload fails to deserialize
pub fn read_datagram(bytes: &[u8], cipher: Option<&PacketCipher>) -> Result<ParsedDatagram> {
    let header = PacketHeader::from_bytes(bytes)?;
    let claimed = header.payload_size() as usize;
    let body = &bytes[PacketHeader::SIZE..];

    if body.len() != claimed {
        return Err(ProtocolError::PayloadSizeMismatch { claimed, actual: body.len() });
    }

    let packet_type = PacketType::from_u8(header.packet_type())
        .ok_or(ProtocolError::UnknownPacketType(header.packet_type()))?;
    let sequence = header.sequence();

    let packet = if header.is_encrypted() {
        let cipher = cipher.ok_or(ProtocolError::MissingKey)?;
        let plain = cipher.open(sequence, &bytes[..PacketHeader::SIZE], body)?;
        Packet::decode_payload(packet_type, &plain)?
    } else {
        Packet::decode_payload(packet_type, body)?
    };

    Ok(ParsedDatagram { packet, sequence, encrypted: header.is_encrypted() })
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::packet::ConnectionHeartBeatPayload;
    use crate::token::{Key, KEY_BYTES};

    fn cipher() -> PacketCipher {
        PacketCipher::new(&Key::from([0x77; KEY_BYTES]))
    }

    #[test]
    fn plaintext_datagram_roundtrip() {
        let packet = Packet::ConnectionHeartBeat(ConnectionHeartBeatPayload { client_index: 7 });
        let mut buf = BytesMut::new();
        write_datagram(&packet, 9, None, &mut buf).unwrap();

        let parsed = read_datagram(&buf, None).unwrap();
        assert_eq!(parsed.packet, packet);
        assert_eq!(parsed.sequence, 9);
        assert!(!parsed.encrypted);
    }

    #[test]
    fn sealed_datagram_roundtrip() {
        let packet = Packet::ConnectionDisconnect;
        let mut buf = BytesMut::new();
        write_datagram(&packet, 10, Some(&cipher()), &mut buf).unwrap();

        let parsed = read_datagram(&buf, Some(&cipher())).unwrap();
        assert_eq!(parsed.packet, packet);
        assert!(parsed.encrypted);
    }

    #[test]
    fn sealed_datagram_without_key_is_rejected() {
        let mut buf = BytesMut::new();
        write_datagram(&Packet::ConnectionDisconnect, 1, Some(&cipher()), &mut buf).unwrap();

        assert!(matches!(read_datagram(&buf, None), Err(ProtocolError::MissingKey)));
    }

    #[test]
    fn truncated_datagram_is_rejected() {
        let mut buf = BytesMut::new();
        write_datagram(&Packet::ConnectionDenied, 1, Some(&cipher()), &mut buf).unwrap();
        let truncated = &buf[..buf.len() - 1];

        assert!(matches!(
            read_datagram(truncated, Some(&cipher())),
            Err(ProtocolError::PayloadSizeMismatch { .. })
        ));
    }

    #[test]
    fn stripping_the_encrypted_flag_does_not_yield_a_clean_parse() {
        // An attacker clearing the encrypted flag leaves the seal tag in
        // the body, so a payloadless kind no longer parses as empty.
        let mut buf = BytesMut::new();
        write_datagram(&Packet::ConnectionDenied, 5, Some(&cipher()), &mut buf).unwrap();

        let mut stripped = buf.to_vec();
        stripped[6] &= !crate::header::FLAG_ENCRYPTED;

        assert!(matches!(
            read_datagram(&stripped, Some(&cipher())),
            Err(ProtocolError::Decode { .. })
        ));
    }
}
