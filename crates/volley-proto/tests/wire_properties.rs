//! Property-based tests for the wire layer.
//!
//! These pin down the semantic guarantees the client relies on: type-byte
//! stability across the whole byte space, framing/cipher agreement for
//! arbitrary payloads, and tamper-evidence of sealed datagrams.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use volley_proto::{
    read_datagram, write_datagram, Key, Packet, PacketCipher, PacketType, GAME_PACKET_BASE,
};

fn arbitrary_key() -> impl Strategy<Value = Key> {
    any::<[u8; 32]>().prop_map(Key::from)
}

fn arbitrary_game_packet() -> impl Strategy<Value = Packet> {
    (GAME_PACKET_BASE..=u8::MAX, prop::collection::vec(any::<u8>(), 0..512))
        .prop_map(|(kind, payload)| Packet::Game { kind, payload: Bytes::from(payload) })
}

#[test]
fn prop_type_byte_mapping_is_stable() {
    proptest!(|(byte in any::<u8>())| {
        match PacketType::from_u8(byte) {
            // PROPERTY: every recognized byte maps back to itself.
            Some(packet_type) => prop_assert_eq!(packet_type.to_u8(), byte),
            // PROPERTY: only the gap between the protocol kinds and the
            // game range is unassigned.
            None => prop_assert!(byte == 0 || (0x09..GAME_PACKET_BASE).contains(&byte)),
        }
    });
}

#[test]
fn prop_sealed_datagram_roundtrip() {
    proptest!(|(packet in arbitrary_game_packet(), sequence in any::<u64>(), key in arbitrary_key())| {
        let cipher = PacketCipher::new(&key);

        let mut buf = BytesMut::new();
        write_datagram(&packet, sequence, Some(&cipher), &mut buf).unwrap();

        let parsed = read_datagram(&buf, Some(&cipher)).unwrap();

        // PROPERTY: sealing is transparent to the receiver holding the key.
        prop_assert_eq!(parsed.packet, packet);
        prop_assert_eq!(parsed.sequence, sequence);
        prop_assert!(parsed.encrypted);
    });
}

#[test]
fn prop_single_bit_flip_never_parses() {
    proptest!(|(
        packet in arbitrary_game_packet(),
        sequence in any::<u64>(),
        key in arbitrary_key(),
        bit in any::<proptest::sample::Index>(),
    )| {
        let cipher = PacketCipher::new(&key);

        let mut buf = BytesMut::new();
        write_datagram(&packet, sequence, Some(&cipher), &mut buf).unwrap();

        let mut tampered = buf.to_vec();
        let bit_index = bit.index(tampered.len() * 8);
        // The encrypted flag itself is the one bit with different failure
        // semantics: clearing it downgrades an opaque payload to
        // passthrough bytes, which is the transport's encrypted-type
        // policy to reject, not the wire layer's.
        prop_assume!(bit_index != 6 * 8);
        tampered[bit_index / 8] ^= 1 << (bit_index % 8);

        // PROPERTY: the header is covered by the AAD and the payload is
        // sealed, so no single-bit flip anywhere in the datagram survives
        // parsing. (A flipped length bit fails framing before the cipher.)
        prop_assert!(read_datagram(&tampered, Some(&cipher)).is_err());
    });
}
