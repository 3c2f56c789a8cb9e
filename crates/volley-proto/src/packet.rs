//! Packet kinds and payloads.
//!
//! A packet is a type tag plus a per-kind payload. The tag travels in the
//! packet header; payloads are CBOR with no variant discriminator (the
//! header already identifies the payload, and serializing a second tag
//! would let a peer send mismatched type/payload pairs). The `Connection`
//! and `Game` kinds carry opaque bytes — their contents belong to the
//! layers above and below the handshake and are never CBOR-framed here.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};
use crate::token::{ChallengeToken, ConnectToken, TokenNonce};

/// First raw type byte reserved for application-defined game packets.
pub const GAME_PACKET_BASE: u8 = 0x40;

/// Closed set of packet kinds, plus the application escape hatch.
///
/// Raw type bytes below [`GAME_PACKET_BASE`] are protocol-owned; bytes at
/// or above it are application-defined and routed through the embedder's
/// game packet hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Secure handshake opener carrying the connect token. The only
    /// packet kind exempt from transport encryption.
    ConnectionRequest,
    /// Explicit server rejection of a connection request.
    ConnectionDenied,
    /// Server-issued challenge during the secure handshake.
    ConnectionChallenge,
    /// Client echo of the challenge token.
    ConnectionResponse,
    /// Content-free liveness packet; also completes a pending connect.
    ConnectionHeartBeat,
    /// Best-effort disconnect notification.
    ConnectionDisconnect,
    /// Data packet belonging to the messaging layer above the session.
    Connection,
    /// Insecure handshake opener carrying the client salt.
    InsecureConnect,
    /// Application-defined packet kind (raw byte ≥ [`GAME_PACKET_BASE`]).
    Game(u8),
}

impl PacketType {
    /// The raw wire byte for this kind.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ConnectionRequest => 0x01,
            Self::ConnectionDenied => 0x02,
            Self::ConnectionChallenge => 0x03,
            Self::ConnectionResponse => 0x04,
            Self::ConnectionHeartBeat => 0x05,
            Self::ConnectionDisconnect => 0x06,
            Self::Connection => 0x07,
            Self::InsecureConnect => 0x08,
            Self::Game(kind) => kind,
        }
    }

    /// Parse a raw wire byte. `None` for bytes that are neither a known
    /// protocol kind nor in the game packet range.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ConnectionRequest),
            0x02 => Some(Self::ConnectionDenied),
            0x03 => Some(Self::ConnectionChallenge),
            0x04 => Some(Self::ConnectionResponse),
            0x05 => Some(Self::ConnectionHeartBeat),
            0x06 => Some(Self::ConnectionDisconnect),
            0x07 => Some(Self::Connection),
            0x08 => Some(Self::InsecureConnect),
            kind if kind >= GAME_PACKET_BASE => Some(Self::Game(kind)),
            _ => None,
        }
    }

    /// Short name for logs and hooks.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection request",
            Self::ConnectionDenied => "connection denied",
            Self::ConnectionChallenge => "connection challenge",
            Self::ConnectionResponse => "connection response",
            Self::ConnectionHeartBeat => "connection heartbeat",
            Self::ConnectionDisconnect => "connection disconnect",
            Self::Connection => "connection",
            Self::InsecureConnect => "insecure connect",
            Self::Game(_) => "game",
        }
    }
}

/// Payload of a [`Packet::ConnectionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequestPayload {
    /// Absolute expiry of the connect token, in the token minter's time
    /// domain (seconds since the Unix epoch).
    pub expire_timestamp: u64,
    /// The opaque connect token.
    pub token: ConnectToken,
    /// Initialization bytes for the token's cryptographic envelope.
    pub nonce: TokenNonce,
}

/// Payload of a [`Packet::ConnectionChallenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionChallengePayload {
    /// The opaque challenge token.
    pub token: ChallengeToken,
    /// Initialization bytes for the challenge token's envelope.
    pub nonce: TokenNonce,
}

/// Payload of a [`Packet::ConnectionResponse`] — the challenge echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponsePayload {
    /// The challenge token, echoed verbatim.
    pub token: ChallengeToken,
    /// The challenge nonce, echoed verbatim.
    pub nonce: TokenNonce,
}

/// Payload of a [`Packet::ConnectionHeartBeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHeartBeatPayload {
    /// Server-assigned client slot, echoed in every heartbeat.
    pub client_index: u32,
}

/// Payload of a [`Packet::InsecureConnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsecureConnectPayload {
    /// Client-chosen random value disambiguating attempts from the same
    /// endpoint.
    pub client_salt: u64,
}

/// A typed packet: tag plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Secure handshake opener.
    ConnectionRequest(ConnectionRequestPayload),
    /// Server rejection; carries nothing.
    ConnectionDenied,
    /// Server challenge.
    ConnectionChallenge(ConnectionChallengePayload),
    /// Challenge echo.
    ConnectionResponse(ConnectionResponsePayload),
    /// Liveness / connect completion.
    ConnectionHeartBeat(ConnectionHeartBeatPayload),
    /// Disconnect notification; carries nothing.
    ConnectionDisconnect,
    /// Opaque messaging-layer data.
    Connection(Bytes),
    /// Insecure handshake opener.
    InsecureConnect(InsecureConnectPayload),
    /// Application-defined packet.
    Game {
        /// Raw type byte, ≥ [`GAME_PACKET_BASE`].
        kind: u8,
        /// Opaque application payload.
        payload: Bytes,
    },
}

impl Packet {
    /// The kind tag for this packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::ConnectionRequest(_) => PacketType::ConnectionRequest,
            Self::ConnectionDenied => PacketType::ConnectionDenied,
            Self::ConnectionChallenge(_) => PacketType::ConnectionChallenge,
            Self::ConnectionResponse(_) => PacketType::ConnectionResponse,
            Self::ConnectionHeartBeat(_) => PacketType::ConnectionHeartBeat,
            Self::ConnectionDisconnect => PacketType::ConnectionDisconnect,
            Self::Connection(_) => PacketType::Connection,
            Self::InsecureConnect(_) => PacketType::InsecureConnect,
            Self::Game { kind, .. } => PacketType::Game(*kind),
        }
    }

    /// Encode the payload (without header) into `out`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Encode`] if CBOR serialization fails.
    pub fn encode_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        fn cbor<T: Serialize>(
            value: &T,
            packet_type: &'static str,
            out: &mut Vec<u8>,
        ) -> Result<()> {
            ciborium::ser::into_writer(value, out)
                .map_err(|e| ProtocolError::Encode { packet_type, detail: e.to_string() })
        }

        match self {
            Self::ConnectionRequest(payload) => cbor(payload, "connection request", out),
            Self::ConnectionChallenge(payload) => cbor(payload, "connection challenge", out),
            Self::ConnectionResponse(payload) => cbor(payload, "connection response", out),
            Self::ConnectionHeartBeat(payload) => cbor(payload, "connection heartbeat", out),
            Self::InsecureConnect(payload) => cbor(payload, "insecure connect", out),
            Self::ConnectionDenied | Self::ConnectionDisconnect => Ok(()),
            Self::Connection(payload) | Self::Game { payload, .. } => {
                out.extend_from_slice(payload);
                Ok(())
            },
        }
    }

    /// Decode a payload of the given kind.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Decode`] if CBOR deserialization fails or a
    /// payloadless kind arrives with trailing bytes.
    pub fn decode_payload(packet_type: PacketType, payload: &[u8]) -> Result<Self> {
        fn cbor<T: serde::de::DeserializeOwned>(payload: &[u8], packet_type: &'static str) -> Result<T> {
            ciborium::de::from_reader(payload)
                .map_err(|e| ProtocolError::Decode { packet_type, detail: e.to_string() })
        }

        match packet_type {
            PacketType::ConnectionRequest => {
                Ok(Self::ConnectionRequest(cbor(payload, "connection request")?))
            },
            PacketType::ConnectionChallenge => {
                Ok(Self::ConnectionChallenge(cbor(payload, "connection challenge")?))
            },
            PacketType::ConnectionResponse => {
                Ok(Self::ConnectionResponse(cbor(payload, "connection response")?))
            },
            PacketType::ConnectionHeartBeat => {
                Ok(Self::ConnectionHeartBeat(cbor(payload, "connection heartbeat")?))
            },
            PacketType::InsecureConnect => {
                Ok(Self::InsecureConnect(cbor(payload, "insecure connect")?))
            },
            PacketType::ConnectionDenied => {
                reject_trailing(payload, "connection denied")?;
                Ok(Self::ConnectionDenied)
            },
            PacketType::ConnectionDisconnect => {
                reject_trailing(payload, "connection disconnect")?;
                Ok(Self::ConnectionDisconnect)
            },
            PacketType::Connection => Ok(Self::Connection(Bytes::copy_from_slice(payload))),
            PacketType::Game(kind) => {
                Ok(Self::Game { kind, payload: Bytes::copy_from_slice(payload) })
            },
        }
    }
}

fn reject_trailing(payload: &[u8], packet_type: &'static str) -> Result<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::Decode {
            packet_type,
            detail: format!("{} trailing bytes in payloadless packet", payload.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{CHALLENGE_TOKEN_BYTES, CONNECT_TOKEN_BYTES, NONCE_BYTES};

    #[test]
    fn type_bytes_are_stable() {
        for packet_type in [
            PacketType::ConnectionRequest,
            PacketType::ConnectionDenied,
            PacketType::ConnectionChallenge,
            PacketType::ConnectionResponse,
            PacketType::ConnectionHeartBeat,
            PacketType::ConnectionDisconnect,
            PacketType::Connection,
            PacketType::InsecureConnect,
            PacketType::Game(0x41),
        ] {
            assert_eq!(PacketType::from_u8(packet_type.to_u8()), Some(packet_type));
        }
    }

    #[test]
    fn unassigned_bytes_are_rejected() {
        assert_eq!(PacketType::from_u8(0x00), None);
        assert_eq!(PacketType::from_u8(0x09), None);
        assert_eq!(PacketType::from_u8(GAME_PACKET_BASE - 1), None);
        assert_eq!(PacketType::from_u8(GAME_PACKET_BASE), Some(PacketType::Game(0x40)));
    }

    #[test]
    fn connection_request_payload_roundtrip() {
        let packet = Packet::ConnectionRequest(ConnectionRequestPayload {
            expire_timestamp: 2000,
            token: ConnectToken::from([0xAA; CONNECT_TOKEN_BYTES]),
            nonce: TokenNonce::from([0xBB; NONCE_BYTES]),
        });

        let mut encoded = Vec::new();
        packet.encode_payload(&mut encoded).unwrap();
        let decoded = Packet::decode_payload(PacketType::ConnectionRequest, &encoded).unwrap();

        assert_eq!(decoded, packet);
    }

    #[test]
    fn challenge_and_response_carry_the_same_shape() {
        let token = ChallengeToken::from([0xCC; CHALLENGE_TOKEN_BYTES]);
        let nonce = TokenNonce::from([0xDD; NONCE_BYTES]);

        let challenge = Packet::ConnectionChallenge(ConnectionChallengePayload {
            token: token.clone(),
            nonce: nonce.clone(),
        });
        let mut encoded = Vec::new();
        challenge.encode_payload(&mut encoded).unwrap();

        // A response echoes the challenge bytes verbatim, so the encoded
        // payloads must be interchangeable on the wire.
        let response = Packet::decode_payload(PacketType::ConnectionResponse, &encoded).unwrap();
        assert_eq!(
            response,
            Packet::ConnectionResponse(ConnectionResponsePayload { token, nonce })
        );
    }

    #[test]
    fn payloadless_kinds_reject_trailing_bytes() {
        assert!(Packet::decode_payload(PacketType::ConnectionDenied, &[]).is_ok());
        assert!(matches!(
            Packet::decode_payload(PacketType::ConnectionDenied, &[0x00]),
            Err(ProtocolError::Decode { .. })
        ));
    }

    #[test]
    fn opaque_kinds_pass_bytes_through() {
        let payload = Bytes::from_static(b"application data");
        let packet = Packet::Game { kind: 0x42, payload: payload.clone() };

        let mut encoded = Vec::new();
        packet.encode_payload(&mut encoded).unwrap();
        assert_eq!(encoded.as_slice(), payload.as_ref());

        let decoded = Packet::decode_payload(PacketType::Game(0x42), &encoded).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn heartbeat_carries_client_index() {
        let packet = Packet::ConnectionHeartBeat(ConnectionHeartBeatPayload { client_index: 3 });
        let mut encoded = Vec::new();
        packet.encode_payload(&mut encoded).unwrap();
        let decoded = Packet::decode_payload(PacketType::ConnectionHeartBeat, &encoded).unwrap();
        assert_eq!(decoded, packet);
    }
}
