//! Transport contract and shared transport machinery.
//!
//! The client drives a [`Transport`] exclusively for its lifetime: a sink
//! and source of typed packets addressed by endpoint, with an encryption
//! mapping table and receive-side resource diagnostics. Two
//! implementations ship in-tree: [`LocalTransport`](local::LocalTransport)
//! (in-memory, deterministic, used by the test suite and simulations) and
//! [`UdpTransport`](udp::UdpTransport) behind the `udp` feature.
//!
//! Encryption policy lives here, shared by all implementations: a packet
//! is sealed when encryption is enabled, its type is not exempt, and a
//! key mapping exists for the destination; an inbound plaintext packet of
//! an encrypted type from a mapped peer is dropped.

pub mod local;
#[cfg(feature = "udp")]
pub mod udp;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use volley_proto::{read_datagram, write_datagram, Key, Packet, PacketCipher, PacketType, ProtocolError};

use crate::allocator::{SharedStreamAllocator, StreamAllocator};
use crate::config::ConnectionConfig;
use crate::messages::SharedMessageFactory;

/// A packet popped from the transport's receive path.
#[derive(Debug)]
pub struct ReceivedPacket {
    /// The decoded packet.
    pub packet: Packet,
    /// Sender endpoint.
    pub from: SocketAddr,
    /// Sender-assigned sequence number.
    pub sequence: u64,
}

/// Shared state the client installs on the transport for the duration of
/// a connection-enabled session.
#[derive(Clone)]
pub struct Context {
    /// The messaging layer's configuration.
    pub connection_config: ConnectionConfig,
    /// Handle to the client's message factory.
    pub message_factory: SharedMessageFactory,
}

/// The lower-level packet transport the client drives.
///
/// The client holds the implementation by exclusive mutable borrow for
/// its whole lifetime; nothing else touches the transport while a client
/// is alive. All methods are non-blocking.
pub trait Transport {
    /// Send `packet` to `to` under `sequence`. `immediate` bypasses any
    /// transport-side queuing or aggregation.
    fn send_packet(&mut self, to: SocketAddr, packet: Packet, sequence: u64, immediate: bool);

    /// Pop the next inbound packet, or `None` when drained for this tick.
    fn receive_packet(&mut self) -> Option<ReceivedPacket>;

    /// Install the key pair for a peer: `send_key` seals outgoing
    /// packets, `receive_key` opens incoming ones.
    fn add_encryption_mapping(&mut self, peer: SocketAddr, send_key: Key, receive_key: Key);

    /// Drop every peer key mapping.
    fn reset_encryption_mappings(&mut self);

    /// Turn on packet encryption for all packet types.
    fn enable_packet_encryption(&mut self);

    /// Turn off packet encryption entirely.
    fn disable_packet_encryption(&mut self);

    /// Exempt one packet type from encryption while encryption is on.
    fn disable_encryption_for_packet_type(&mut self, packet_type: PacketType);

    /// Install the serialization buffer allocator.
    fn set_stream_allocator(&mut self, allocator: SharedStreamAllocator);

    /// Install or clear the client/server context.
    fn set_context(&mut self, context: Option<Context>);

    /// Whether the receive-side packet factory has latched a resource
    /// error since the last clear.
    fn has_packet_factory_error(&self) -> bool;

    /// Clear the packet factory's latched error.
    fn clear_packet_factory_error(&mut self);
}

/// Receive-side resource accounting.
///
/// Packets are plain values in this implementation, so the factory's
/// surviving duty is diagnostics: transports latch an error here when
/// inbound resource limits are exceeded (for example the in-memory
/// transport's inbound queue overflowing), and the client converts the
/// latch into the
/// [`PacketFactoryError`](crate::ClientState::PacketFactoryError)
/// terminal state on its next tick.
#[derive(Debug, Default)]
pub struct PacketFactory {
    error: bool,
}

impl PacketFactory {
    /// Create a factory with no latched error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the error flag.
    pub fn report_error(&mut self) {
        self.error = true;
    }

    /// Whether an error has been latched since the last clear.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Clear the latched error.
    pub fn clear_error(&mut self) {
        self.error = false;
    }
}

struct PeerCiphers {
    seal: PacketCipher,
    open: PacketCipher,
}

/// Per-peer key mappings plus the per-type encryption policy.
#[derive(Default)]
pub struct EncryptionTable {
    enabled: bool,
    exempt: HashSet<u8>,
    peers: HashMap<SocketAddr, PeerCiphers>,
}

impl EncryptionTable {
    /// Create an empty table with encryption disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable encryption for all non-exempt packet types.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable encryption entirely and forget the exemptions.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.exempt.clear();
    }

    /// Exempt a packet type from encryption.
    pub fn exempt(&mut self, packet_type: PacketType) {
        self.exempt.insert(packet_type.to_u8());
    }

    /// Install the key pair for a peer.
    pub fn add_peer(&mut self, peer: SocketAddr, send_key: Key, receive_key: Key) {
        self.peers.insert(
            peer,
            PeerCiphers { seal: PacketCipher::new(&send_key), open: PacketCipher::new(&receive_key) },
        );
    }

    /// Drop every peer mapping. The enabled/exempt policy is unchanged.
    pub fn clear_peers(&mut self) {
        self.peers.clear();
    }

    /// Whether this packet type must travel sealed under current policy.
    #[must_use]
    pub fn requires_encryption(&self, packet_type: PacketType) -> bool {
        self.enabled && !self.exempt.contains(&packet_type.to_u8())
    }

    /// Whether a key mapping exists for `peer`.
    #[must_use]
    pub fn has_peer(&self, peer: SocketAddr) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Sealing cipher to use for an outgoing packet, if policy says seal.
    #[must_use]
    pub fn seal_cipher(&self, peer: SocketAddr, packet_type: PacketType) -> Option<&PacketCipher> {
        if !self.requires_encryption(packet_type) {
            return None;
        }
        self.peers.get(&peer).map(|ciphers| &ciphers.seal)
    }

    /// Opening cipher for an inbound datagram from `peer`, if mapped.
    #[must_use]
    pub fn open_cipher(&self, peer: SocketAddr) -> Option<&PacketCipher> {
        self.peers.get(&peer).map(|ciphers| &ciphers.open)
    }
}

/// Serialize a packet into a datagram, sealing per table policy and
/// drawing the buffer from `allocator` when one is installed.
///
/// Returns the datagram and whether it was sealed; `None` means the
/// packet was dropped (already logged — encode failure or allocator
/// exhaustion, which latches the allocator's own error flag).
pub(crate) fn encode_outgoing(
    table: &EncryptionTable,
    allocator: Option<&SharedStreamAllocator>,
    to: SocketAddr,
    packet: &Packet,
    sequence: u64,
) -> Option<(Bytes, bool)> {
    let cipher = table.seal_cipher(to, packet.packet_type());
    let encrypted = cipher.is_some();

    let mut scratch = BytesMut::new();
    if let Err(e) = write_datagram(packet, sequence, cipher, &mut scratch) {
        tracing::warn!("dropping outgoing {} packet: {e}", packet.packet_type().name());
        return None;
    }

    let datagram = match allocator {
        Some(allocator) => {
            let Some(mut buf) = allocator.borrow_mut().allocate(scratch.len()) else {
                tracing::warn!(
                    "stream allocator refused {} bytes, dropping outgoing {} packet",
                    scratch.len(),
                    packet.packet_type().name()
                );
                return None;
            };
            buf.extend_from_slice(&scratch);
            buf.freeze()
        },
        None => scratch.freeze(),
    };

    Some((datagram, encrypted))
}

/// Parse an inbound datagram and enforce the encrypted-type policy.
pub(crate) fn decode_incoming(
    table: &EncryptionTable,
    from: SocketAddr,
    bytes: &[u8],
) -> Result<ReceivedPacket, ProtocolError> {
    let parsed = read_datagram(bytes, table.open_cipher(from))?;
    let packet_type = parsed.packet.packet_type();

    // A mapped peer must seal everything the policy says to seal; a
    // plaintext packet of an encrypted type is a downgrade attempt.
    if !parsed.encrypted && table.requires_encryption(packet_type) && table.has_peer(from) {
        return Err(ProtocolError::EncryptionRequired { packet_type: packet_type.to_u8() });
    }

    Ok(ReceivedPacket { packet: parsed.packet, from, sequence: parsed.sequence })
}
