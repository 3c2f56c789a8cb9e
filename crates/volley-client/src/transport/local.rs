//! In-memory transport.
//!
//! Deterministic datagram queues with the full codec and cipher path, so
//! tests and simulations exercise exactly the bytes a socket transport
//! would put on the wire. Construction returns the transport plus a
//! [`LocalEndpoint`] handle to the same queues: the client takes the
//! transport by exclusive borrow, and the test or simulation drives the
//! other side of the wire through the endpoint.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use volley_proto::{Key, Packet, PacketType};

use super::{
    decode_incoming, encode_outgoing, Context, EncryptionTable, PacketFactory, ReceivedPacket,
    Transport,
};
use crate::allocator::SharedStreamAllocator;

/// Default inbound queue capacity.
const DEFAULT_INBOUND_CAPACITY: usize = 256;

/// A datagram the client sent, as recorded by the wire.
#[derive(Debug, Clone)]
pub struct SentDatagram {
    /// Destination endpoint.
    pub to: SocketAddr,
    /// Packet kind that was encoded.
    pub packet_type: PacketType,
    /// Sequence number the client assigned.
    pub sequence: u64,
    /// Whether the payload was sealed.
    pub encrypted: bool,
    /// Whether the client requested an immediate send.
    pub immediate: bool,
    /// The raw datagram bytes.
    pub datagram: Bytes,
}

struct Wire {
    inbound: VecDeque<(SocketAddr, Bytes)>,
    inbound_capacity: usize,
    sent: Vec<SentDatagram>,
    packet_factory: PacketFactory,
}

/// In-memory [`Transport`] implementation.
pub struct LocalTransport {
    wire: Rc<RefCell<Wire>>,
    table: EncryptionTable,
    allocator: Option<SharedStreamAllocator>,
    context: Option<Context>,
}

/// Test-side handle to a [`LocalTransport`]'s wire.
#[derive(Clone)]
pub struct LocalEndpoint {
    wire: Rc<RefCell<Wire>>,
}

impl LocalTransport {
    /// Create a transport and the endpoint handle to its wire.
    #[must_use]
    pub fn new() -> (Self, LocalEndpoint) {
        Self::with_inbound_capacity(DEFAULT_INBOUND_CAPACITY)
    }

    /// Create a transport whose inbound queue holds at most `capacity`
    /// datagrams; delivery beyond that latches the packet factory error.
    #[must_use]
    pub fn with_inbound_capacity(capacity: usize) -> (Self, LocalEndpoint) {
        let wire = Rc::new(RefCell::new(Wire {
            inbound: VecDeque::new(),
            inbound_capacity: capacity,
            sent: Vec::new(),
            packet_factory: PacketFactory::new(),
        }));
        let endpoint = LocalEndpoint { wire: Rc::clone(&wire) };
        (Self { wire, table: EncryptionTable::new(), allocator: None, context: None }, endpoint)
    }

    /// The installed context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

impl Transport for LocalTransport {
    fn send_packet(&mut self, to: SocketAddr, packet: Packet, sequence: u64, immediate: bool) {
        let packet_type = packet.packet_type();
        let Some((datagram, encrypted)) =
            encode_outgoing(&self.table, self.allocator.as_ref(), to, &packet, sequence)
        else {
            return;
        };

        self.wire.borrow_mut().sent.push(SentDatagram {
            to,
            packet_type,
            sequence,
            encrypted,
            immediate,
            datagram,
        });
    }

    fn receive_packet(&mut self) -> Option<ReceivedPacket> {
        loop {
            let (from, datagram) = self.wire.borrow_mut().inbound.pop_front()?;
            match decode_incoming(&self.table, from, &datagram) {
                Ok(received) => return Some(received),
                Err(e) => {
                    tracing::debug!("dropping inbound datagram from {from}: {e}");
                },
            }
        }
    }

    fn add_encryption_mapping(&mut self, peer: SocketAddr, send_key: Key, receive_key: Key) {
        self.table.add_peer(peer, send_key, receive_key);
    }

    fn reset_encryption_mappings(&mut self) {
        self.table.clear_peers();
    }

    fn enable_packet_encryption(&mut self) {
        self.table.enable();
    }

    fn disable_packet_encryption(&mut self) {
        self.table.disable();
    }

    fn disable_encryption_for_packet_type(&mut self, packet_type: PacketType) {
        self.table.exempt(packet_type);
    }

    fn set_stream_allocator(&mut self, allocator: SharedStreamAllocator) {
        self.allocator = Some(allocator);
    }

    fn set_context(&mut self, context: Option<Context>) {
        self.context = context;
    }

    fn has_packet_factory_error(&self) -> bool {
        self.wire.borrow().packet_factory.has_error()
    }

    fn clear_packet_factory_error(&mut self) {
        self.wire.borrow_mut().packet_factory.clear_error();
    }
}

impl LocalEndpoint {
    /// Queue a raw datagram for the client to receive.
    ///
    /// Delivery beyond the inbound capacity drops the datagram and
    /// latches the packet factory error.
    pub fn deliver(&self, from: SocketAddr, datagram: Bytes) {
        let mut wire = self.wire.borrow_mut();
        if wire.inbound.len() >= wire.inbound_capacity {
            tracing::warn!("inbound queue overflow, dropping datagram from {from}");
            wire.packet_factory.report_error();
            return;
        }
        wire.inbound.push_back((from, datagram));
    }

    /// Take every datagram the client has sent since the last drain.
    #[must_use]
    pub fn drain_sent(&self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.wire.borrow_mut().sent)
    }

    /// Number of datagrams sent since the last drain.
    #[must_use]
    pub fn sent_len(&self) -> usize {
        self.wire.borrow().sent.len()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use volley_proto::{write_datagram, ConnectionHeartBeatPayload};

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn heartbeat(client_index: u32) -> Packet {
        Packet::ConnectionHeartBeat(ConnectionHeartBeatPayload { client_index })
    }

    #[test]
    fn sent_packets_are_recorded_and_parseable() {
        let (mut transport, endpoint) = LocalTransport::new();
        let server = addr(5000);

        transport.send_packet(server, heartbeat(1), 7, false);

        let sent = endpoint.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, server);
        assert_eq!(sent[0].packet_type, PacketType::ConnectionHeartBeat);
        assert_eq!(sent[0].sequence, 7);
        assert!(!sent[0].encrypted);

        let parsed = volley_proto::read_datagram(&sent[0].datagram, None).unwrap();
        assert_eq!(parsed.packet, heartbeat(1));
    }

    #[test]
    fn delivered_datagrams_come_back_out() {
        let (mut transport, endpoint) = LocalTransport::new();
        let server = addr(5001);

        let mut buf = BytesMut::new();
        write_datagram(&heartbeat(2), 9, None, &mut buf).unwrap();
        endpoint.deliver(server, buf.freeze());

        let received = transport.receive_packet().unwrap();
        assert_eq!(received.from, server);
        assert_eq!(received.sequence, 9);
        assert_eq!(received.packet, heartbeat(2));
        assert!(transport.receive_packet().is_none());
    }

    #[test]
    fn garbage_datagrams_are_skipped() {
        let (mut transport, endpoint) = LocalTransport::new();
        let server = addr(5002);

        endpoint.deliver(server, Bytes::from_static(b"not a datagram"));
        let mut buf = BytesMut::new();
        write_datagram(&heartbeat(3), 1, None, &mut buf).unwrap();
        endpoint.deliver(server, buf.freeze());

        // The garbage is skipped and the valid datagram still arrives.
        let received = transport.receive_packet().unwrap();
        assert_eq!(received.packet, heartbeat(3));
    }

    #[test]
    fn inbound_overflow_latches_packet_factory_error() {
        let (transport, endpoint) = LocalTransport::with_inbound_capacity(2);
        let server = addr(5003);

        for _ in 0..3 {
            let mut buf = BytesMut::new();
            write_datagram(&heartbeat(0), 1, None, &mut buf).unwrap();
            endpoint.deliver(server, buf.freeze());
        }

        assert!(transport.has_packet_factory_error());
    }
}
