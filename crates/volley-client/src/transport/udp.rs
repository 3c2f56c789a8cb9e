//! Non-blocking UDP transport.
//!
//! A thin [`Transport`] over a `std` UDP socket in non-blocking mode,
//! matching the client's tick-driven model: `receive_packet` pops one
//! datagram per call and reports drained when the socket would block.
//! Sends go straight to the socket — there is no queuing layer, so the
//! `immediate` flag is a no-op here and every send behaves as immediate.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use volley_proto::{Key, Packet, PacketHeader, PacketType};

use super::{
    decode_incoming, encode_outgoing, Context, EncryptionTable, PacketFactory, ReceivedPacket,
    Transport,
};
use crate::allocator::SharedStreamAllocator;

/// Largest datagram the transport will accept from the socket.
const MAX_DATAGRAM_SIZE: usize = PacketHeader::SIZE + PacketHeader::MAX_PAYLOAD_SIZE as usize;

/// [`Transport`] over a non-blocking UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    table: EncryptionTable,
    allocator: Option<SharedStreamAllocator>,
    context: Option<Context>,
    packet_factory: PacketFactory,
    recv_buf: Box<[u8; MAX_DATAGRAM_SIZE]>,
}

impl UdpTransport {
    /// Bind a socket on `bind_addr` and put it in non-blocking mode.
    ///
    /// # Errors
    ///
    /// Propagates socket bind/configuration failures.
    pub fn bind(bind_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            table: EncryptionTable::new(),
            allocator: None,
            context: None,
            packet_factory: PacketFactory::new(),
            recv_buf: Box::new([0u8; MAX_DATAGRAM_SIZE]),
        })
    }

    /// The socket's local address.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The installed context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }
}

impl Transport for UdpTransport {
    fn send_packet(&mut self, to: SocketAddr, packet: Packet, sequence: u64, _immediate: bool) {
        let Some((datagram, _encrypted)) =
            encode_outgoing(&self.table, self.allocator.as_ref(), to, &packet, sequence)
        else {
            return;
        };

        if let Err(e) = self.socket.send_to(&datagram, to) {
            tracing::debug!("udp send to {to} failed: {e}");
        }
    }

    fn receive_packet(&mut self) -> Option<ReceivedPacket> {
        loop {
            let (len, from) = match self.socket.recv_from(&mut self.recv_buf[..]) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::debug!("udp receive failed: {e}");
                    return None;
                },
            };

            match decode_incoming(&self.table, from, &self.recv_buf[..len]) {
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
        self.packet_factory.has_error()
    }

    fn clear_packet_factory_error(&mut self) {
        self.packet_factory.clear_error();
    }
}

#[cfg(test)]
mod tests {
    use volley_proto::ConnectionHeartBeatPayload;

    use super::*;

    fn localhost_any() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[test]
    fn datagrams_cross_a_socket_pair() {
        let mut alice = UdpTransport::bind(localhost_any()).unwrap();
        let mut bob = UdpTransport::bind(localhost_any()).unwrap();
        let bob_addr = bob.local_addr().unwrap();
        let alice_addr = alice.local_addr().unwrap();

        let packet = Packet::ConnectionHeartBeat(ConnectionHeartBeatPayload { client_index: 4 });
        alice.send_packet(bob_addr, packet.clone(), 11, false);

        // Non-blocking receive: poll briefly for the loopback datagram.
        let mut received = None;
        for _ in 0..50 {
            if let Some(packet) = bob.receive_packet() {
                received = Some(packet);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let received = received.expect("datagram should arrive on loopback");
        assert_eq!(received.packet, packet);
        assert_eq!(received.sequence, 11);
        assert_eq!(received.from, alice_addr);
    }

    #[test]
    fn empty_socket_reports_drained() {
        let mut transport = UdpTransport::bind(localhost_any()).unwrap();
        assert!(transport.receive_packet().is_none());
    }
}
