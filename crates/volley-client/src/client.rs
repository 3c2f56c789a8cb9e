//! Client connection state machine.
//!
//! The client is single-threaded and time-driven: the host application
//! ticks it by calling, in order, [`Client::advance_time`],
//! [`Client::receive_packets`], [`Client::send_packets`], and
//! [`Client::check_for_timeout`]. Receive-driven transitions happen
//! before send decisions, so a challenge that arrives this tick gets its
//! response sent this tick.
//!
//! # State machine
//!
//! ```text
//! ┌──────────────┐ connect  ┌─────────────────────────┐ Challenge ┌──────────────────────────┐
//! │ Disconnected │─────────>│ SendingConnectionRequest │──────────>│ SendingChallengeResponse │
//! └──────────────┘          └─────────────────────────-┘           └──────────────────────────┘
//!        ▲                        │ Denied/timeout                  │ HeartBeat        │ timeout
//!        │ disconnect             ▼                                 ▼                  ▼
//!        │                  ┌───────────────┐               ┌───────────┐      ┌───────────────┐
//!        └──────────────────│ failure state │<──────────────│ Connected │      │ failure state │
//!                           └───────────────┘ timeout/error └───────────┘      └───────────────┘
//! ```
//!
//! Failure is not an error type here: every way a session can end maps to
//! its own terminal state below `Disconnected`, and the application
//! decides whether and when to connect again.

use std::net::SocketAddr;

use volley_proto::{
    ChallengeToken, ConnectToken, ConnectionHeartBeatPayload, ConnectionRequestPayload,
    ConnectionResponsePayload, Key, Packet, PacketType, TokenNonce,
};

#[cfg(feature = "insecure-connect")]
use volley_proto::InsecureConnectPayload;

use crate::allocator::{SharedStreamAllocator, StreamAllocator};
use crate::callbacks::ClientCallbacks;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::messages::{Message, MessageFactory, SharedMessageFactory};
use crate::state::ClientState;
use crate::transport::Transport;

/// Sentinel for "never" on the send/receive clocks, far enough in the
/// past that no configured rate or timeout can misfire against it.
const NEVER: f64 = -1000.0;

/// Client-side connection state machine.
///
/// Owns the handshake state and the messaging substrate; borrows the
/// transport exclusively for its lifetime. The callbacks value is the
/// embedder's observer and factory surface ([`ClientCallbacks`]).
///
/// Disconnect the client before dropping it — tearing down a live
/// session without notifying the server leaves the server waiting out a
/// timeout.
pub struct Client<'t, T: Transport + ?Sized, C: ClientCallbacks = ()> {
    transport: &'t mut T,
    callbacks: C,
    config: ClientConfig,

    state: ClientState,
    time: f64,
    client_index: Option<u32>,
    server_address: Option<SocketAddr>,
    sequence: u64,
    last_packet_send_time: f64,
    last_packet_receive_time: f64,

    connect_token: ConnectToken,
    connect_token_nonce: TokenNonce,
    connect_token_expire_timestamp: u64,
    challenge_token: ChallengeToken,
    challenge_token_nonce: TokenNonce,
    #[cfg(feature = "insecure-connect")]
    client_salt: u64,

    stream_allocator: Option<SharedStreamAllocator>,
    message_factory: Option<SharedMessageFactory>,
    connection: Option<Box<dyn Connection>>,
}

impl<'t, T: Transport + ?Sized, C: ClientCallbacks> Client<'t, T, C> {
    /// Create a disconnected client over `transport`.
    pub fn new(transport: &'t mut T, config: ClientConfig, callbacks: C) -> Self {
        Self {
            transport,
            callbacks,
            config,
            state: ClientState::Disconnected,
            time: 0.0,
            client_index: None,
            server_address: None,
            sequence: 0,
            last_packet_send_time: NEVER,
            last_packet_receive_time: NEVER,
            connect_token: ConnectToken::zeroed(),
            connect_token_nonce: TokenNonce::zeroed(),
            connect_token_expire_timestamp: 0,
            challenge_token: ChallengeToken::zeroed(),
            challenge_token_nonce: TokenNonce::zeroed(),
            #[cfg(feature = "insecure-connect")]
            client_salt: 0,
            stream_allocator: None,
            message_factory: None,
            connection: None,
        }
    }

    /// Begin a secure connection attempt against `server`.
    ///
    /// Any prior session is torn down first. Packet encryption is enabled
    /// for everything except the connection request itself (the server
    /// cannot share a session key with a client it has never seen; the
    /// connect token carries its own encrypted section), the key pair is
    /// installed for the server endpoint, and the first request goes out
    /// on the next [`send_packets`](Self::send_packets).
    #[allow(clippy::too_many_arguments)]
    pub fn connect(
        &mut self,
        server: SocketAddr,
        connect_token: ConnectToken,
        connect_token_nonce: TokenNonce,
        client_to_server_key: Key,
        server_to_client_key: Key,
        connect_token_expire_timestamp: u64,
    ) {
        self.disconnect();

        self.initialize_connection();

        self.server_address = Some(server);

        self.set_encrypted_packet_types();

        self.callbacks.on_connect(server);

        self.set_state(ClientState::SendingConnectionRequest);

        let time = self.time;
        self.last_packet_send_time = time - 1.0;
        self.last_packet_receive_time = time;

        self.connect_token = connect_token;
        self.connect_token_nonce = connect_token_nonce;

        self.transport.add_encryption_mapping(server, client_to_server_key, server_to_client_key);

        self.connect_token_expire_timestamp = connect_token_expire_timestamp;
    }

    /// Begin an insecure (tokenless) connection attempt against `server`.
    ///
    /// For development and LAN play: no token, no encryption — the
    /// transport's key mappings are cleared and encryption is switched
    /// off, and a fresh random client salt disambiguates this attempt
    /// from earlier ones off the same endpoint.
    #[cfg(feature = "insecure-connect")]
    pub fn insecure_connect(&mut self, server: SocketAddr) {
        self.disconnect();

        self.initialize_connection();

        self.server_address = Some(server);

        self.callbacks.on_connect(server);

        self.set_state(ClientState::SendingInsecureConnect);

        let time = self.time;
        self.last_packet_send_time = time - 1.0;
        self.last_packet_receive_time = time;

        self.client_salt = rand::random();

        self.transport.reset_encryption_mappings();
        self.transport.disable_packet_encryption();
    }

    /// Disconnect gracefully: notify the server best-effort and return to
    /// [`ClientState::Disconnected`]. No-op if already disconnected.
    pub fn disconnect(&mut self) {
        self.disconnect_to(ClientState::Disconnected, true);
    }

    fn disconnect_to(&mut self, state: ClientState, send_disconnect_packet: bool) {
        debug_assert!(state <= ClientState::Disconnected);

        if self.state <= ClientState::Disconnected {
            return;
        }

        if self.state != state {
            self.callbacks.on_disconnect();
        }

        if send_disconnect_packet && self.state > ClientState::Disconnected {
            for _ in 0..self.config.num_disconnect_packets {
                self.send_packet_to_server_internal(Packet::ConnectionDisconnect, true);
            }
        }

        self.reset_connection_data(state);

        self.transport.reset_encryption_mappings();
    }

    /// Advance the client's clock and surface any latched subsystem
    /// errors as terminal states. Time must be nondecreasing.
    pub fn advance_time(&mut self, time: f64) {
        debug_assert!(time >= self.time, "time must not go backwards");

        self.time = time;

        let allocator_error =
            self.stream_allocator.as_ref().is_some_and(|a| a.borrow().has_error());
        if allocator_error {
            self.disconnect_to(ClientState::StreamAllocatorError, true);
            if let Some(allocator) = &self.stream_allocator {
                allocator.borrow_mut().clear_error();
            }
            return;
        }

        let factory_error = self.message_factory.as_ref().is_some_and(|f| f.borrow().has_error());
        if factory_error {
            self.disconnect_to(ClientState::MessageFactoryError, true);
            if let Some(factory) = &self.message_factory {
                factory.borrow_mut().clear_error();
            }
            return;
        }

        if self.transport.has_packet_factory_error() {
            self.disconnect_to(ClientState::PacketFactoryError, true);
            self.transport.clear_packet_factory_error();
            return;
        }

        // The connection's error flag is not cleared here: the channel is
        // reset wholesale on the next connect.
        if self.connection.as_ref().is_some_and(|c| c.has_error()) {
            self.disconnect_to(ClientState::ConnectionError, true);
            return;
        }

        if let Some(connection) = &mut self.connection {
            connection.advance_time(time);
        }
    }

    /// Drain the transport and dispatch every queued packet.
    pub fn receive_packets(&mut self) {
        while let Some(received) = self.transport.receive_packet() {
            self.process_packet(received.packet, received.from, received.sequence);
        }
    }

    /// Emit whatever the current state owes the wire: handshake packets
    /// at their per-state cadence, or connection data plus heartbeats
    /// while connected.
    pub fn send_packets(&mut self) {
        let time = self.time;

        match self.state {
            #[cfg(feature = "insecure-connect")]
            ClientState::SendingInsecureConnect => {
                if self.last_packet_send_time + self.config.insecure_connect_send_rate > time {
                    return;
                }

                let packet =
                    Packet::InsecureConnect(InsecureConnectPayload { client_salt: self.client_salt });
                self.send_packet_to_server_internal(packet, false);
            },

            ClientState::SendingConnectionRequest => {
                if self.last_packet_send_time + self.config.connection_request_send_rate > time {
                    return;
                }

                let packet = Packet::ConnectionRequest(ConnectionRequestPayload {
                    expire_timestamp: self.connect_token_expire_timestamp,
                    token: self.connect_token.clone(),
                    nonce: self.connect_token_nonce.clone(),
                });
                self.send_packet_to_server_internal(packet, false);
            },

            ClientState::SendingChallengeResponse => {
                if self.last_packet_send_time + self.config.connection_response_send_rate > time {
                    return;
                }

                let packet = Packet::ConnectionResponse(ConnectionResponsePayload {
                    token: self.challenge_token.clone(),
                    nonce: self.challenge_token_nonce.clone(),
                });
                self.send_packet_to_server_internal(packet, false);
            },

            ClientState::Connected => {
                if let Some(payload) = self.connection.as_mut().and_then(|c| c.generate_packet()) {
                    self.send_packet_to_server(Packet::Connection(payload));
                }

                // A data packet this tick refreshes the send clock above,
                // which suppresses the heartbeat: liveness piggybacks on
                // data.
                if self.last_packet_send_time + self.config.connection_heartbeat_rate <= time {
                    let packet = Packet::ConnectionHeartBeat(ConnectionHeartBeatPayload {
                        client_index: self.client_index.unwrap_or(0),
                    });
                    self.send_packet_to_server(packet);
                }
            },

            _ => {},
        }
    }

    /// Trip the current state's receive deadline if it has elapsed. Each
    /// active state has its own deadline and its own terminal state; no
    /// disconnect packets are sent on timeout (the peer is presumed
    /// unreachable).
    pub fn check_for_timeout(&mut self) {
        let time = self.time;

        match self.state {
            #[cfg(feature = "insecure-connect")]
            ClientState::SendingInsecureConnect => {
                if self.last_packet_receive_time + self.config.insecure_connect_timeout < time {
                    self.disconnect_to(ClientState::InsecureConnectTimeout, false);
                }
            },

            ClientState::SendingConnectionRequest => {
                if self.last_packet_receive_time + self.config.connection_request_timeout < time {
                    self.disconnect_to(ClientState::ConnectionRequestTimeout, false);
                }
            },

            ClientState::SendingChallengeResponse => {
                if self.last_packet_receive_time + self.config.challenge_response_timeout < time {
                    self.disconnect_to(ClientState::ChallengeResponseTimeout, false);
                }
            },

            ClientState::Connected => {
                if self.last_packet_receive_time + self.config.connection_timeout < time {
                    self.disconnect_to(ClientState::ConnectionTimeout, false);
                }
            },

            _ => {},
        }
    }

    /// Send an application packet to the server. Dropped unless
    /// connected.
    pub fn send_packet_to_server(&mut self, packet: Packet) {
        if !self.is_connected() {
            tracing::debug!("dropping {} packet: not connected", packet.packet_type().name());
            return;
        }

        self.send_packet_to_server_internal(packet, false);
    }

    fn send_packet_to_server_internal(&mut self, packet: Packet, immediate: bool) {
        debug_assert!(self.state > ClientState::Disconnected);

        let Some(server) = self.server_address else {
            debug_assert!(false, "no server address while sending");
            return;
        };

        self.sequence += 1;
        let packet_type = packet.packet_type();

        self.transport.send_packet(server, packet, self.sequence, immediate);

        self.callbacks.on_packet_sent(packet_type, server, immediate);

        self.last_packet_send_time = self.time;
    }

    fn process_packet(&mut self, packet: Packet, from: SocketAddr, sequence: u64) {
        self.callbacks.on_packet_received(packet.packet_type(), from, sequence);

        match packet {
            Packet::ConnectionDenied => self.process_connection_denied(from),
            Packet::ConnectionChallenge(payload) => {
                self.process_connection_challenge(payload.token, payload.nonce, from);
            },
            Packet::ConnectionHeartBeat(payload) => {
                self.process_connection_heartbeat(payload.client_index, from);
            },
            Packet::ConnectionDisconnect => self.process_connection_disconnect(from),
            Packet::Connection(payload) => self.process_connection_packet(&payload, from),
            // Everything else — game packets, and protocol kinds only a
            // server should ever receive — goes through the game packet
            // gate.
            other => self.process_game_packet(other, from, sequence),
        }
    }

    fn process_connection_denied(&mut self, from: SocketAddr) {
        if self.state != ClientState::SendingConnectionRequest {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        self.set_state(ClientState::ConnectionDenied);
    }

    fn process_connection_challenge(
        &mut self,
        token: ChallengeToken,
        nonce: TokenNonce,
        from: SocketAddr,
    ) {
        if self.state != ClientState::SendingConnectionRequest {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        self.challenge_token = token;
        self.challenge_token_nonce = nonce;

        self.set_state(ClientState::SendingChallengeResponse);

        self.last_packet_receive_time = self.time;
    }

    fn process_connection_heartbeat(&mut self, client_index: u32, from: SocketAddr) {
        if !self.is_pending_connect() && !self.is_connected() {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        if self.is_pending_connect() {
            self.complete_pending_connect(client_index);
        }

        self.last_packet_receive_time = self.time;
    }

    fn process_connection_disconnect(&mut self, from: SocketAddr) {
        if self.state != ClientState::Connected {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        self.disconnect_to(ClientState::Disconnected, false);
    }

    fn process_connection_packet(&mut self, payload: &[u8], from: SocketAddr) {
        if !self.is_connected() {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        if let Some(connection) = &mut self.connection {
            connection.process_packet(payload);
        }

        self.last_packet_receive_time = self.time;
    }

    fn process_game_packet(&mut self, packet: Packet, from: SocketAddr, sequence: u64) {
        if !self.is_connected() {
            return;
        }

        if Some(from) != self.server_address {
            return;
        }

        // The hook decides whether a custom packet counts as liveness
        // evidence.
        if self.callbacks.process_game_packet(&packet, sequence) {
            self.last_packet_receive_time = self.time;
        }
    }

    fn is_pending_connect(&self) -> bool {
        #[cfg(feature = "insecure-connect")]
        {
            self.state == ClientState::SendingChallengeResponse
                || self.state == ClientState::SendingInsecureConnect
        }
        #[cfg(not(feature = "insecure-connect"))]
        {
            self.state == ClientState::SendingChallengeResponse
        }
    }

    fn complete_pending_connect(&mut self, client_index: u32) {
        if self.state == ClientState::SendingChallengeResponse {
            self.client_index = Some(client_index);

            // Authenticated: the tokens have done their job.
            self.connect_token.clear();
            self.connect_token_nonce.clear();
            self.challenge_token.clear();
            self.challenge_token_nonce.clear();

            self.set_state(ClientState::Connected);
        }

        #[cfg(feature = "insecure-connect")]
        if self.state == ClientState::SendingInsecureConnect {
            self.client_index = Some(client_index);

            self.set_state(ClientState::Connected);
        }
    }

    fn initialize_connection(&mut self) {
        if self.stream_allocator.is_none() {
            let allocator = self.callbacks.create_stream_allocator();
            self.transport.set_stream_allocator(allocator.clone());
            self.stream_allocator = Some(allocator);
        }

        if self.config.enable_connection {
            if self.connection.is_none() {
                let factory = self.callbacks.create_message_factory();
                let connection =
                    self.callbacks.create_connection(&self.config.connection, factory.clone());
                let context =
                    self.callbacks.create_context(&self.config.connection, factory.clone());

                self.transport.set_context(Some(context));

                self.message_factory = Some(factory);
                self.connection = Some(connection);
            }
        } else {
            self.transport.set_context(None);
        }
    }

    fn set_encrypted_packet_types(&mut self) {
        self.transport.enable_packet_encryption();
        self.transport.disable_encryption_for_packet_type(PacketType::ConnectionRequest);
    }

    fn set_state(&mut self, state: ClientState) {
        let previous = self.state;

        self.state = state;

        if state != previous {
            tracing::info!("client changed state from '{previous}' to '{state}'");
            self.callbacks.on_state_change(previous, state);
        }
    }

    fn reset_connection_data(&mut self, state: ClientState) {
        self.client_index = None;
        self.server_address = None;
        self.set_state(state);
        self.last_packet_send_time = NEVER;
        self.last_packet_receive_time = NEVER;
        self.connect_token.clear();
        self.connect_token_nonce.clear();
        self.challenge_token.clear();
        self.challenge_token_nonce.clear();
        self.transport.reset_encryption_mappings();
        self.sequence = 0;
        #[cfg(feature = "insecure-connect")]
        {
            self.client_salt = 0;
        }
        if let Some(connection) = &mut self.connection {
            connection.reset();
        }
    }

    /// Create a message of the given kind from the message factory.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NoMessageFactory`] before the first connect or
    ///   with connection support disabled
    /// - [`ClientError::MessageCreateFailed`] if the factory refuses
    pub fn create_message(&mut self, kind: u16) -> Result<Message, ClientError> {
        let factory = self.message_factory.as_ref().ok_or(ClientError::NoMessageFactory)?;
        factory.borrow_mut().create(kind).ok_or(ClientError::MessageCreateFailed { kind })
    }

    /// Whether a message can be queued right now. False when not
    /// connected.
    #[must_use]
    pub fn can_send_message(&self) -> bool {
        self.is_connected() && self.connection.as_ref().is_some_and(|c| c.can_send_message())
    }

    /// Queue a message for delivery to the server.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] unless connected
    /// - [`ClientError::NoMessageFactory`] with connection support
    ///   disabled
    /// - [`ClientError::SendQueueFull`] if the messaging layer refuses
    pub fn send_message(&mut self, message: Message) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected { operation: "send message" });
        }

        let connection = self.connection.as_mut().ok_or(ClientError::NoMessageFactory)?;
        connection.send_message(message)
    }

    /// Pop the next received message. `None` when not connected or when
    /// there is nothing queued.
    pub fn receive_message(&mut self) -> Option<Message> {
        if !self.is_connected() {
            return None;
        }

        self.connection.as_mut().and_then(|c| c.receive_message())
    }

    /// Return a message to the factory.
    pub fn release_message(&mut self, message: Message) {
        match &self.message_factory {
            Some(factory) => factory.borrow_mut().release(message),
            None => drop(message),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Server-assigned client slot. `Some` exactly while connected.
    #[must_use]
    pub fn client_index(&self) -> Option<u32> {
        self.client_index
    }

    /// The clock as of the last [`advance_time`](Self::advance_time).
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The server endpoint of the current attempt or session.
    #[must_use]
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.server_address
    }

    /// True while a connect attempt is in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }

    /// True once the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// True when no attempt is in flight.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state.is_disconnected()
    }

    /// True if the last attempt or session ended in a failure state.
    #[must_use]
    pub fn connection_failed(&self) -> bool {
        self.state.connection_failed()
    }

    /// Handle to the message factory, once one exists.
    #[must_use]
    pub fn message_factory(&self) -> Option<SharedMessageFactory> {
        self.message_factory.clone()
    }

    /// The injected callbacks.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// The injected callbacks, mutably.
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }
}

impl<T: Transport + ?Sized, C: ClientCallbacks> Drop for Client<'_, T, C> {
    fn drop(&mut self) {
        // Matches the protocol contract: tear sessions down explicitly.
        debug_assert!(!self.is_connected(), "disconnect the client before dropping it");
    }
}
