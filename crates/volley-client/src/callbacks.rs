//! Embedder hook surface.
//!
//! Everything the client lets an application observe or override is
//! collected into one capability set, injected at construction. Observer
//! hooks default to no-ops; factory hooks default to the stock
//! implementations. An embedder that wants messages must override
//! [`ClientCallbacks::create_message_factory`] — the default panics with
//! instructions, because there is no sensible stock answer for how the
//! application pools its messages.

use std::net::SocketAddr;

use volley_proto::{Packet, PacketType};

use crate::allocator::{HeapStreamAllocator, SharedStreamAllocator};
use crate::config::ConnectionConfig;
use crate::connection::{Connection, MessageChannel};
use crate::messages::SharedMessageFactory;
use crate::state::ClientState;
use crate::transport::Context;

/// Observer hooks and factory overrides for the client.
///
/// All methods have defaults; implement only what you need. The unit type
/// `()` implements this trait with all defaults, for clients that want no
/// hooks at all.
#[allow(unused_variables)]
pub trait ClientCallbacks {
    /// Called when a connect attempt begins, before any packet is sent.
    fn on_connect(&mut self, server: SocketAddr) {}

    /// Called on every state transition, including into terminal states.
    fn on_state_change(&mut self, previous: ClientState, current: ClientState) {}

    /// Called once per disconnect that changed state.
    fn on_disconnect(&mut self) {}

    /// Called after each packet is handed to the transport.
    fn on_packet_sent(&mut self, packet_type: PacketType, to: SocketAddr, immediate: bool) {}

    /// Called for each packet popped from the transport, before dispatch.
    fn on_packet_received(&mut self, packet_type: PacketType, from: SocketAddr, sequence: u64) {}

    /// Handle a packet the protocol does not own (a game packet), already
    /// filtered to connected sessions and the current server address.
    ///
    /// Return `true` if the packet counts as liveness evidence — the
    /// client then refreshes its receive deadline. The default ignores
    /// the packet entirely.
    fn process_game_packet(&mut self, packet: &Packet, sequence: u64) -> bool {
        false
    }

    /// Produce the stream allocator installed on the transport at first
    /// connect. Defaults to the unbounded heap allocator.
    fn create_stream_allocator(&mut self) -> SharedStreamAllocator {
        HeapStreamAllocator::shared()
    }

    /// Produce the message factory for this client's messages.
    ///
    /// # Panics
    ///
    /// The default panics: message support is enabled in the config but
    /// the embedder has not said how messages are created.
    fn create_message_factory(&mut self) -> SharedMessageFactory {
        panic!("override ClientCallbacks::create_message_factory if you want to use messages");
    }

    /// Produce the messaging layer bound to the nested connection config
    /// and the message factory. Defaults to the in-tree
    /// [`MessageChannel`].
    fn create_connection(
        &mut self,
        config: &ConnectionConfig,
        message_factory: SharedMessageFactory,
    ) -> Box<dyn Connection> {
        Box::new(MessageChannel::new(config.clone(), message_factory))
    }

    /// Produce the context installed on the transport for a
    /// connection-enabled session. The default binds the nested
    /// connection config and the message factory, which is all the stock
    /// transports consult.
    fn create_context(
        &mut self,
        config: &ConnectionConfig,
        message_factory: SharedMessageFactory,
    ) -> Context {
        Context { connection_config: config.clone(), message_factory }
    }
}

impl ClientCallbacks for () {}
