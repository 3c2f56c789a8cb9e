//! Client-side connection state machine for the Volley protocol.
//!
//! Volley is a connection-oriented, datagram-based client/server protocol
//! for real-time games. The [`Client`] drives a session from disconnected
//! through a token-authenticated handshake to connected, and back down
//! under normal, denied, timed-out, or errored conditions. It is
//! single-threaded, non-blocking, and externally clocked: the host
//! application ticks it and supplies the time.
//!
//! # Tick loop
//!
//! ```no_run
//! # use volley_client::{Client, ClientConfig};
//! # use volley_client::transport::local::LocalTransport;
//! let (mut transport, _endpoint) = LocalTransport::new();
//! let mut client = Client::new(&mut transport, ClientConfig::default(), ());
//!
//! let now = 0.0;
//! loop {
//!     client.advance_time(now);
//!     client.receive_packets();
//!     client.send_packets();
//!     client.check_for_timeout();
//!     # break;
//!     // ... run a frame, then advance `now` ...
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Client`]: the state machine (handshake, per-state send/timeout
//!   policy, packet dispatch)
//! - [`ClientCallbacks`]: the embedder's observer hooks and factory
//!   overrides, injected at construction
//! - [`transport::Transport`]: the lower-level packet transport, borrowed
//!   exclusively for the client's lifetime
//! - [`connection::Connection`]: the messaging layer above a connected
//!   session; [`connection::MessageChannel`] is the in-tree
//!   implementation
//!
//! Failures are states, not errors: every way a session can end has its
//! own terminal [`ClientState`] below
//! [`Disconnected`](ClientState::Disconnected), and
//! [`ClientError`] is reserved for API misuse.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod allocator;
mod callbacks;
mod client;
mod config;
pub mod connection;
mod error;
pub mod messages;
mod state;
pub mod transport;

pub use callbacks::ClientCallbacks;
pub use client::Client;
pub use config::{ClientConfig, ConnectionConfig};
pub use error::ClientError;
pub use messages::{Message, SharedMessageFactory};
pub use state::ClientState;
pub use transport::{ReceivedPacket, Transport};
pub use volley_proto::{ChallengeToken, ConnectToken, Key, Packet, PacketType, TokenNonce};
