//! Client states and their ordering.
//!
//! The state set is closed and totally ordered. The order is load-bearing:
//! every failure state sorts below [`ClientState::Disconnected`], every
//! in-progress handshake state sorts between `Disconnected` and
//! [`ClientState::Connected`], and the connection predicates are plain
//! inequality tests against those two pivots.
//!
//! ```text
//! failure states  <  Disconnected  <  in-progress states  <  Connected
//!      (< 0)            (= 0)              (> 0)               (max)
//! ```

use std::fmt;

/// Client connection state.
///
/// Discriminants are explicit so the zone partition above survives any
/// reordering of the declaration and stays stable when the
/// `insecure-connect` feature removes variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum ClientState {
    /// The transport's packet factory latched a resource error.
    PacketFactoryError = -9,
    /// The message factory latched a resource error.
    MessageFactoryError = -8,
    /// The stream allocator latched a resource error.
    StreamAllocatorError = -7,
    /// No challenge arrived in time while sending connection requests.
    ConnectionRequestTimeout = -6,
    /// No heartbeat arrived in time while sending challenge responses.
    ChallengeResponseTimeout = -5,
    /// The server went silent while connected.
    ConnectionTimeout = -4,
    /// The messaging layer reported an internal fault.
    ConnectionError = -3,
    /// The server explicitly rejected the connection request.
    ConnectionDenied = -2,
    /// No heartbeat arrived in time while sending insecure connects.
    #[cfg(feature = "insecure-connect")]
    InsecureConnectTimeout = -1,
    /// Not connected and not trying to be.
    Disconnected = 0,
    /// Sending insecure connect packets, waiting for a heartbeat.
    #[cfg(feature = "insecure-connect")]
    SendingInsecureConnect = 1,
    /// Sending connection requests, waiting for a challenge.
    SendingConnectionRequest = 2,
    /// Sending challenge responses, waiting for a heartbeat.
    SendingChallengeResponse = 3,
    /// Fully connected; the messaging layer is live.
    Connected = 4,
}

impl ClientState {
    /// True while a connect attempt is in flight (strictly between
    /// `Disconnected` and `Connected`).
    #[must_use]
    pub fn is_connecting(self) -> bool {
        self > Self::Disconnected && self < Self::Connected
    }

    /// True once the handshake has completed.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// True when no attempt is in flight: `Disconnected` itself or any
    /// failure state.
    #[must_use]
    pub fn is_disconnected(self) -> bool {
        self <= Self::Disconnected
    }

    /// True only for failure states (strictly below `Disconnected`).
    #[must_use]
    pub fn connection_failed(self) -> bool {
        self < Self::Disconnected
    }

    /// Human-readable state name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PacketFactoryError => "packet factory error",
            Self::MessageFactoryError => "message factory error",
            Self::StreamAllocatorError => "stream allocator error",
            Self::ConnectionRequestTimeout => "connection request timeout",
            Self::ChallengeResponseTimeout => "challenge response timeout",
            Self::ConnectionTimeout => "connection timeout",
            Self::ConnectionError => "connection error",
            Self::ConnectionDenied => "connection denied",
            #[cfg(feature = "insecure-connect")]
            Self::InsecureConnectTimeout => "insecure connect timeout",
            Self::Disconnected => "disconnected",
            #[cfg(feature = "insecure-connect")]
            Self::SendingInsecureConnect => "sending insecure connect",
            Self::SendingConnectionRequest => "sending connection request",
            Self::SendingChallengeResponse => "sending challenge response",
            Self::Connected => "connected",
        }
    }

    /// All states, in ascending order.
    #[cfg(test)]
    pub(crate) const ALL: &'static [Self] = &[
        Self::PacketFactoryError,
        Self::MessageFactoryError,
        Self::StreamAllocatorError,
        Self::ConnectionRequestTimeout,
        Self::ChallengeResponseTimeout,
        Self::ConnectionTimeout,
        Self::ConnectionError,
        Self::ConnectionDenied,
        #[cfg(feature = "insecure-connect")]
        Self::InsecureConnectTimeout,
        Self::Disconnected,
        #[cfg(feature = "insecure-connect")]
        Self::SendingInsecureConnect,
        Self::SendingConnectionRequest,
        Self::SendingChallengeResponse,
        Self::Connected,
    ];
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
