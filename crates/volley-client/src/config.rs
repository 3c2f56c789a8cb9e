//! Client and messaging-layer configuration.
//!
//! All rates and timeouts are in seconds, matching the `f64` time domain
//! the host application drives through [`Client::advance_time`]. A "send
//! rate" is the interval between successive sends in the corresponding
//! state, not a frequency.
//!
//! [`Client::advance_time`]: crate::Client::advance_time

/// Configuration for the messaging layer created when
/// [`ClientConfig::enable_connection`] is set.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum messages batched into one connection packet.
    pub max_messages_per_packet: usize,
    /// Outgoing message queue capacity.
    pub send_queue_size: usize,
    /// Incoming message queue capacity.
    pub receive_queue_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { max_messages_per_packet: 64, send_queue_size: 1024, receive_queue_size: 1024 }
    }
}

/// Client configuration: send cadence, receive deadlines, and teardown
/// behavior per state.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whether to spin up the messaging layer on connect. When false the
    /// client still completes the handshake but offers no message API.
    pub enable_connection: bool,
    /// Seconds between connection request sends.
    pub connection_request_send_rate: f64,
    /// Seconds between challenge response sends.
    pub connection_response_send_rate: f64,
    /// Seconds between heartbeats while connected.
    pub connection_heartbeat_rate: f64,
    /// Seconds between insecure connect sends.
    #[cfg(feature = "insecure-connect")]
    pub insecure_connect_send_rate: f64,
    /// Seconds of silence before a connection request attempt times out.
    pub connection_request_timeout: f64,
    /// Seconds of silence before a challenge response attempt times out.
    pub challenge_response_timeout: f64,
    /// Seconds of silence before a connected session times out.
    pub connection_timeout: f64,
    /// Seconds of silence before an insecure connect attempt times out.
    #[cfg(feature = "insecure-connect")]
    pub insecure_connect_timeout: f64,
    /// Best-effort disconnect notifications sent on teardown.
    pub num_disconnect_packets: usize,
    /// Configuration handed to the messaging layer.
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enable_connection: true,
            connection_request_send_rate: 0.1,
            connection_response_send_rate: 0.1,
            connection_heartbeat_rate: 1.0,
            #[cfg(feature = "insecure-connect")]
            insecure_connect_send_rate: 0.1,
            connection_request_timeout: 5.0,
            challenge_response_timeout: 5.0,
            connection_timeout: 10.0,
            #[cfg(feature = "insecure-connect")]
            insecure_connect_timeout: 5.0,
            num_disconnect_packets: 10,
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeats_outpace_the_connection_timeout() {
        let config = ClientConfig::default();
        // A healthy connection must fit several heartbeats inside the
        // timeout window, or an idle session would flap.
        assert!(config.connection_heartbeat_rate * 3.0 < config.connection_timeout);
    }

    #[test]
    fn handshake_rates_fit_their_timeouts() {
        let config = ClientConfig::default();
        assert!(config.connection_request_send_rate < config.connection_request_timeout);
        assert!(config.connection_response_send_rate < config.challenge_response_timeout);
    }
}
