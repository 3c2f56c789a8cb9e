//! Client error type.
//!
//! Protocol failures (denial, timeouts, subsystem faults) are not errors
//! here — they are terminal state transitions reported through
//! [`ClientState`](crate::ClientState). `ClientError` covers only API
//! misuse and message-layer resource failures, the cases where the caller
//! did something that cannot be expressed as a state.

use thiserror::Error;

/// Errors returned by the client's message operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation requires a connected session
    #[error("cannot {operation}: client is not connected")]
    NotConnected {
        /// The operation that was attempted
        operation: &'static str,
    },

    /// No message factory exists (connection support disabled, or
    /// `connect` has never been called)
    #[error("no message factory: enable the connection layer and connect first")]
    NoMessageFactory,

    /// The message factory could not produce a message
    #[error("message factory could not create message kind {kind}")]
    MessageCreateFailed {
        /// Requested message kind
        kind: u16,
    },

    /// The outgoing message queue is full
    #[error("message send queue is full")]
    SendQueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_operation() {
        let err = ClientError::NotConnected { operation: "send message" };
        assert!(err.to_string().contains("send message"));
    }
}
