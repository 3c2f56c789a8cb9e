//! Messaging layer seam above a connected session.
//!
//! The client drives whatever sits behind the [`Connection`] trait: once
//! per tick it advances time, asks for an outgoing connection packet, and
//! forwards incoming connection packets. The full reliable-messaging
//! engine is out of scope for this crate; [`MessageChannel`] is the
//! in-tree implementation — ordered, best-effort batching of messages
//! into connection packets with bounded queues — and the trait is the
//! seam where an embedder plugs in a real engine.

use std::collections::VecDeque;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::messages::{Message, SharedMessageFactory};

/// The messaging layer the client creates when connection support is
/// enabled.
pub trait Connection {
    /// Advance the layer's clock. Called once per tick, before packet
    /// exchange.
    fn advance_time(&mut self, time: f64);

    /// Whether the layer has latched an internal fault. The client
    /// converts this into the
    /// [`ConnectionError`](crate::ClientState::ConnectionError) terminal
    /// state.
    fn has_error(&self) -> bool;

    /// Produce the payload for the next outgoing connection packet, if
    /// there is anything to send.
    fn generate_packet(&mut self) -> Option<Bytes>;

    /// Consume the payload of an incoming connection packet.
    fn process_packet(&mut self, payload: &[u8]);

    /// Drop all queued state. Called whenever the client resets its
    /// handshake data.
    fn reset(&mut self);

    /// Whether the send queue can take another message.
    fn can_send_message(&self) -> bool;

    /// Queue a message for delivery.
    ///
    /// # Errors
    ///
    /// [`ClientError::SendQueueFull`] when the queue is at capacity; this
    /// also latches the layer's error flag.
    fn send_message(&mut self, message: Message) -> Result<(), ClientError>;

    /// Pop the next received message, if any.
    fn receive_message(&mut self) -> Option<Message>;
}

/// On-wire form of one batched message.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    kind: u16,
    payload: Bytes,
}

/// Ordered, best-effort message batching over connection packets.
///
/// Messages queue until the next tick's `generate_packet`, which drains
/// up to `max_messages_per_packet` of them into one CBOR batch. Queue
/// overflow on either side latches the error flag: the client is either
/// outrunning the send cadence or being flooded by the server, and both
/// are faults worth tearing the session down for.
pub struct MessageChannel {
    config: ConnectionConfig,
    message_factory: SharedMessageFactory,
    send_queue: VecDeque<Message>,
    receive_queue: VecDeque<Message>,
    error: bool,
}

impl MessageChannel {
    /// Create a channel with the given queue bounds, returning received
    /// messages through `message_factory` on reset.
    #[must_use]
    pub fn new(config: ConnectionConfig, message_factory: SharedMessageFactory) -> Self {
        Self {
            config,
            message_factory,
            send_queue: VecDeque::new(),
            receive_queue: VecDeque::new(),
            error: false,
        }
    }

    /// Number of messages waiting to be packed into packets.
    #[must_use]
    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }
}

impl Connection for MessageChannel {
    fn advance_time(&mut self, _time: f64) {
        // Batching has no time-based behavior; a real reliable engine
        // tracks resend deadlines here.
    }

    fn has_error(&self) -> bool {
        self.error
    }

    fn generate_packet(&mut self) -> Option<Bytes> {
        if self.send_queue.is_empty() {
            return None;
        }

        let count = self.send_queue.len().min(self.config.max_messages_per_packet);
        let batch: Vec<WireMessage> = self
            .send_queue
            .drain(..count)
            .map(|message| WireMessage {
                kind: message.kind(),
                payload: message.payload().clone(),
            })
            .collect();

        let mut encoded = Vec::new();
        match ciborium::ser::into_writer(&batch, &mut encoded) {
            Ok(()) => Some(Bytes::from(encoded)),
            Err(e) => {
                tracing::warn!("connection packet encode failed: {e}");
                self.error = true;
                None
            },
        }
    }

    fn process_packet(&mut self, payload: &[u8]) {
        let batch: Vec<WireMessage> = match ciborium::de::from_reader(payload) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!("dropping malformed connection packet: {e}");
                return;
            },
        };

        for wire in batch {
            if self.receive_queue.len() >= self.config.receive_queue_size {
                tracing::warn!("receive queue overflow, dropping message");
                self.error = true;
                return;
            }
            self.receive_queue.push_back(Message::with_payload(wire.kind, wire.payload));
        }
    }

    fn reset(&mut self) {
        let mut factory = self.message_factory.borrow_mut();
        for message in self.send_queue.drain(..).chain(self.receive_queue.drain(..)) {
            factory.release(message);
        }
        self.error = false;
    }

    fn can_send_message(&self) -> bool {
        self.send_queue.len() < self.config.send_queue_size
    }

    fn send_message(&mut self, message: Message) -> Result<(), ClientError> {
        if self.send_queue.len() >= self.config.send_queue_size {
            self.error = true;
            return Err(ClientError::SendQueueFull);
        }
        self.send_queue.push_back(message);
        Ok(())
    }

    fn receive_message(&mut self) -> Option<Message> {
        self.receive_queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::BoundedMessageFactory;

    fn channel(config: ConnectionConfig) -> MessageChannel {
        MessageChannel::new(config, BoundedMessageFactory::shared(64))
    }

    #[test]
    fn messages_roundtrip_through_a_packet() {
        let mut sender = channel(ConnectionConfig::default());
        let mut receiver = channel(ConnectionConfig::default());

        sender.send_message(Message::with_payload(1, &b"hello"[..])).unwrap();
        sender.send_message(Message::with_payload(2, &b"world"[..])).unwrap();

        let payload = sender.generate_packet().unwrap();
        receiver.process_packet(&payload);

        let first = receiver.receive_message().unwrap();
        assert_eq!((first.kind(), first.payload().as_ref()), (1, &b"hello"[..]));
        let second = receiver.receive_message().unwrap();
        assert_eq!((second.kind(), second.payload().as_ref()), (2, &b"world"[..]));
        assert!(receiver.receive_message().is_none());
    }

    #[test]
    fn no_packet_when_idle() {
        let mut chan = channel(ConnectionConfig::default());
        assert!(chan.generate_packet().is_none());
    }

    #[test]
    fn batches_respect_max_messages_per_packet() {
        let config = ConnectionConfig { max_messages_per_packet: 2, ..Default::default() };
        let mut chan = channel(config);

        for kind in 0..5 {
            chan.send_message(Message::new(kind)).unwrap();
        }

        assert!(chan.generate_packet().is_some());
        assert_eq!(chan.send_queue_len(), 3);
        assert!(chan.generate_packet().is_some());
        assert!(chan.generate_packet().is_some());
        assert!(chan.generate_packet().is_none());
    }

    #[test]
    fn send_queue_overflow_latches_error() {
        let config = ConnectionConfig { send_queue_size: 1, ..Default::default() };
        let mut chan = channel(config);

        assert!(chan.can_send_message());
        chan.send_message(Message::new(0)).unwrap();

        assert!(!chan.can_send_message());
        assert_eq!(chan.send_message(Message::new(1)), Err(ClientError::SendQueueFull));
        assert!(chan.has_error());
    }

    #[test]
    fn receive_queue_overflow_latches_error() {
        let config = ConnectionConfig { receive_queue_size: 1, ..Default::default() };
        let mut sender = channel(ConnectionConfig::default());
        let mut receiver = channel(config);

        sender.send_message(Message::new(0)).unwrap();
        sender.send_message(Message::new(1)).unwrap();
        let payload = sender.generate_packet().unwrap();

        receiver.process_packet(&payload);
        assert!(receiver.has_error());
    }

    #[test]
    fn malformed_packets_are_dropped_without_error() {
        let mut chan = channel(ConnectionConfig::default());
        chan.process_packet(b"\xff\xff not cbor");
        assert!(!chan.has_error());
        assert!(chan.receive_message().is_none());
    }

    #[test]
    fn reset_clears_queues_and_error() {
        let config = ConnectionConfig { send_queue_size: 1, ..Default::default() };
        let mut chan = channel(config);

        chan.send_message(Message::new(0)).unwrap();
        let _ = chan.send_message(Message::new(1));
        assert!(chan.has_error());

        chan.reset();
        assert!(!chan.has_error());
        assert!(chan.can_send_message());
        assert!(chan.generate_packet().is_none());
    }
}
