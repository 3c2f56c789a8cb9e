//! Application messages and the message factory seam.
//!
//! Messages are the unit of the messaging layer above a connected
//! session: a small application-defined kind tag plus an opaque payload.
//! The factory is the embedder's hook for pooling or otherwise bounding
//! message allocation; its error flag is latched, checked once per tick
//! by the client, and turns into the
//! [`MessageFactoryError`](crate::ClientState::MessageFactoryError)
//! terminal state.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

/// An application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: u16,
    payload: Bytes,
}

impl Message {
    /// Create a message of the given kind with an empty payload.
    #[must_use]
    pub fn new(kind: u16) -> Self {
        Self { kind, payload: Bytes::new() }
    }

    /// Create a message with a payload.
    #[must_use]
    pub fn with_payload(kind: u16, payload: impl Into<Bytes>) -> Self {
        Self { kind, payload: payload.into() }
    }

    /// Application-defined message kind.
    #[must_use]
    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// The message payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Replace the payload.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }
}

/// Factory for application messages.
///
/// Implementations decide how messages are produced and reclaimed; a
/// pooling factory refuses creation when the pool is exhausted and
/// latches its error flag so the client can surface the failure as a
/// state transition instead of a panic mid-tick.
pub trait MessageFactory {
    /// Produce a message of the given kind. `None` latches the factory's
    /// error flag (or reflects one already latched).
    fn create(&mut self, kind: u16) -> Option<Message>;

    /// Return a message to the factory. The default just drops it.
    fn release(&mut self, message: Message) {
        let _ = message;
    }

    /// Whether a resource error has been latched since the last clear.
    fn has_error(&self) -> bool;

    /// Clear the latched error flag.
    fn clear_error(&mut self);
}

/// Shared handle to a message factory.
///
/// The factory is used from the client, the messaging layer, and the
/// transport context; the whole stack is single-threaded by contract, so
/// `Rc<RefCell<…>>` is the right sharing primitive.
pub type SharedMessageFactory = Rc<RefCell<dyn MessageFactory>>;

/// Message factory with a fixed cap on live messages.
///
/// `create` and `release` track the number of outstanding messages; a
/// `create` at the cap fails and latches the error flag. This is the
/// bounded-pool behavior a production embedder wants from a factory, in
/// its simplest form.
#[derive(Debug)]
pub struct BoundedMessageFactory {
    live: usize,
    capacity: usize,
    error: bool,
}

impl BoundedMessageFactory {
    /// Create a factory allowing at most `capacity` live messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { live: 0, capacity, error: false }
    }

    /// Wrap into the shared handle the client consumes.
    #[must_use]
    pub fn shared(capacity: usize) -> SharedMessageFactory {
        Rc::new(RefCell::new(Self::new(capacity)))
    }

    /// Number of currently outstanding messages.
    #[must_use]
    pub fn live(&self) -> usize {
        self.live
    }
}

impl MessageFactory for BoundedMessageFactory {
    fn create(&mut self, kind: u16) -> Option<Message> {
        if self.live >= self.capacity {
            self.error = true;
            return None;
        }
        self.live += 1;
        Some(Message::new(kind))
    }

    fn release(&mut self, message: Message) {
        drop(message);
        self.live = self.live.saturating_sub(1);
    }

    fn has_error(&self) -> bool {
        self.error
    }

    fn clear_error(&mut self) {
        self.error = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_at_capacity_latches_error() {
        let mut factory = BoundedMessageFactory::new(2);

        assert!(factory.create(0).is_some());
        assert!(factory.create(0).is_some());
        assert!(!factory.has_error());

        assert!(factory.create(0).is_none());
        assert!(factory.has_error());
    }

    #[test]
    fn release_frees_capacity_but_not_the_latch() {
        let mut factory = BoundedMessageFactory::new(1);

        let message = factory.create(7).unwrap();
        assert!(factory.create(7).is_none());

        factory.release(message);
        assert_eq!(factory.live(), 0);
        // The latch stays until explicitly cleared.
        assert!(factory.has_error());

        factory.clear_error();
        assert!(factory.create(7).is_some());
    }
}
