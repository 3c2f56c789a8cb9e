//! Stream allocator seam.
//!
//! The transport serializes every outgoing packet into a buffer it gets
//! from the stream allocator installed by the client. The allocator is
//! the embedder's lever for bounding serialization memory; like the
//! message factory, it reports failure through a latched error flag that
//! the client converts into the
//! [`StreamAllocatorError`](crate::ClientState::StreamAllocatorError)
//! terminal state on its next tick.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::BytesMut;

/// Allocator for packet serialization buffers.
pub trait StreamAllocator {
    /// Hand out a buffer with at least `len` bytes of capacity. `None`
    /// latches the error flag (or reflects one already latched).
    fn allocate(&mut self, len: usize) -> Option<BytesMut>;

    /// Whether a resource error has been latched since the last clear.
    fn has_error(&self) -> bool;

    /// Clear the latched error flag.
    fn clear_error(&mut self);
}

/// Shared handle to a stream allocator (client and transport both hold
/// one; single-threaded by contract).
pub type SharedStreamAllocator = Rc<RefCell<dyn StreamAllocator>>;

/// Plain heap allocator; never fails, never errors. The default from
/// [`ClientCallbacks::create_stream_allocator`](crate::ClientCallbacks::create_stream_allocator).
#[derive(Debug, Default)]
pub struct HeapStreamAllocator;

impl HeapStreamAllocator {
    /// Create a heap allocator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Wrap into the shared handle the client consumes.
    #[must_use]
    pub fn shared() -> SharedStreamAllocator {
        Rc::new(RefCell::new(Self::new()))
    }
}

impl StreamAllocator for HeapStreamAllocator {
    fn allocate(&mut self, len: usize) -> Option<BytesMut> {
        Some(BytesMut::with_capacity(len))
    }

    fn has_error(&self) -> bool {
        false
    }

    fn clear_error(&mut self) {}
}

/// Allocator that refuses any single allocation above a fixed size.
///
/// Models a fixed-block pool: a request the pool cannot satisfy fails and
/// latches the error flag.
#[derive(Debug)]
pub struct BoundedStreamAllocator {
    max_allocation: usize,
    error: bool,
}

impl BoundedStreamAllocator {
    /// Create an allocator refusing requests above `max_allocation` bytes.
    #[must_use]
    pub fn new(max_allocation: usize) -> Self {
        Self { max_allocation, error: false }
    }

    /// Wrap into the shared handle the client consumes.
    #[must_use]
    pub fn shared(max_allocation: usize) -> SharedStreamAllocator {
        Rc::new(RefCell::new(Self::new(max_allocation)))
    }
}

impl StreamAllocator for BoundedStreamAllocator {
    fn allocate(&mut self, len: usize) -> Option<BytesMut> {
        if len > self.max_allocation {
            self.error = true;
            return None;
        }
        Some(BytesMut::with_capacity(len))
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
    fn heap_allocator_never_errors() {
        let mut allocator = HeapStreamAllocator::new();
        assert!(allocator.allocate(1).is_some());
        assert!(allocator.allocate(1 << 20).is_some());
        assert!(!allocator.has_error());
    }

    #[test]
    fn bounded_allocator_latches_on_oversized_request() {
        let mut allocator = BoundedStreamAllocator::new(64);

        assert!(allocator.allocate(64).is_some());
        assert!(!allocator.has_error());

        assert!(allocator.allocate(65).is_none());
        assert!(allocator.has_error());

        // Latched until cleared, but small requests still succeed.
        assert!(allocator.allocate(1).is_some());
        assert!(allocator.has_error());

        allocator.clear_error();
        assert!(!allocator.has_error());
    }
}
