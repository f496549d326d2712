//! FIFO queue for messages composed while no connection is open.

use std::collections::VecDeque;

use crate::message::Envelope;

/// Bounded FIFO buffer of envelopes awaiting a live transport.
///
/// When the buffer is full the oldest entry is dropped to admit the new one.
#[derive(Debug)]
pub struct Outbox {
    entries: VecDeque<Envelope>,
    capacity: usize,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity: capacity.max(1) }
    }

    /// Append an envelope, returning the evicted oldest entry if the
    /// outbox was full.
    pub fn enqueue(&mut self, envelope: Envelope) -> Option<Envelope> {
        let evicted =
            if self.entries.len() >= self.capacity { self.entries.pop_front() } else { None };
        self.entries.push_back(envelope);
        evicted
    }

    /// Remove and return the oldest queued envelope.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.entries.pop_front()
    }

    /// Put an envelope back at the head of the queue, preserving order after
    /// a flush that could not complete.
    pub fn requeue_front(&mut self, envelope: Envelope) {
        self.entries.push_front(envelope);
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the outbox holds no envelopes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
