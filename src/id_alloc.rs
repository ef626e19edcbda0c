use std::collections::HashSet;

use crate::error::{Result, TransportError};
use crate::frame::MessageId;

/// Allocates [`MessageId`]s for outgoing messages.
///
/// Grounded on `antt/data_structures.py`'s `FrameGenerator.new_id`, which
/// increments a counter and "loops past used ids" in name only: it never
/// re-checks for reuse once the counter wraps past `latest_id`'s starting
/// point, so two outstanding messages can collide on the same id after
/// enough traffic (noted in the specification's design notes as a bug to
/// fix, not silently port). This allocator instead walks forward from the
/// last-issued id, skipping every id in `ids_in_use`, and fails closed
/// rather than handing out a colliding id if the id space is exhausted.
#[derive(Debug)]
pub struct IdAllocator {
    next: u32,
    max: u32,
}

impl IdAllocator {
    /// `max` is the largest id representable at the endpoint's configured
    /// `id_width` (see `EndpointConfig::max_message_id`).
    pub fn new(max: u32) -> Self {
        Self { next: 0, max }
    }

    /// Returns the next id not present in `ids_in_use`, wrapping past `max`
    /// at most once. Errors if every id in `0..=max` is currently in use.
    pub fn allocate(&mut self, ids_in_use: &HashSet<u32>) -> Result<MessageId> {
        let span = self.max as u64 + 1;
        for _ in 0..span {
            let candidate = self.next;
            self.next = if self.next == self.max { 0 } else { self.next + 1 };
            if !ids_in_use.contains(&candidate) {
                return Ok(MessageId(candidate));
            }
        }
        Err(TransportError::QueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_when_free() {
        let mut alloc = IdAllocator::new(10);
        let used = HashSet::new();
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(0));
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(1));
    }

    #[test]
    fn skips_ids_in_use_across_wrap() {
        let mut alloc = IdAllocator::new(2); // ids 0,1,2
        let mut used = HashSet::new();
        used.insert(0);
        used.insert(1);
        used.insert(2);
        assert!(matches!(alloc.allocate(&used), Err(TransportError::QueueFull)));

        used.remove(&1);
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(1));
    }

    #[test]
    fn wraps_past_max_back_to_zero() {
        let mut alloc = IdAllocator::new(1); // ids 0,1
        let used = HashSet::new();
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(0));
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(1));
        assert_eq!(alloc.allocate(&used).unwrap(), MessageId(0));
    }
}
