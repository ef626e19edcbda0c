pub mod buffer;

use std::time::Instant;

use self::buffer::{MissingParts, PartBuffer};
use crate::error::Result;
use crate::flat_map::FlatMap;
use crate::frame::{Frame, MessageId, PartIndex};

/// An incoming message being reassembled, or its tombstone once delivered.
///
/// Grounded on `tox-sequenced/src/reassembly/mod.rs`'s `MessageReassembler`,
/// with priority/quota fields dropped (no priority classes, no memory quota
/// here) and a `delivered` tombstone state added to match
/// `antt/data_structures.py`'s `building_blocks[id]` entries, which the
/// source keeps around (metadata only) after `pop_finished_messages` so a
/// duplicate arrival is silently ignored rather than re-delivered.
#[derive(Debug)]
pub struct IncomingMessage {
    pub message_id: MessageId,
    pub total_parts: u32,
    pub last_update: Instant,
    state: IncomingState,
}

#[derive(Debug)]
enum IncomingState {
    Building(PartBuffer),
    Delivered,
}

impl IncomingMessage {
    pub fn new(message_id: MessageId, total_parts: u32, now: Instant) -> Result<Self> {
        Ok(Self {
            message_id,
            total_parts,
            last_update: now,
            state: IncomingState::Building(PartBuffer::new(total_parts)?),
        })
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.state, IncomingState::Delivered)
    }

    /// Adds a frame's payload. Returns `true` once every part has arrived.
    /// A no-op against a tombstone (duplicate post-delivery arrival).
    pub fn add_frame(&mut self, frame: &Frame, now: Instant) -> Result<bool> {
        self.last_update = now;
        match &mut self.state {
            IncomingState::Delivered => Ok(false),
            IncomingState::Building(buf) => buf.add_part(frame.part_index, frame.payload.clone()),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(&self.state, IncomingState::Building(buf) if buf.is_complete())
    }

    pub fn missing_parts(&self) -> MissingParts {
        match &self.state {
            IncomingState::Building(buf) => buf.missing(),
            IncomingState::Delivered => MissingParts::new(),
        }
    }

    /// Consumes the buffer and marks this record a tombstone, so further
    /// arrivals with this id are ignored instead of re-delivered.
    pub fn take_and_tombstone(&mut self) -> Option<Vec<u8>> {
        let prior = std::mem::replace(&mut self.state, IncomingState::Delivered);
        match prior {
            IncomingState::Building(buf) => buf.assemble(),
            IncomingState::Delivered => None,
        }
    }
}

/// An outgoing message's send-side memory: every encoded frame, kept until
/// the peer's `0x09` fully-built acknowledgement arrives.
///
/// Grounded on `antt/data_structures.py`'s `send_memory[id]` dict, a plain
/// part-index-to-frame map, rather than `tox-sequenced/src/outgoing.rs`'s
/// SACK-bitmask/fast-retransmit/BBR-sampling `OutgoingMessage` (out of
/// scope: no congestion control, no cumulative-ack bitmap here).
#[derive(Debug)]
pub struct OutgoingMessage {
    pub message_id: MessageId,
    pub total_parts: u32,
    pub last_update: Instant,
    frames: FlatMap<u32, Frame>,
}

impl OutgoingMessage {
    pub fn new(message_id: MessageId, frames_in: Vec<Frame>, now: Instant) -> Self {
        let total_parts = frames_in.first().map(|f| f.total_parts.0).unwrap_or(0);
        let mut frames = FlatMap::new();
        for f in frames_in {
            frames.insert(f.part_index.0, f);
        }
        Self {
            message_id,
            total_parts,
            last_update: now,
            frames,
        }
    }

    pub fn frame_for(&self, part: PartIndex) -> Option<&Frame> {
        self.frames.get(&part.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::control::ControlByte;
    use crate::frame::chunk;
    use std::time::Instant;

    #[test]
    fn incoming_message_completes_and_tombstones() {
        let c = EndpointConfig::default();
        let payload = vec![9u8; c.chunk_size() * 2 + 3];
        let frames = chunk(MessageId(5), &payload, ControlByte::Data, &c).unwrap();
        let now = Instant::now();
        let mut msg = IncomingMessage::new(MessageId(5), frames.len() as u32, now).unwrap();
        for f in &frames[..frames.len() - 1] {
            assert!(!msg.add_frame(f, now).unwrap());
        }
        assert!(msg.add_frame(&frames[frames.len() - 1], now).unwrap());
        assert!(msg.is_complete());
        let assembled = msg.take_and_tombstone().unwrap();
        assert_eq!(assembled, payload);
        assert!(msg.is_tombstone());

        // Duplicate arrival after delivery is a no-op, not a re-delivery.
        assert!(!msg.add_frame(&frames[0], now).unwrap());
        assert_eq!(msg.take_and_tombstone(), None);
    }

    #[test]
    fn outgoing_message_replays_requested_part() {
        let c = EndpointConfig::default();
        let frames = chunk(MessageId(1), b"hello world", ControlByte::Data, &c).unwrap();
        let now = Instant::now();
        let out = OutgoingMessage::new(MessageId(1), frames.clone(), now);
        assert_eq!(out.frame_for(PartIndex(0)), Some(&frames[0]));
    }
}
