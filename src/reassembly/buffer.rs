use smallvec::SmallVec;

use crate::bitset::BitSet;
use crate::error::{Result, TransportError};
use crate::frame::PartIndex;

/// Most messages are missing only a handful of parts at any one retransmit
/// sweep; inline storage avoids a heap allocation for the common case,
/// mirroring `tox-sequenced/src/reassembly/mod.rs`'s `SmallVec<FragmentIndex, 8>`
/// for its own missing-index list (`create_nack`).
pub type MissingParts = SmallVec<[u32; 8]>;

/// Number of `u64` words backing the received-part bitset: covers up to
/// `BITSET_WORDS * 64` parts per message, comfortably above what a
/// `u24`-width `total_parts` field would ever realistically carry for the
/// default MTU.
pub const BITSET_WORDS: usize = 64;

/// Buffer for a single incoming message's parts.
///
/// Grounded on `tox-sequenced/src/reassembly/buffer.rs`'s `FragmentBuffer`,
/// stripped of its `planned_total_size`/overhead-estimation machinery (no
/// memory-quota admission control here) and its `base_index`/`highest_index`
/// SACK bookkeeping (gap detection here is a plain bitset scan).
#[derive(Debug, Clone)]
pub struct PartBuffer {
    parts: Vec<Option<Vec<u8>>>,
    total_parts: u32,
    received_mask: BitSet<BITSET_WORDS>,
    received_count: u32,
    current_size: usize,
}

impl PartBuffer {
    pub fn new(total_parts: u32) -> Result<Self> {
        if total_parts == 0 || total_parts as usize > BITSET_WORDS * 64 {
            return Err(TransportError::InvalidData(format!(
                "invalid total_parts {total_parts}"
            )));
        }
        Ok(Self {
            parts: vec![None; total_parts as usize],
            total_parts,
            received_mask: BitSet::new(),
            received_count: 0,
            current_size: 0,
        })
    }

    /// Stores `data` at `index`. Returns `true` if the buffer is now complete.
    /// A duplicate part at an already-received index is a no-op.
    pub fn add_part(&mut self, index: PartIndex, data: Vec<u8>) -> Result<bool> {
        if index.0 >= self.total_parts {
            return Err(TransportError::InvalidData(format!(
                "part index {} out of range for total_parts {}",
                index.0, self.total_parts
            )));
        }
        if self.received_mask.get(index.0 as usize) {
            return Ok(self.is_complete());
        }
        self.current_size += data.len();
        self.parts[index.0 as usize] = Some(data);
        self.received_mask.set(index.0 as usize);
        self.received_count += 1;
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_parts
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Every part index not yet received, in ascending order.
    pub fn missing(&self) -> MissingParts {
        self.received_mask
            .missing(self.total_parts as usize)
            .into_iter()
            .map(|i| i as u32)
            .collect()
    }

    /// Consumes the buffer, concatenating parts in order. `None` if incomplete.
    pub fn assemble(self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let mut out = Vec::with_capacity(self.current_size);
        for part in self.parts.into_iter().flatten() {
            out.extend_from_slice(&part);
        }
        Some(out)
    }
}
