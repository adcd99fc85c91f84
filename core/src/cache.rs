//! Instruction-block cache.
//!
//! Decoded blocks are memoized by start address. The cache subscribes to the
//! MMU's write-notification channel and drains it before every lookup, so a
//! write into a cached block's range always evicts the entry before the next
//! fetch can observe stale code. Self-modifying code therefore re-decodes.
//!
//! Owned exclusively by the CPU driver; not internally synchronized.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;

use log::debug;

use crate::cpu::block::InstructionBlock;
use crate::cpu::decode::InstructionDecoder;
use crate::cpu::CoreError;
use crate::mem::{Mmu, WriteNotification};

pub struct BlockCache {
    blocks: HashMap<u16, InstructionBlock>,
    writes: Receiver<WriteNotification>,
    /// Decoder invocations, for cache-behavior assertions and diagnostics.
    decode_count: u64,
}

impl BlockCache {
    /// `writes` is the receiver half of [`Mmu::subscribe_writes`].
    pub fn new(writes: Receiver<WriteNotification>) -> Self {
        Self {
            blocks: HashMap::new(),
            writes,
            decode_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, address: u16) -> bool {
        self.blocks.contains_key(&address)
    }

    pub fn decode_count(&self) -> u64 {
        self.decode_count
    }

    /// Apply all pending write notifications. Called before every lookup;
    /// callers that mutate memory outside the driver loop may call it
    /// directly to observe invalidation.
    pub fn drain_writes(&mut self) {
        while let Ok(notification) = self.writes.try_recv() {
            self.invalidate_range(notification.address, notification.length);
        }
    }

    /// Evict every block whose decoded byte range intersects the written
    /// range.
    pub fn invalidate_range(&mut self, address: u16, length: u16) {
        let write_start = address as u32;
        let write_end = write_start + length as u32;
        self.blocks.retain(|&start, block| {
            let begin = start as u32;
            let end = begin + block.length() as u32;
            let intersects = begin < write_end && write_start < end;
            if intersects {
                debug!(
                    "evicting block at {start:#06x} after write to {address:#06x}+{length}"
                );
            }
            !intersects
        });
    }

    /// Fetch the block at `address`, invoking the decoder on a miss.
    pub fn get_or_decode(
        &mut self,
        address: u16,
        decoder: &InstructionDecoder,
        mmu: &Mmu,
    ) -> Result<&InstructionBlock, CoreError> {
        self.drain_writes();
        if !self.blocks.contains_key(&address) {
            let block = decoder.decode_block(mmu, address)?;
            self.decode_count += 1;
            self.blocks.insert(address, block);
        }
        Ok(&self.blocks[&address])
    }
}
