//! Per-pass collection of rendered source chunks.

use crate::error::{Result, SonorityError};
use crate::mixfunc::MixFuncTable;

/// One source's rendered chunk for the current pass.
#[derive(Debug, Clone, Default)]
pub struct MixEntry {
    samples: Vec<i16>,
}

impl MixEntry {
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl From<Vec<i16>> for MixEntry {
    fn from(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}

/// Scratch entries reused across passes. Entries past `count` keep their
/// allocations so steady-state passes do not allocate.
#[derive(Debug)]
pub struct MixManager {
    entries: Vec<MixEntry>,
    count: usize,
    capacity: usize,
    chunk_len: usize,
}

impl MixManager {
    pub fn new(capacity: usize, chunk_len: usize) -> Result<Self> {
        let mut manager = Self {
            entries: Vec::new(),
            count: 0,
            capacity: 0,
            chunk_len,
        };
        manager.reserve(capacity)?;
        Ok(manager)
    }

    /// Grow to hold at least `capacity` entries.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        self.entries
            .try_reserve(capacity.saturating_sub(self.entries.len()))?;
        self.capacity = capacity;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per entry (frames times output channels).
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn set_chunk_len(&mut self, chunk_len: usize) {
        self.chunk_len = chunk_len;
        self.count = 0;
    }

    /// Entries added since the last mix.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Register one source's chunk. Longer input is truncated to the chunk
    /// length, shorter input is padded with silence.
    pub fn add(&mut self, samples: &[i16]) -> Result<()> {
        if self.count >= self.capacity {
            return Err(SonorityError::InvalidOperation(format!(
                "Mix manager full ({} entries)",
                self.capacity
            )));
        }
        if self.count == self.entries.len() {
            let mut buf = Vec::new();
            buf.try_reserve_exact(self.chunk_len)?;
            self.entries.push(MixEntry { samples: buf });
        }

        let take = samples.len().min(self.chunk_len);
        let entry = &mut self.entries[self.count].samples;
        entry.clear();
        entry.extend_from_slice(&samples[..take]);
        entry.resize(self.chunk_len, 0);
        self.count += 1;
        Ok(())
    }

    /// Mix every added entry into `dst` and reset for the next pass.
    pub fn mix(&mut self, table: &MixFuncTable, dst: &mut [i16]) {
        table.mix(dst, &self.entries[..self.count]);
        self.count = 0;
    }

    /// Drop the entries added this pass without mixing them.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
