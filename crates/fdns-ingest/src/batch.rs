//! Fixed-size record batching
//!
//! Buffers normalized records and hands back a full batch, with ownership,
//! when the configured size is reached. The accumulator never mutates a
//! buffer after handoff: a flush returns the filled `Vec` and starts a
//! fresh one.

use fdns_common::NormalizedRecord;

/// Accumulates records into batches of at most `capacity` entries.
///
/// Batch size trades write-amplification (too small) against peak memory
/// and write-stall latency (too large); it is a tunable constant, never
/// derived from the input.
#[derive(Debug)]
pub struct BatchAccumulator {
    buf: Vec<NormalizedRecord>,
    capacity: usize,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        // A zero capacity would flush forever without progress.
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record. Returns the full batch once `capacity` is reached;
    /// the caller takes ownership and the accumulator starts a new buffer.
    pub fn push(&mut self, record: NormalizedRecord) -> Option<Vec<NormalizedRecord>> {
        self.buf.push(record);
        if self.buf.len() >= self.capacity {
            Some(std::mem::replace(
                &mut self.buf,
                Vec::with_capacity(self.capacity),
            ))
        } else {
            None
        }
    }

    /// Hand off whatever remains when the source is exhausted. Returns
    /// `None` for an empty buffer so no empty write call is ever issued.
    pub fn finish(self) -> Option<Vec<NormalizedRecord>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
