//! The current recognition batch, replaced whole on each accepted response.

use crate::types::RecognitionRecord;
use std::sync::Arc;

/// A complete set of records from one recognition round trip.
#[derive(Debug, Clone)]
pub struct RecognitionBatch {
    /// Sequence number of the request that produced this batch. 0 = nothing received yet.
    pub sequence: u64,
    pub records: Arc<[RecognitionRecord]>,
}

impl Default for RecognitionBatch {
    fn default() -> Self {
        Self {
            sequence: 0,
            records: Vec::new().into(),
        }
    }
}

/// Outcome of offering a response to the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Response belongs to a request older than (or equal to) the applied one.
    Stale { applied: u64 },
    /// Request failed; the stored batch was kept.
    Retained,
}

/// Single-writer cell holding the latest recognition batch.
///
/// Readers take an `Arc` snapshot; the writer swaps the whole value and never
/// mutates a published batch.
#[derive(Debug, Default)]
pub struct BatchCell {
    current: Arc<RecognitionBatch>,
    issued: u64,
}

impl BatchCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the sequence number for a new outbound request.
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Snapshot of the batch currently in effect.
    pub fn current(&self) -> Arc<RecognitionBatch> {
        Arc::clone(&self.current)
    }

    /// Replace the batch if `sequence` is newer than the applied one.
    pub fn apply(&mut self, sequence: u64, records: Vec<RecognitionRecord>) -> ApplyOutcome {
        if sequence <= self.current.sequence {
            return ApplyOutcome::Stale {
                applied: self.current.sequence,
            };
        }
        self.current = Arc::new(RecognitionBatch {
            sequence,
            records: records.into(),
        });
        ApplyOutcome::Applied
    }
}
