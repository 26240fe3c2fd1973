//! Engine configuration.
//!
//! Thresholds that govern chunk combination are explicit values passed into
//! entry points, never ambient process state, so callers and tests can vary
//! them per call.

/// Tuning knobs for block transformations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Minimum number of fragments in a column before
    /// [`coalesce_if_fragmented`](crate::combine::coalesce_if_fragmented)
    /// combines it. Positional selection cost scales with fragment count, so
    /// heavily fragmented columns are combined before `take`-style
    /// operations.
    pub combine_chunk_threshold: usize,

    /// Maximum byte size of a single fragment produced when combining a
    /// column whose type addresses its payload through 32-bit offsets.
    /// Combining past this ceiling would silently overflow the offsets.
    pub offset_overflow_ceiling: usize,
}

impl TransformOptions {
    /// Default fragment-count trigger for threshold-based coalescing.
    pub const DEFAULT_COMBINE_CHUNK_THRESHOLD: usize = 10;

    /// Replace the coalescing threshold.
    pub fn with_combine_chunk_threshold(mut self, threshold: usize) -> Self {
        self.combine_chunk_threshold = threshold;
        self
    }

    /// Replace the offset-overflow ceiling.
    pub fn with_offset_overflow_ceiling(mut self, ceiling: usize) -> Self {
        self.offset_overflow_ceiling = ceiling;
        self
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            combine_chunk_threshold: Self::DEFAULT_COMBINE_CHUNK_THRESHOLD,
            offset_overflow_ceiling: i32::MAX as usize,
        }
    }
}
