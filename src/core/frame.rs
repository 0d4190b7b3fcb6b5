use num_complex::Complex32;

/// Basic stream unit passed between processing nodes.
///
/// Holds `item_count()` items of `vector_len` complex values each,
/// stored contiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    /// Timestamp in microseconds since epoch
    pub timestamp: u64,

    /// Sequential frame number for ordering
    pub sequence_id: u64,

    /// Complex values per item
    pub vector_len: usize,

    pub samples: Vec<Complex32>,
}

impl SampleFrame {
    pub fn new(
        timestamp: u64,
        sequence_id: u64,
        vector_len: usize,
        samples: Vec<Complex32>,
    ) -> Self {
        Self {
            timestamp,
            sequence_id,
            vector_len: vector_len.max(1),
            samples,
        }
    }

    /// Frame of single-sample items.
    pub fn scalar(timestamp: u64, sequence_id: u64, samples: Vec<Complex32>) -> Self {
        Self::new(timestamp, sequence_id, 1, samples)
    }

    pub fn item_count(&self) -> usize {
        self.samples.len() / self.vector_len
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Iterate whole items; a trailing partial item is ignored.
    pub fn items(&self) -> std::slice::ChunksExact<'_, Complex32> {
        self.samples.chunks_exact(self.vector_len)
    }
}
