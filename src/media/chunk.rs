use bytes::Bytes;

/// One encoded media segment as it travels through the pipeline
///
/// Ordering is implicit: chunks are delivered and applied in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    /// Encoded segment bytes
    pub data: Bytes,
    /// Position in the producer's emission order (0-indexed)
    pub sequence: u64,
    /// Container initialization unit; exactly one per recording session
    pub is_header: bool,
}

impl MediaChunk {
    pub fn new(data: impl Into<Bytes>, sequence: u64, is_header: bool) -> Self {
        Self {
            data: data.into(),
            sequence,
            is_header,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Chunk delivered to viewers of a live stream
///
/// `complete_chunk` is a replay viewers bootstrap from: the header followed
/// by the most recent segments. It is empty on ordinary live chunks and
/// `current_chunk` is empty on the replay sent when a viewer joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveChunk {
    pub current_chunk: Bytes,
    pub complete_chunk: Bytes,
}
