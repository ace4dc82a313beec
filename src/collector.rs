//! Append-only buffer of raw body chunks

use bytes::{Bytes, BytesMut};

/// Ordered, append-only sequence of byte chunks.
///
/// Chunks are stored exactly as produced by the tapped stream: no merging,
/// no re-encoding, no eager concatenation. The boundaries observed here are
/// the boundaries the transport actually wrote or received.
#[derive(Debug, Default)]
pub struct ByteCollector {
    chunks: Vec<Bytes>,
    total: usize,
}

impl ByteCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk, preserving its boundary
    pub fn push(&mut self, chunk: Bytes) {
        self.total += chunk.len();
        self.chunks.push(chunk);
    }

    /// The collected chunks, in arrival order
    #[must_use]
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Concatenate all chunks into a single buffer
    #[must_use]
    pub fn concat(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total);
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }

    /// Total number of bytes collected
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.total
    }

    /// Number of chunks collected
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no bytes have been collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Consume the collector, yielding the chunk sequence
    #[must_use]
    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }
}
