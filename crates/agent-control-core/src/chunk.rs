//! Chunk codec for moving large payloads over a text channel.
//!
//! A payload is split into ordered, size-bounded slices, each base64
//! encoded so it survives a text-oriented transport. The receiving side
//! feeds slices to a [`ChunkAssembler`] in order and gets the payload back
//! once the last one arrives.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

/// Default raw-payload bytes per chunk, before base64 expansion.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One encoded slice of a larger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub total: usize,
    pub data: String,
}

/// Split a payload into ordered, text-safe chunks.
///
/// Produces `ceil(payload.len() / chunk_size)` chunks; the last one may be
/// shorter. An empty payload yields no chunks.
///
/// # Panics
/// Panics if `chunk_size` is zero.
#[must_use]
pub fn split(payload: &[u8], chunk_size: usize) -> Vec<Chunk> {
    assert!(chunk_size > 0, "chunk_size must be non-zero");
    let total = payload.len().div_ceil(chunk_size);
    payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index,
            total,
            data: BASE64.encode(slice),
        })
        .collect()
}

/// Chunk stream violation detected during reassembly.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("expected chunk {expected}, got {got}")]
    OutOfOrder { expected: usize, got: usize },
    #[error("chunk reports {got} total chunks, expected {expected}")]
    TotalMismatch { expected: usize, got: usize },
    #[error("chunk {index} received after the payload completed")]
    TrailingChunk { index: usize },
    #[error("chunk data is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Reassembles a chunked payload on the receiving side.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    expected_total: Option<usize>,
    next_index: usize,
    buf: Vec<u8>,
}

impl ChunkAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk, strictly in order.
    ///
    /// Returns the full payload once the final chunk has been absorbed.
    ///
    /// # Errors
    /// Rejects out-of-order chunks, inconsistent totals, chunks past the
    /// end of a completed payload, and invalid base64.
    pub fn push(&mut self, chunk: &Chunk) -> Result<Option<Vec<u8>>, ChunkError> {
        let total = *self.expected_total.get_or_insert(chunk.total);
        if chunk.total != total {
            return Err(ChunkError::TotalMismatch {
                expected: total,
                got: chunk.total,
            });
        }
        if self.next_index >= total {
            return Err(ChunkError::TrailingChunk { index: chunk.index });
        }
        if chunk.index != self.next_index {
            return Err(ChunkError::OutOfOrder {
                expected: self.next_index,
                got: chunk.index,
            });
        }
        self.buf.extend_from_slice(&BASE64.decode(&chunk.data)?);
        self.next_index += 1;
        if self.next_index == total {
            Ok(Some(std::mem::take(&mut self.buf)))
        } else {
            Ok(None)
        }
    }
}

/// Reassemble a complete, in-order chunk sequence.
///
/// # Errors
/// As [`ChunkAssembler::push`].
pub fn assemble(chunks: &[Chunk]) -> Result<Vec<u8>, ChunkError> {
    let mut assembler = ChunkAssembler::new();
    let mut payload = Vec::new();
    for chunk in chunks {
        if let Some(done) = assembler.push(chunk)? {
            payload = done;
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 16;

    fn round_trip(len: usize) {
        let payload: Vec<u8> = (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect();
        let chunks = split(&payload, CHUNK);
        assert_eq!(chunks.len(), len.div_ceil(CHUNK));
        assert!(chunks.iter().all(|c| c.total == chunks.len()));
        assert_eq!(assemble(&chunks).unwrap(), payload);
    }

    #[test]
    fn round_trips_boundary_sizes() {
        round_trip(0);
        round_trip(1);
        round_trip(CHUNK);
        round_trip(CHUNK + 1);
        round_trip(10 * CHUNK + 7);
    }

    #[test]
    fn last_chunk_may_be_short() {
        let chunks = split(&[0u8; CHUNK + 3], CHUNK);
        assert_eq!(chunks.len(), 2);
        assert_eq!(BASE64.decode(&chunks[1].data).unwrap().len(), 3);
    }

    #[test]
    fn out_of_order_is_rejected() {
        let chunks = split(&[0u8; 3 * CHUNK], CHUNK);
        let mut assembler = ChunkAssembler::new();
        assembler.push(&chunks[0]).unwrap();
        let err = assembler.push(&chunks[2]).unwrap_err();
        assert!(matches!(
            err,
            ChunkError::OutOfOrder {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn total_mismatch_is_rejected() {
        let chunks = split(&[0u8; 2 * CHUNK], CHUNK);
        let mut assembler = ChunkAssembler::new();
        assembler.push(&chunks[0]).unwrap();
        let rogue = Chunk {
            index: 1,
            total: 9,
            data: String::new(),
        };
        assert!(matches!(
            assembler.push(&rogue).unwrap_err(),
            ChunkError::TotalMismatch { expected: 2, got: 9 }
        ));
    }

    #[test]
    fn trailing_chunk_is_rejected() {
        let chunks = split(&[0u8; CHUNK], CHUNK);
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push(&chunks[0]).unwrap().is_some());
        assert!(matches!(
            assembler.push(&chunks[0]).unwrap_err(),
            ChunkError::TrailingChunk { index: 0 }
        ));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let rogue = Chunk {
            index: 0,
            total: 1,
            data: "!!!".to_owned(),
        };
        let mut assembler = ChunkAssembler::new();
        assert!(matches!(
            assembler.push(&rogue).unwrap_err(),
            ChunkError::Decode(_)
        ));
    }
}
