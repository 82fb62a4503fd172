//! Fixed-size slices of a state diff, addressed by content hash.
//!
//! Chunks are hashed with blake2b-256 rather than the blake3 used
//! elsewhere in the core — the wire protocol pins this algorithm
//! specifically for diff chunks, independent of the transaction-id
//! hash choice.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::hash::{Hash, HASH_SIZE};

type Blake2b256 = Blake2b<U32>;

/// A single slice of a sync diff, never larger than `Config::chunk_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    hash: Hash,
    payload: Vec<u8>,
}

impl Chunk {
    /// Build a chunk from its payload, computing the blake2b-256 hash.
    pub fn new(payload: Vec<u8>) -> Self {
        let hash = chunk_hash(&payload);
        Self { hash, payload }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// blake2b-256 of `payload`, used both to address a chunk and to
/// verify one received from a peer.
pub fn chunk_hash(payload: &[u8]) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(payload);
    let digest = hasher.finalize();
    let bytes: [u8; HASH_SIZE] = digest.into();
    Hash::new(bytes)
}

/// Split `data` into chunks no larger than `chunk_size` bytes, in order.
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Chunk> {
    if data.is_empty() {
        return Vec::new();
    }
    data.chunks(chunk_size)
        .map(|slice| Chunk::new(slice.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn chunk_hash_is_blake2b256_of_its_payload(payload: Vec<u8>) {
            let chunk = Chunk::new(payload.clone());
            prop_assert_eq!(*chunk.hash(), chunk_hash(&payload));
        }

        #[test]
        fn split_into_chunks_never_exceeds_chunk_size(data: Vec<u8>, chunk_size in 1usize..4096) {
            let chunks = split_into_chunks(&data, chunk_size);
            for chunk in &chunks {
                prop_assert!(chunk.payload().len() <= chunk_size);
            }
            let reassembled: Vec<u8> = chunks.iter().flat_map(|c| c.payload().to_vec()).collect();
            prop_assert_eq!(reassembled, data);
        }
    }

    #[test]
    fn chunk_hash_matches_payload() {
        let chunk = Chunk::new(b"some diff bytes".to_vec());
        assert_eq!(chunk_hash(chunk.payload()), *chunk.hash());
    }

    #[test]
    fn split_respects_chunk_size() {
        let data = vec![7u8; 2_500_000];
        let chunks = split_into_chunks(&data, 1_048_576);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].payload().len(), 1_048_576);
        assert_eq!(chunks[2].payload().len(), 2_500_000 - 2 * 1_048_576);
        for c in &chunks {
            assert_eq!(chunk_hash(c.payload()), *c.hash());
        }
    }

    #[test]
    fn split_empty_data_yields_no_chunks() {
        assert!(split_into_chunks(&[], 1_048_576).is_empty());
    }
}
