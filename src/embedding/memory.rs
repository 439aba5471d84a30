//! Deterministic in-memory embedder for unit and end-to-end tests.
//!
//! Hashes whitespace-separated tokens into a fixed-size bucket vector, then
//! L2-normalizes it. Texts sharing more tokens end up with higher cosine
//! similarity (lower vector distance), which is enough to exercise ranking
//! and target-pairing logic without a real model.

use super::{l2_normalize, Embedder};
use crate::error::Result;

const DEFAULT_DIM: usize = 32;

pub struct DeterministicEmbedder {
    dim: usize,
}

impl DeterministicEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self { dim: DEFAULT_DIM }
    }

    #[must_use]
    pub fn with_dimension(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash as usize) % self.dim
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dim];
        for token in text.to_lowercase().split_whitespace() {
            vector[self.bucket(token)] += 1.0;
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn probe_dimension(&self) -> Result<usize> {
        Ok(self.dim)
    }
}
