//! Text-to-vector encoding boundary.
//!
//! Real embedding models live outside this crate; anything that implements
//! [`Encoder`] can be injected into a [`ChunkRanker`](crate::ChunkRanker).
//! [`HashingEncoder`] is a deterministic bag-of-tokens fallback used by the
//! binaries and tests.

use crate::config;
use crate::tokenizer::Tokenizer;
use crate::{Error, Result};

/// A vector embedding
pub type Embedding = Vec<f32>;

pub trait Encoder: Send + Sync {
    /// Encode one text into a vector of length [`dimension`](Self::dimension).
    fn encode(&self, text: &str) -> Result<Embedding>;

    /// Encode several texts. Output order matches input order.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(FNV_PRIME))
}

/// Signed feature hashing of stemmed tokens, L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
    tokenizer: Tokenizer,
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self::new(config::HASHING_DIMENSION, Tokenizer::default())
    }
}

impl HashingEncoder {
    pub fn new(dimension: usize, tokenizer: Tokenizer) -> Self {
        Self { dimension: dimension.max(1), tokenizer }
    }
}

impl Encoder for HashingEncoder {
    fn encode(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::invalid("cannot encode empty text"));
        }
        let mut v = vec![0.0f32; self.dimension];
        for token in self.tokenizer.process(text) {
            let h = fnv1a(token.as_bytes());
            let slot = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "fnv1a-hashing"
    }
}
