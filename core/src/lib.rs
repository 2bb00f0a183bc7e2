//! Hybrid retrieval: BM25 over an inverted index, max-pooled chunk similarity,
//! and rank/score fusion of the two.
//!
//! ```text
//! documents -> Tokenizer -> IndexBuilder -> InvertedIndex --bm25_search--+
//!                                                                        |
//! documents -> chunking -> Encoder -> ChunkRanker --------search--------+--> fusion -> Reranker
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod fusion;
pub mod hybrid;
pub mod index;
pub mod persist;
pub mod rerank;
pub mod semantic;
pub mod tokenizer;

pub type DocId = u32;

pub use chunking::{ChunkMetadata, ChunkingConfig};
pub use document::Document;
pub use embedding::{Encoder, HashingEncoder};
pub use error::{Error, Result};
pub use fusion::{FusedHit, ZeroPolicy};
pub use hybrid::{HybridResult, HybridSearch};
pub use index::{Bm25Params, IndexBuilder, InvertedIndex};
pub use rerank::{KeywordReranker, Reranker};
pub use semantic::{ChunkRanker, ChunkStore};
pub use tokenizer::Tokenizer;
