//! Default tuning parameters and cache file names.
//!
//! These are compile-time defaults; binaries expose most of them as CLI flags.

/// BM25 term frequency saturation. Typical range 1.2–2.0.
pub const BM25_K1: f64 = 1.5;

/// BM25 document length normalization. 0.0 disables it, 1.0 is full normalization.
pub const BM25_B: f64 = 0.75;

/// Reciprocal Rank Fusion smoothing constant `k` in `1 / (k + rank)`.
pub const RRF_K: f64 = 60.0;

/// Weight on the semantic side of weighted fusion.
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Each source is asked for `limit * CANDIDATE_MULTIPLIER` hits before fusing.
pub const CANDIDATE_MULTIPLIER: usize = 500;

/// Reranking sees `limit * RERANK_MULTIPLIER` fused results.
pub const RERANK_MULTIPLIER: usize = 5;

/// Sentences per chunk and sentences shared by consecutive chunks.
pub const MAX_SEMANTIC_CHUNK_SIZE: usize = 4;
pub const SEMANTIC_CHUNK_OVERLAP: usize = 1;

/// Words per chunk for fixed-size chunking.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Output width of the hashing encoder.
pub const HASHING_DIMENSION: usize = 384;

/// Top-level field holding the document array in the source JSON.
pub const DEFAULT_DOCUMENT_FIELD: &str = "movies";

pub const INDEX_FILE: &str = "index.bin";
pub const DOCMAP_FILE: &str = "docmap.bin";
pub const TERM_FREQ_FILE: &str = "term_frequencies.bin";
pub const DOC_LENGTHS_FILE: &str = "doc_lengths.bin";
pub const CHUNK_EMBEDDINGS_FILE: &str = "chunk_embeddings.bin";
pub const CHUNK_METADATA_FILE: &str = "chunk_metadata.json";
pub const META_FILE: &str = "meta.json";

pub const CACHE_VERSION: u32 = 1;
