use crate::chunking::{chunk_document, ChunkMetadata, ChunkingConfig};
use crate::embedding::{Embedding, Encoder};
use crate::index::sort_ranked;
use crate::{DocId, Document, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Chunk vectors in build order with their parallel metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStore {
    vectors: Vec<Embedding>,
    metadata: Vec<ChunkMetadata>,
    dimension: usize,
    /// Size of the document set the store was built from.
    num_documents: usize,
}

impl ChunkStore {
    pub fn new(vectors: Vec<Embedding>, metadata: Vec<ChunkMetadata>, dimension: usize, num_documents: usize) -> Result<Self> {
        if vectors.len() != metadata.len() {
            return Err(Error::DimensionMismatch { expected: metadata.len(), actual: vectors.len() });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(Error::DimensionMismatch { expected: dimension, actual: bad.len() });
        }
        Ok(Self { vectors, metadata, dimension, num_documents })
    }

    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    pub fn metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scores documents by their best-matching chunk.
pub struct ChunkRanker<E> {
    encoder: E,
    store: ChunkStore,
}

impl<E: Encoder> ChunkRanker<E> {
    /// Chunk every non-empty description and encode all chunks in one batch.
    pub fn build(encoder: E, documents: &[Document], cfg: ChunkingConfig) -> Result<Self> {
        let mut seen = HashSet::with_capacity(documents.len());
        if let Some(dup) = documents.iter().find(|d| !seen.insert(d.id)) {
            return Err(Error::invalid(format!("duplicate document id {}", dup.id)));
        }
        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for doc in documents.iter().filter(|d| !d.description.trim().is_empty()) {
            for chunk in chunk_document(doc, cfg)? {
                texts.push(chunk.text);
                metadata.push(chunk.metadata);
            }
        }
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            encoder.encode_batch(&refs)?
        };
        let store = ChunkStore::new(vectors, metadata, encoder.dimension(), documents.len())?;
        tracing::info!(
            num_docs = documents.len(),
            num_chunks = store.len(),
            model = encoder.model_name(),
            "chunk vectors built"
        );
        Ok(Self { encoder, store })
    }

    pub fn from_store(encoder: E, store: ChunkStore) -> Result<Self> {
        if store.dimension() != encoder.dimension() {
            return Err(Error::DimensionMismatch { expected: store.dimension(), actual: encoder.dimension() });
        }
        Ok(Self { encoder, store })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Encode `query` and rank documents against it.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(DocId, f32)>> {
        self.ensure_ready()?;
        if query.trim().is_empty() {
            return Err(Error::invalid("query text is empty"));
        }
        let vector = self.encoder.encode(query)?;
        self.search_vector(&vector, limit)
    }

    /// Rank documents by max cosine similarity over their chunks.
    pub fn search_vector(&self, query: &[f32], limit: usize) -> Result<Vec<(DocId, f32)>> {
        self.ensure_ready()?;
        if query.len() != self.store.dimension {
            return Err(Error::DimensionMismatch { expected: self.store.dimension, actual: query.len() });
        }
        let mut best: HashMap<DocId, f32> = HashMap::new();
        for (vector, meta) in self.store.vectors.iter().zip(&self.store.metadata) {
            let sim = cosine_similarity(query, vector);
            best.entry(meta.document_id)
                .and_modify(|s| *s = s.max(sim))
                .or_insert(sim);
        }
        let mut ranked: Vec<(DocId, f32)> = best.into_iter().collect();
        sort_ranked(&mut ranked);
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.store.num_documents == 0 {
            return Err(Error::invalid("chunk ranker has no documents"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts a fixed vocabulary: [princess, car, robot].
    struct VocabEncoder;

    impl Encoder for VocabEncoder {
        fn encode(&self, text: &str) -> Result<Embedding> {
            let lower = text.to_lowercase();
            Ok(["princess", "car", "robot"].iter().map(|w| lower.matches(w).count() as f32).collect())
        }
        fn dimension(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "vocab"
        }
    }

    struct BrokenEncoder;

    impl Encoder for BrokenEncoder {
        fn encode(&self, _text: &str) -> Result<Embedding> {
            Err(Error::Encoder("model unavailable".into()))
        }
        fn dimension(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            // one strong chunk, one unrelated chunk
            Document::new(1, "A", "A princess rules. Weather is mild. Rain falls. Bread rises. Nothing happens."),
            // every chunk mixes princess and car
            Document::new(2, "B", "A princess drives a car. Another car and a princess."),
            Document::new(3, "C", ""),
            Document::new(4, "D", "A robot. A car."),
        ]
    }

    fn ranker() -> ChunkRanker<VocabEncoder> {
        ChunkRanker::build(VocabEncoder, &docs(), ChunkingConfig { max_chunk_size: 1, overlap: 0 }).unwrap()
    }

    #[test]
    fn cosine_edge_cases() {
        let v = [0.3f32, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn builds_chunks_with_metadata() {
        let r = ranker();
        let meta = r.store().metadata();
        assert_eq!(meta.iter().filter(|m| m.document_id == 1).count(), 5);
        assert!(meta.iter().all(|m| m.document_id != 3));
        assert_eq!(r.store().num_documents(), 4);
        assert_eq!(r.store().len(), r.store().vectors().len());
    }

    #[test]
    fn max_pooling_surfaces_single_strong_chunk() {
        let r = ranker();
        let hits = r.search_vector(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 2);
        // document 3 has no chunks
        assert!(hits.iter().all(|h| h.0 != 3));
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let r = ranker();
        // orthogonal to everything: all documents score 0
        let hits = r.search_vector(&[0.0, 0.0, 0.0], 10).unwrap();
        let ids: Vec<DocId> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn text_search_uses_encoder_and_truncates() {
        let r = ranker();
        let hits = r.search("robot", 1).unwrap();
        assert_eq!(hits, vec![(4, 1.0)]);
        assert!(matches!(r.search(" ", 1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_wrong_query_dimension() {
        let r = ranker();
        assert!(matches!(
            r.search_vector(&[1.0, 0.0], 5),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn encoder_failure_fails_build() {
        let res = ChunkRanker::build(BrokenEncoder, &docs(), ChunkingConfig::default());
        assert!(matches!(res, Err(Error::Encoder(_))));
    }

    #[test]
    fn duplicate_ids_fail_before_encoding() {
        let docs = vec![Document::new(1, "A", "First."), Document::new(1, "B", "Second.")];
        let res = ChunkRanker::build(BrokenEncoder, &docs, ChunkingConfig::default());
        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn empty_document_set_is_not_ready() {
        let r = ChunkRanker::build(VocabEncoder, &[], ChunkingConfig::default()).unwrap();
        assert!(matches!(r.search_vector(&[1.0, 0.0, 0.0], 5), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn store_validation() {
        let meta = ChunkMetadata { document_id: 1, chunk_index: 0, total_chunks: 1 };
        assert!(ChunkStore::new(vec![vec![1.0, 2.0]], vec![meta], 3, 1).is_err());
        assert!(ChunkStore::new(vec![], vec![meta], 3, 1).is_err());
        let store = ChunkStore::new(vec![vec![1.0, 2.0]], vec![meta], 2, 1).unwrap();
        assert!(matches!(ChunkRanker::from_store(VocabEncoder, store), Err(Error::DimensionMismatch { .. })));
    }
}
