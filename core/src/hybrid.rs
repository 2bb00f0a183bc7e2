use crate::chunking::ChunkingConfig;
use crate::config;
use crate::embedding::Encoder;
use crate::fusion::{rrf_fusion, weighted_fusion, FusedHit, ZeroPolicy};
use crate::index::{Bm25Params, InvertedIndex};
use crate::persist::{load_chunks, load_index, save_cache, CachePaths};
use crate::rerank::{apply_rerank, Reranker};
use crate::semantic::ChunkRanker;
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document, Error, Result};
use serde::Serialize;

/// A fused hit with its document attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridResult {
    pub document: Document,
    #[serde(flatten)]
    pub hit: FusedHit,
}

/// Keyword index and chunk ranker over the same document set.
pub struct HybridSearch<E> {
    index: InvertedIndex,
    ranker: ChunkRanker<E>,
    params: Bm25Params,
}

impl<E: Encoder> HybridSearch<E> {
    pub fn new(index: InvertedIndex, ranker: ChunkRanker<E>) -> Result<Self> {
        let chunked = ranker.store().num_documents();
        if chunked != index.num_documents() {
            return Err(Error::invalid(format!(
                "chunk vectors cover {chunked} documents but the index holds {}",
                index.num_documents()
            )));
        }
        Ok(Self { index, ranker, params: Bm25Params::default() })
    }

    /// Build both sides from scratch. Nothing is written to disk.
    pub fn build(documents: Vec<Document>, tokenizer: Tokenizer, encoder: E, cfg: ChunkingConfig) -> Result<Self> {
        let index = InvertedIndex::build(tokenizer, documents.iter().cloned())?;
        let ranker = ChunkRanker::build(encoder, &documents, cfg)?;
        Self::new(index, ranker)
    }

    /// Restore from a cache directory, or `CacheMissing` if it is absent or stale.
    pub fn load(paths: &CachePaths, tokenizer: Tokenizer, encoder: E) -> Result<Self> {
        let index = load_index(paths, tokenizer)?;
        let store = load_chunks(paths, index.num_documents())?;
        Self::new(index, ChunkRanker::from_store(encoder, store)?)
    }

    pub fn save(&self, paths: &CachePaths, created_at: &str) -> Result<()> {
        save_cache(paths, &self.index, self.ranker.store(), created_at)
    }

    pub fn with_bm25_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn ranker(&self) -> &ChunkRanker<E> {
        &self.ranker
    }

    pub fn bm25_search(&self, query: &str, limit: usize) -> Result<Vec<(DocId, f64)>> {
        self.index.bm25_search(query, limit, self.params)
    }

    pub fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<(DocId, f64)>> {
        Ok(self.ranker.search(query, limit)?.into_iter().map(|(id, s)| (id, s as f64)).collect())
    }

    /// Min-max weighted fusion; `alpha` weights the semantic side.
    pub fn weighted_search(&self, query: &str, alpha: f64, policy: ZeroPolicy, limit: usize) -> Result<Vec<HybridResult>> {
        let (lexical, semantic) = self.candidates(query, limit)?;
        let fused = weighted_fusion(&lexical, &semantic, alpha, policy, limit)?;
        self.attach(fused)
    }

    pub fn rrf_search(&self, query: &str, k: f64, limit: usize) -> Result<Vec<HybridResult>> {
        let (lexical, semantic) = self.candidates(query, limit)?;
        let fused = rrf_fusion(&lexical, &semantic, k, limit)?;
        self.attach(fused)
    }

    /// RRF over a wider short-list, reordered by `reranker`, then cut to `limit`.
    pub fn rrf_search_reranked<R: Reranker>(&self, query: &str, k: f64, limit: usize, reranker: &R) -> Result<Vec<HybridResult>> {
        let shortlist = self.rrf_search(query, k, limit.saturating_mul(config::RERANK_MULTIPLIER))?;
        let docs: Vec<&Document> = shortlist.iter().map(|r| &r.document).collect();
        let outcome = reranker.rerank(query, &docs)?;
        let mut reranked = apply_rerank(shortlist, outcome)?;
        reranked.truncate(limit);
        Ok(reranked)
    }

    /// Both source rankings, each far deeper than `limit` so documents that
    /// rank low on one side can still fuse.
    fn candidates(&self, query: &str, limit: usize) -> Result<(Vec<(DocId, f64)>, Vec<(DocId, f64)>)> {
        let depth = limit.saturating_mul(config::CANDIDATE_MULTIPLIER);
        let lexical = self.bm25_search(query, depth)?;
        let semantic = self.semantic_search(query, depth)?;
        tracing::debug!(query, lexical = lexical.len(), semantic = semantic.len(), "fusion candidates");
        Ok((lexical, semantic))
    }

    fn attach(&self, hits: Vec<FusedHit>) -> Result<Vec<HybridResult>> {
        hits.into_iter()
            .map(|hit| {
                let document = self.index.document(hit.doc_id).cloned().ok_or(Error::NotFound(hit.doc_id))?;
                Ok(HybridResult { document, hit })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::rerank::{KeywordReranker, RerankOutcome};
    use std::collections::HashMap;

    /// Looks vectors up by exact text; unknown text maps to the zero vector.
    struct TableEncoder(HashMap<&'static str, Embedding>);

    impl Encoder for TableEncoder {
        fn encode(&self, text: &str) -> Result<Embedding> {
            Ok(self.0.get(text).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "table"
        }
    }

    struct Reverse;

    impl Reranker for Reverse {
        fn rerank(&self, _query: &str, documents: &[&Document]) -> Result<RerankOutcome> {
            Ok(RerankOutcome::Order((0..documents.len()).rev().collect()))
        }
    }

    fn engine() -> HybridSearch<TableEncoder> {
        let docs = vec![
            // strong keyword match, no description so no chunks
            Document::new(1, "Ocean Ocean Ocean", ""),
            // second on both sides
            Document::new(2, "Two", "Ocean voyage."),
            // best semantic match, no keyword overlap
            Document::new(3, "Three", "Quiet garden."),
        ];
        let encoder = TableEncoder(HashMap::from([
            ("ocean", vec![1.0, 0.0]),
            ("Quiet garden.", vec![1.0, 0.0]),
            ("Ocean voyage.", vec![1.0, 0.1]),
        ]));
        let index = InvertedIndex::build(Tokenizer::default(), docs.clone()).unwrap();
        let ranker = ChunkRanker::build(encoder, &docs, ChunkingConfig::default()).unwrap();
        HybridSearch::new(index, ranker).unwrap()
    }

    #[test]
    fn sources_disagree() {
        let e = engine();
        let lexical: Vec<DocId> = e.bm25_search("ocean", 10).unwrap().into_iter().map(|h| h.0).collect();
        let semantic: Vec<DocId> = e.semantic_search("ocean", 10).unwrap().into_iter().map(|h| h.0).collect();
        assert_eq!(lexical, vec![1, 2]);
        assert_eq!(semantic, vec![3, 2]);
    }

    #[test]
    fn rrf_fuses_beyond_the_final_limit() {
        let e = engine();
        let top = e.rrf_search("ocean", 60.0, 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].document.id, 2);
        assert_eq!(top[0].hit.lexical.unwrap().rank, 2);
        assert_eq!(top[0].hit.semantic.unwrap().rank, 2);
    }

    #[test]
    fn weighted_search_attaches_documents() {
        let e = engine();
        let all = e.weighted_search("ocean", 1.0, ZeroPolicy::Sum, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].document.title, "Three");
        let lexical_only = e.weighted_search("ocean", 0.0, ZeroPolicy::Sum, 10).unwrap();
        assert_eq!(lexical_only[0].document.id, 1);
        assert!(e.weighted_search("ocean", 2.0, ZeroPolicy::Sum, 10).is_err());
    }

    #[test]
    fn reranker_reorders_shortlist() {
        let e = engine();
        let fused: Vec<DocId> = e.rrf_search("ocean", 60.0, 15).unwrap().iter().map(|r| r.document.id).collect();
        let reranked: Vec<DocId> = e
            .rrf_search_reranked("ocean", 60.0, 3, &Reverse)
            .unwrap()
            .iter()
            .map(|r| r.document.id)
            .collect();
        let mut reversed = fused.clone();
        reversed.reverse();
        assert_eq!(reranked, reversed);
    }

    #[test]
    fn mismatched_document_sets_are_rejected() {
        let docs = vec![Document::new(1, "A", "b.")];
        let index = InvertedIndex::build(Tokenizer::default(), docs).unwrap();
        let ranker = ChunkRanker::build(TableEncoder(HashMap::new()), &[], ChunkingConfig::default()).unwrap();
        assert!(HybridSearch::new(index, ranker).is_err());
    }

    #[test]
    fn duplicate_ids_fail_the_build() {
        let docs = vec![Document::new(1, "A", "Ocean voyage."), Document::new(1, "B", "Quiet garden.")];
        let res = HybridSearch::build(docs, Tokenizer::default(), TableEncoder(HashMap::new()), ChunkingConfig::default());
        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn keyword_reranker_through_the_engine() {
        let e = engine();
        let reranked = e
            .rrf_search_reranked("ocean", 60.0, 3, &KeywordReranker::default())
            .unwrap();
        // doc 3 has no keyword overlap and sinks to the end
        assert_eq!(reranked.last().unwrap().document.id, 3);
        assert_eq!(reranked[0].document.id, 1);
    }

    #[test]
    fn empty_query_fails_before_results() {
        let e = engine();
        assert!(matches!(e.rrf_search("", 60.0, 5), Err(Error::InvalidArgument(_))));
    }
}
