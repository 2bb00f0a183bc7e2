//! Contract for an external reranker (typically an LLM) that reorders a
//! fused short-list.

use crate::index::{Bm25Params, InvertedIndex};
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document, Error, Result};
use std::collections::{HashMap, HashSet};

/// What a reranker hands back for a short-list of `n` documents.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    /// One relevance score in [0, 10] per short-list position.
    Scores(Vec<f64>),
    /// Short-list positions, most relevant first.
    Order(Vec<usize>),
}

pub trait Reranker {
    fn rerank(&self, query: &str, documents: &[&Document]) -> Result<RerankOutcome>;
}

/// Scores a short-list by BM25 computed over the short-list alone, scaled
/// so the best match gets 10.
#[derive(Debug, Clone, Default)]
pub struct KeywordReranker {
    tokenizer: Tokenizer,
    params: Bm25Params,
}

impl KeywordReranker {
    pub fn new(tokenizer: Tokenizer, params: Bm25Params) -> Self {
        Self { tokenizer, params }
    }
}

impl Reranker for KeywordReranker {
    fn rerank(&self, query: &str, documents: &[&Document]) -> Result<RerankOutcome> {
        if documents.is_empty() {
            return Ok(RerankOutcome::Scores(Vec::new()));
        }
        let index = InvertedIndex::build(self.tokenizer.clone(), documents.iter().map(|d| (*d).clone()))?;
        let scores: HashMap<DocId, f64> = index.bm25_search(query, documents.len(), self.params)?.into_iter().collect();
        let best = scores.values().copied().fold(0.0, f64::max);
        Ok(RerankOutcome::Scores(
            documents
                .iter()
                .map(|d| match scores.get(&d.id) {
                    Some(s) if best > 0.0 => 10.0 * s / best,
                    _ => 0.0,
                })
                .collect(),
        ))
    }
}

/// Reorder `results` according to `outcome`. Works for either outcome shape.
///
/// Scores sort descending and keep the fused order on ties; an order puts
/// the listed positions first and leaves the rest in fused order.
pub fn apply_rerank<T>(results: Vec<T>, outcome: RerankOutcome) -> Result<Vec<T>> {
    let n = results.len();
    let order: Vec<usize> = match outcome {
        RerankOutcome::Scores(scores) => {
            if scores.len() != n {
                return Err(Error::invalid(format!("reranker returned {} scores for {n} documents", scores.len())));
            }
            let scores: Vec<f64> = scores.into_iter().map(clamp_score).collect();
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
            order
        }
        RerankOutcome::Order(listed) => {
            let mut seen = HashSet::with_capacity(n);
            for &pos in &listed {
                if pos >= n || !seen.insert(pos) {
                    return Err(Error::invalid(format!("reranker returned invalid position {pos}")));
                }
            }
            listed.into_iter().chain((0..n).filter(|p| !seen.contains(p))).collect()
        }
    };
    let mut slots: Vec<Option<T>> = results.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|p| slots[p].take()).collect())
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        tracing::warn!("reranker returned a non-numeric score, treating as 0");
        return 0.0;
    }
    if !(0.0..=10.0).contains(&score) {
        tracing::warn!(score, "reranker score outside [0, 10], clamping");
    }
    score.clamp(0.0, 10.0)
}
