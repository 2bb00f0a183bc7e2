//! Fusion of a lexical and a semantic ranking into one list.
//!
//! Two strategies:
//! - **Weighted**: min-max normalize each list's scores, then
//!   `alpha * semantic + (1 - alpha) * lexical`.
//! - **RRF** (Reciprocal Rank Fusion): `sum(1 / (k + rank))`, rank-only.
//!
//! Both keep every document that appears in either input and sort by the
//! combined score, descending, with ascending document id on ties.

use crate::{DocId, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// What weighted fusion does with a document whose normalized score is
/// exactly 0 on either side (including documents absent from one list).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroPolicy {
    /// Weighted sum as usual; a missing side contributes 0.
    #[default]
    Sum,
    /// Combined score is 0 if either side is 0.
    ZeroOut,
}

impl FromStr for ZeroPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(ZeroPolicy::Sum),
            "zero-out" => Ok(ZeroPolicy::ZeroOut),
            other => Err(Error::invalid(format!("unknown zero policy '{other}' (expected sum or zero-out)"))),
        }
    }
}

impl fmt::Display for ZeroPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ZeroPolicy::Sum => "sum",
            ZeroPolicy::ZeroOut => "zero-out",
        })
    }
}

/// One method's view of a document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contribution {
    /// 1-based position in the method's ranking
    pub rank: usize,
    /// Score as produced by the method
    pub raw_score: f64,
    /// Normalized score (weighted) or `1 / (k + rank)` (RRF)
    pub fused: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub doc_id: DocId,
    pub lexical: Option<Contribution>,
    pub semantic: Option<Contribution>,
    pub combined: f64,
}

impl FusedHit {
    fn new(doc_id: DocId) -> Self {
        Self { doc_id, lexical: None, semantic: None, combined: 0.0 }
    }

    fn lexical_part(&self) -> f64 {
        self.lexical.map_or(0.0, |c| c.fused)
    }

    fn semantic_part(&self) -> f64 {
        self.semantic.map_or(0.0, |c| c.fused)
    }
}

/// Min-max normalize to [0, 1]. Equal values all map to 1.0.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let (min, max) = values.iter().fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max == min {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// `1 / (k + rank)` for a 1-based rank.
pub fn rrf_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

pub fn weighted_fusion(
    lexical: &[(DocId, f64)],
    semantic: &[(DocId, f64)],
    alpha: f64,
    policy: ZeroPolicy,
    limit: usize,
) -> Result<Vec<FusedHit>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::invalid(format!("alpha must be within [0, 1], got {alpha}")));
    }
    let mut hits: HashMap<DocId, FusedHit> = HashMap::with_capacity(lexical.len() + semantic.len());
    let lexical_norm = normalize(&lexical.iter().map(|&(_, s)| s).collect::<Vec<_>>());
    let semantic_norm = normalize(&semantic.iter().map(|&(_, s)| s).collect::<Vec<_>>());
    accumulate(&mut hits, lexical, &lexical_norm, |h| &mut h.lexical);
    accumulate(&mut hits, semantic, &semantic_norm, |h| &mut h.semantic);

    for hit in hits.values_mut() {
        let (lex, sem) = (hit.lexical_part(), hit.semantic_part());
        hit.combined = match policy {
            ZeroPolicy::ZeroOut if lex == 0.0 || sem == 0.0 => 0.0,
            _ => alpha * sem + (1.0 - alpha) * lex,
        };
    }
    Ok(finish(hits, limit))
}

/// Reciprocal Rank Fusion. Only list order matters; scores are carried
/// through as `raw_score` for display.
pub fn rrf_fusion(lexical: &[(DocId, f64)], semantic: &[(DocId, f64)], k: f64, limit: usize) -> Result<Vec<FusedHit>> {
    if !(k > 0.0 && k.is_finite()) {
        return Err(Error::invalid(format!("rrf k must be positive, got {k}")));
    }
    let mut hits: HashMap<DocId, FusedHit> = HashMap::with_capacity(lexical.len() + semantic.len());
    let lexical_rrf: Vec<f64> = (1..=lexical.len()).map(|r| rrf_contribution(r, k)).collect();
    let semantic_rrf: Vec<f64> = (1..=semantic.len()).map(|r| rrf_contribution(r, k)).collect();
    accumulate(&mut hits, lexical, &lexical_rrf, |h| &mut h.lexical);
    accumulate(&mut hits, semantic, &semantic_rrf, |h| &mut h.semantic);

    for hit in hits.values_mut() {
        hit.combined = hit.lexical_part() + hit.semantic_part();
    }
    Ok(finish(hits, limit))
}

fn accumulate<F>(hits: &mut HashMap<DocId, FusedHit>, ranking: &[(DocId, f64)], fused: &[f64], slot: F)
where
    F: Fn(&mut FusedHit) -> &mut Option<Contribution>,
{
    for (i, (&(doc_id, raw_score), &fused)) in ranking.iter().zip(fused).enumerate() {
        let entry = slot(hits.entry(doc_id).or_insert_with(|| FusedHit::new(doc_id)));
        // a repeated id keeps its best (first) rank
        if entry.is_none() {
            *entry = Some(Contribution { rank: i + 1, raw_score, fused });
        }
    }
}

fn finish(hits: HashMap<DocId, FusedHit>, limit: usize) -> Vec<FusedHit> {
    let mut out: Vec<FusedHit> = hits.into_values().collect();
    out.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    out.truncate(limit);
    out
}
