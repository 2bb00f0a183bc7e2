use crate::config;
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// token -> documents containing it
pub type PostingMap = HashMap<String, HashSet<DocId>>;
/// document -> token -> occurrences
pub type TermFrequencies = HashMap<DocId, HashMap<String, u32>>;
/// document -> token count
pub type DocLengths = HashMap<DocId, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: config::BM25_K1, b: config::BM25_B }
    }
}

impl Bm25Params {
    /// `k1` must be finite and non-negative, `b` within `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(Error::invalid(format!("k1 must be a non-negative number, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(Error::invalid(format!("b must be within [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Accumulates documents and hands out an [`InvertedIndex`] once every
/// document has been added.
pub struct IndexBuilder {
    tokenizer: Tokenizer,
    postings: PostingMap,
    docmap: HashMap<DocId, Document>,
    term_frequencies: TermFrequencies,
    doc_lengths: DocLengths,
}

impl IndexBuilder {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            postings: HashMap::new(),
            docmap: HashMap::new(),
            term_frequencies: HashMap::new(),
            doc_lengths: HashMap::new(),
        }
    }

    pub fn add_document(&mut self, doc: Document) -> Result<&mut Self> {
        if self.docmap.contains_key(&doc.id) {
            return Err(Error::invalid(format!("duplicate document id {}", doc.id)));
        }
        let tokens = self.tokenizer.process(&doc.indexed_text());
        let counts = self.term_frequencies.entry(doc.id).or_default();
        for token in &tokens {
            self.postings.entry(token.clone()).or_default().insert(doc.id);
            *counts.entry(token.clone()).or_insert(0) += 1;
        }
        self.doc_lengths.insert(doc.id, tokens.len() as u32);
        self.docmap.insert(doc.id, doc);
        Ok(self)
    }

    pub fn build(self) -> InvertedIndex {
        tracing::info!(num_docs = self.docmap.len(), num_terms = self.postings.len(), "inverted index built");
        InvertedIndex {
            tokenizer: self.tokenizer,
            postings: self.postings,
            docmap: self.docmap,
            term_frequencies: self.term_frequencies,
            doc_lengths: self.doc_lengths,
        }
    }
}

/// Immutable keyword index with BM25 scoring.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    tokenizer: Tokenizer,
    postings: PostingMap,
    docmap: HashMap<DocId, Document>,
    term_frequencies: TermFrequencies,
    doc_lengths: DocLengths,
}

impl InvertedIndex {
    pub fn build<I>(tokenizer: Tokenizer, documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut builder = IndexBuilder::new(tokenizer);
        for doc in documents {
            builder.add_document(doc)?;
        }
        Ok(builder.build())
    }

    /// Reassemble an index from persisted tables. The three per-document
    /// tables must cover the same documents.
    pub(crate) fn from_parts(
        tokenizer: Tokenizer,
        postings: PostingMap,
        docmap: HashMap<DocId, Document>,
        term_frequencies: TermFrequencies,
        doc_lengths: DocLengths,
    ) -> Result<Self> {
        let consistent = docmap.len() == doc_lengths.len()
            && docmap.len() == term_frequencies.len()
            && docmap.keys().all(|id| doc_lengths.contains_key(id) && term_frequencies.contains_key(id));
        if !consistent {
            return Err(Error::CacheMissing("index tables disagree on the document set".into()));
        }
        Ok(Self { tokenizer, postings, docmap, term_frequencies, doc_lengths })
    }

    pub(crate) fn parts(&self) -> (&PostingMap, &HashMap<DocId, Document>, &TermFrequencies, &DocLengths) {
        (&self.postings, &self.docmap, &self.term_frequencies, &self.doc_lengths)
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn num_documents(&self) -> usize {
        self.docmap.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.docmap.get(&doc_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docmap.values()
    }

    /// Documents containing `token`, ascending.
    pub fn postings(&self, token: &str) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self
            .postings
            .get(token)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn term_frequency(&self, doc_id: DocId, term: &str) -> Result<u32> {
        let token = self.tokenizer.single_token(term)?;
        self.token_frequency(doc_id, &token)
    }

    pub fn document_frequency(&self, term: &str) -> Result<usize> {
        let token = self.tokenizer.single_token(term)?;
        Ok(self.token_df(&token))
    }

    /// `ln((N + 1) / (df + 1))`
    pub fn idf(&self, term: &str) -> Result<f64> {
        let df = self.document_frequency(term)? as f64;
        let n = self.num_documents() as f64;
        Ok(((n + 1.0) / (df + 1.0)).ln())
    }

    pub fn tf_idf(&self, doc_id: DocId, term: &str) -> Result<f64> {
        let tf = self.term_frequency(doc_id, term)? as f64;
        Ok(tf * self.idf(term)?)
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`
    pub fn bm25_idf(&self, term: &str) -> Result<f64> {
        let token = self.tokenizer.single_token(term)?;
        Ok(self.token_bm25_idf(&token))
    }

    /// Saturated, length-normalized term frequency.
    pub fn bm25_tf(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        params.validate()?;
        let token = self.tokenizer.single_token(term)?;
        let tf = self.token_frequency(doc_id, &token)?;
        self.ensure_ready()?;
        Ok(self.saturate(doc_id, tf, self.average_doc_length(), params))
    }

    /// Per-term BM25 contribution: `bm25_tf * bm25_idf`.
    pub fn bm25(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        Ok(self.bm25_tf(doc_id, term, params)? * self.bm25_idf(term)?)
    }

    /// Mean token count per document, computed from the current length table.
    pub fn average_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_lengths.values().map(|&l| l as u64).sum();
        total as f64 / self.doc_lengths.len() as f64
    }

    /// Rank documents by summed BM25 over the query tokens. Only documents
    /// sharing at least one token with the query are scored.
    pub fn bm25_search(&self, query: &str, limit: usize, params: Bm25Params) -> Result<Vec<(DocId, f64)>> {
        params.validate()?;
        let tokens = self.query_tokens(query)?;
        let mut candidates: HashSet<DocId> = HashSet::new();
        for token in &tokens {
            if let Some(set) = self.postings.get(token) {
                candidates.extend(set.iter().copied());
            }
        }
        tracing::debug!(query, candidates = candidates.len(), "bm25 candidates");
        Ok(self.score_documents(&tokens, candidates, limit, params))
    }

    /// Reference scan over every document. Same output as [`bm25_search`](Self::bm25_search).
    pub fn bm25_search_exhaustive(&self, query: &str, limit: usize, params: Bm25Params) -> Result<Vec<(DocId, f64)>> {
        params.validate()?;
        let tokens = self.query_tokens(query)?;
        Ok(self.score_documents(&tokens, self.docmap.keys().copied(), limit, params))
    }

    fn score_documents<I>(&self, tokens: &[String], docs: I, limit: usize, params: Bm25Params) -> Vec<(DocId, f64)>
    where
        I: IntoIterator<Item = DocId>,
    {
        let avg_len = self.average_doc_length();
        let idfs: Vec<f64> = tokens.iter().map(|t| self.token_bm25_idf(t)).collect();
        let mut scored: Vec<(DocId, f64)> = Vec::new();
        for doc_id in docs {
            let counts = self.term_frequencies.get(&doc_id);
            let mut score = 0.0;
            for (token, idf) in tokens.iter().zip(&idfs) {
                let tf = counts.and_then(|c| c.get(token)).copied().unwrap_or(0);
                score += self.saturate(doc_id, tf, avg_len, params) * idf;
            }
            if score > 0.0 {
                scored.push((doc_id, score));
            }
        }
        sort_ranked(&mut scored);
        scored.truncate(limit);
        scored
    }

    fn saturate(&self, doc_id: DocId, tf: u32, avg_len: f64, params: Bm25Params) -> f64 {
        if tf == 0 {
            return 0.0;
        }
        let tf = tf as f64;
        let len = self.doc_lengths.get(&doc_id).copied().unwrap_or(0) as f64;
        let length_norm = if avg_len > 0.0 { 1.0 - params.b + params.b * (len / avg_len) } else { 1.0 };
        (tf * (params.k1 + 1.0)) / (tf + params.k1 * length_norm)
    }

    fn query_tokens(&self, query: &str) -> Result<Vec<String>> {
        self.ensure_ready()?;
        if query.trim().is_empty() {
            return Err(Error::invalid("query text is empty"));
        }
        Ok(self.tokenizer.process(query))
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.docmap.is_empty() {
            return Err(Error::invalid("index has no documents"));
        }
        Ok(())
    }

    fn token_frequency(&self, doc_id: DocId, token: &str) -> Result<u32> {
        let counts = self.term_frequencies.get(&doc_id).ok_or(Error::NotFound(doc_id))?;
        Ok(counts.get(token).copied().unwrap_or(0))
    }

    fn token_df(&self, token: &str) -> usize {
        self.postings.get(token).map_or(0, HashSet::len)
    }

    fn token_bm25_idf(&self, token: &str) -> f64 {
        let df = self.token_df(token) as f64;
        let n = self.num_documents() as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

/// Descending by score, ascending id on ties.
pub(crate) fn sort_ranked<S: Copy + Into<f64>>(items: &mut [(DocId, S)]) {
    items.sort_by(|a, b| {
        let (sa, sb): (f64, f64) = (a.1.into(), b.1.into());
        sb.partial_cmp(&sa).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
    });
}
