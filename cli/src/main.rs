use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use search_core::chunking::{fixed_size_chunking, semantic_chunking};
use search_core::document::load_documents;
use search_core::evaluation::{evaluate, load_golden_dataset};
use search_core::fusion::normalize;
use search_core::persist::{load_index, load_meta, CachePaths};
use search_core::{
    config, Bm25Params, ChunkingConfig, Document, Encoder, Error, HashingEncoder, HybridResult, HybridSearch,
    InvertedIndex, KeywordReranker, Tokenizer, ZeroPolicy,
};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "hybrid-search")]
#[command(about = "Keyword, semantic and hybrid search over a document collection", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: Source,
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// JSON file holding the documents
    #[arg(long, global = true, default_value = "data/movies.json")]
    documents: PathBuf,
    /// Top-level field of the document file that holds the array
    #[arg(long, global = true, default_value = config::DEFAULT_DOCUMENT_FIELD)]
    field: String,
    /// Newline-delimited stopword list (built-in English list if omitted)
    #[arg(long, global = true)]
    stopwords: Option<PathBuf>,
    /// Cache directory
    #[arg(long, global = true, default_value = "cache")]
    cache: PathBuf,
    /// Width of the hashing encoder's vectors
    #[arg(long, global = true, default_value_t = config::HASHING_DIMENSION)]
    dimension: usize,
}

#[derive(Args, Clone, Copy)]
struct Bm25Args {
    /// Term frequency saturation
    #[arg(long, default_value_t = config::BM25_K1)]
    k1: f64,
    /// Length normalization
    #[arg(long, default_value_t = config::BM25_B)]
    b: f64,
}

impl From<Bm25Args> for Bm25Params {
    fn from(a: Bm25Args) -> Self {
        Bm25Params { k1: a.k1, b: a.b }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the inverted index and chunk vectors and write them to the cache
    Build {
        /// Sentences per chunk
        #[arg(long, default_value_t = config::MAX_SEMANTIC_CHUNK_SIZE)]
        max_chunk_size: usize,
        /// Sentences shared by consecutive chunks
        #[arg(long, default_value_t = config::SEMANTIC_CHUNK_OVERLAP)]
        overlap: usize,
    },
    /// Show what the cache holds
    Info,
    /// List the documents containing a term
    Postings { term: String },
    /// Rank documents with BM25
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[command(flatten)]
        bm25: Bm25Args,
    },
    /// Term frequency of a term in a document
    Tf { doc_id: u32, term: String },
    /// Smoothed inverse document frequency of a term
    Idf { term: String },
    /// TF-IDF of a term in a document
    Tfidf { doc_id: u32, term: String },
    /// BM25 inverse document frequency of a term
    Bm25idf { term: String },
    /// Saturated BM25 term frequency of a term in a document
    Bm25tf {
        doc_id: u32,
        term: String,
        #[command(flatten)]
        bm25: Bm25Args,
    },
    /// Preview how a text is chunked
    Chunk {
        text: String,
        /// Sentences per chunk (or words with --fixed)
        #[arg(long, default_value_t = config::MAX_SEMANTIC_CHUNK_SIZE)]
        size: usize,
        #[arg(long, default_value_t = 0)]
        overlap: usize,
        /// Chunk by word count instead of sentences
        #[arg(long, default_value_t = false)]
        fixed: bool,
    },
    /// Min-max normalize values to 0.0-1.0
    Normalize {
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
    /// Rank documents by their best-matching chunk
    SemanticSearch {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Weighted fusion of normalized BM25 and semantic scores
    WeightedSearch {
        query: String,
        /// 0.0: only BM25, 1.0: only semantic
        #[arg(long, default_value_t = config::DEFAULT_ALPHA)]
        alpha: f64,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// sum | zero-out: whether a zero on either side zeroes the hybrid score
        #[arg(long, default_value_t = ZeroPolicy::Sum)]
        zero_policy: ZeroPolicy,
    },
    /// Reciprocal Rank Fusion of BM25 and semantic rankings
    RrfSearch {
        query: String,
        /// Weight between higher and lower ranked results. Suggested range: 20-100
        #[arg(long, default_value_t = 50.0)]
        k: f64,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Reorder a wider short-list by keyword relevance before cutting to --limit
        #[arg(long, default_value_t = false)]
        rerank: bool,
    },
    /// Encode a text and show the start of its vector
    Embed { text: String },
    /// Check the cached chunk vectors against the current encoder
    VerifyEmbeddings,
    /// Precision@k and recall@k of RRF search against a golden dataset
    Evaluate {
        #[arg(long, default_value = "data/golden_dataset.json")]
        golden: PathBuf,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, default_value_t = config::RRF_K)]
        k: f64,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let src = &cli.source;
    let json = cli.json;

    match cli.command {
        Commands::Build { max_chunk_size, overlap } => build_cache(src, ChunkingConfig { max_chunk_size, overlap }),
        Commands::Info => info(src),
        Commands::Postings { term } => {
            let index = open_index(src)?;
            let token = index.tokenizer().single_token(&term)?;
            let ids = index.postings(&token);
            println!("'{term}' ({token}) appears in {} documents", ids.len());
            for id in ids {
                if let Some(doc) = index.document(id) {
                    println!("  ({id}) {}", doc.title);
                }
            }
            Ok(())
        }
        Commands::Search { query, limit, bm25 } => {
            let index = open_index(src)?;
            println!("Searching for: {query}");
            for (i, (doc_id, score)) in index.bm25_search(&query, limit, bm25.into())?.into_iter().enumerate() {
                println!("{}. ({doc_id}) {} - Score: {score:.2}", i + 1, title_of(&index, doc_id));
            }
            Ok(())
        }
        Commands::Tf { doc_id, term } => {
            let tf = open_index(src)?.term_frequency(doc_id, &term)?;
            println!("Term frequency of '{term}' in doc {doc_id}: {tf}");
            Ok(())
        }
        Commands::Idf { term } => {
            let idf = open_index(src)?.idf(&term)?;
            println!("idf for '{term}': {idf:.2}");
            Ok(())
        }
        Commands::Tfidf { doc_id, term } => {
            let score = open_index(src)?.tf_idf(doc_id, &term)?;
            println!("TF-IDF score of '{term}' in document '{doc_id}': {score:.2}");
            Ok(())
        }
        Commands::Bm25idf { term } => {
            let idf = open_index(src)?.bm25_idf(&term)?;
            println!("BM25 IDF score of '{term}': {idf:.2}");
            Ok(())
        }
        Commands::Bm25tf { doc_id, term, bm25 } => {
            let tf = open_index(src)?.bm25_tf(doc_id, &term, bm25.into())?;
            println!("BM25 TF score of '{term}' in document '{doc_id}': {tf:.2}");
            Ok(())
        }
        Commands::Chunk { text, size, overlap, fixed } => {
            let chunks = if fixed {
                fixed_size_chunking(&text, size, overlap)?
            } else {
                semantic_chunking(&text, size, overlap)?
            };
            println!("Chunking {} characters", text.chars().count());
            for (i, chunk) in chunks.iter().enumerate() {
                println!("{}. {chunk}", i + 1);
            }
            Ok(())
        }
        Commands::Normalize { values } => {
            for v in normalize(&values) {
                println!("* {v:.4}");
            }
            Ok(())
        }
        Commands::SemanticSearch { query, limit } => {
            let engine = open_engine(src)?;
            for (i, (doc_id, score)) in engine.semantic_search(&query, limit)?.into_iter().enumerate() {
                let doc = engine.index().document(doc_id).ok_or(Error::NotFound(doc_id))?;
                println!("{}. {} (score: {score:.4})\n{}...", i + 1, doc.title, preview(&doc.description, 100));
            }
            Ok(())
        }
        Commands::WeightedSearch { query, alpha, limit, zero_policy } => {
            let engine = open_engine(src)?;
            let results = engine.weighted_search(&query, alpha, zero_policy, limit)?;
            if json {
                return print_json(&results);
            }
            for (i, r) in results.iter().enumerate() {
                print_weighted(i, r);
            }
            Ok(())
        }
        Commands::RrfSearch { query, k, limit, rerank } => {
            let engine = open_engine(src)?;
            let results = if rerank {
                engine.rrf_search_reranked(&query, k, limit, &KeywordReranker::new(tokenizer(src)?, Bm25Params::default()))?
            } else {
                engine.rrf_search(&query, k, limit)?
            };
            if json {
                return print_json(&results);
            }
            for (i, r) in results.iter().enumerate() {
                print_rrf(i, r);
            }
            Ok(())
        }
        Commands::Embed { text } => {
            println!("{}", describe_embedding(&encoder(src)?, &text, 3)?);
            Ok(())
        }
        Commands::VerifyEmbeddings => {
            let engine = open_engine(src)?;
            let store = engine.ranker().store();
            println!("Number of docs:   {}", store.num_documents());
            println!("Number of chunks: {}", store.len());
            println!("Embeddings shape: {} vectors in {} dimensions", store.len(), store.dimension());
            Ok(())
        }
        Commands::Evaluate { golden, limit, k } => {
            let engine = open_engine(src)?;
            let dataset = load_golden_dataset(&golden).with_context(|| format!("reading {}", golden.display()))?;
            let reports = evaluate(&engine, &dataset, k, limit)?;
            if json {
                return print_json(&reports);
            }
            println!("k={limit}");
            for report in reports {
                println!("\n- Query: {}", report.query);
                println!("\tPrecision@{limit}: {:.4}", report.precision);
                println!("\tRecall@{limit}: {:.4}", report.recall);
                println!("\tRetrieved: {}", report.retrieved.join(", "));
                println!("\tRelevant: {}", report.relevant.join(", "));
            }
            Ok(())
        }
    }
}

fn tokenizer(src: &Source) -> Result<Tokenizer> {
    match &src.stopwords {
        Some(path) => Tokenizer::from_stopwords_file(path).with_context(|| format!("reading stopwords {}", path.display())),
        None => Ok(Tokenizer::default()),
    }
}

fn encoder(src: &Source) -> Result<HashingEncoder> {
    Ok(HashingEncoder::new(src.dimension, tokenizer(src)?))
}

fn load_movies(src: &Source) -> Result<Vec<Document>> {
    load_documents(&src.documents, &src.field).with_context(|| format!("reading documents {}", src.documents.display()))
}

fn build_cache(src: &Source, cfg: ChunkingConfig) -> Result<()> {
    let documents = load_movies(src)?;
    tracing::info!(num_docs = documents.len(), "building cache");
    let engine = HybridSearch::build(documents, tokenizer(src)?, encoder(src)?, cfg)?;
    let created_at = time::OffsetDateTime::now_utc().format(&Rfc3339).context("formatting build time")?;
    let paths = CachePaths::new(&src.cache);
    engine.save(&paths, &created_at)?;
    println!(
        "Indexed {} documents ({} terms, {} chunks) into {}",
        engine.index().num_documents(),
        engine.index().num_terms(),
        engine.ranker().store().len(),
        src.cache.display()
    );
    Ok(())
}

fn info(src: &Source) -> Result<()> {
    let paths = CachePaths::new(&src.cache);
    let missing = paths.missing();
    if !missing.is_empty() {
        for p in &missing {
            println!("missing: {}", p.display());
        }
        bail!("cache at {} is incomplete; run `hybrid-search build`", src.cache.display());
    }
    let meta = load_meta(&paths)?;
    println!("documents: {}", meta.num_docs);
    println!("chunks:    {}", meta.num_chunks);
    println!("created:   {}", meta.created_at);
    println!("version:   {}", meta.version);
    Ok(())
}

/// Turn a missing cache into advice; the build is always the caller's decision.
fn cache_hint<T>(res: search_core::Result<T>, src: &Source) -> Result<T> {
    match res {
        Ok(v) => Ok(v),
        Err(Error::CacheMissing(why)) => {
            bail!("no usable cache in {} ({why}); run `hybrid-search build` first", src.cache.display())
        }
        Err(e) => Err(e.into()),
    }
}

fn open_index(src: &Source) -> Result<InvertedIndex> {
    cache_hint(load_index(&CachePaths::new(&src.cache), tokenizer(src)?), src)
}

fn open_engine(src: &Source) -> Result<HybridSearch<HashingEncoder>> {
    let paths = CachePaths::new(&src.cache);
    let engine = cache_hint(HybridSearch::load(&paths, tokenizer(src)?, encoder(src)?), src)?;
    // vectors must match the current document file
    let current = load_movies(src)?.len();
    if current != engine.index().num_documents() {
        bail!(
            "cache holds {} documents but {} has {current}; run `hybrid-search build`",
            engine.index().num_documents(),
            src.documents.display()
        );
    }
    Ok(engine)
}

fn describe_embedding<E: Encoder>(encoder: &E, text: &str, head: usize) -> Result<String> {
    let vector = encoder.encode(text)?;
    let shown: Vec<String> = vector.iter().take(head).map(|v| format!("{v:.4}")).collect();
    Ok(format!(
        "Text: {text}\nModel: {}\nFirst {} dimensions: [{}]\nDimensions: {}",
        encoder.model_name(),
        shown.len(),
        shown.join(", "),
        vector.len()
    ))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn title_of(index: &InvertedIndex, doc_id: u32) -> &str {
    index.document(doc_id).map_or("<unknown>", |d| d.title.as_str())
}

fn preview(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn print_weighted(i: usize, r: &HybridResult) {
    let lexical = r.hit.lexical.map_or(0.0, |c| c.fused);
    let semantic = r.hit.semantic.map_or(0.0, |c| c.fused);
    println!(
        "{}. {}\n   Hybrid score: {:.3}\n   BM25: {lexical:.3}, Semantic: {semantic:.3}\n{}",
        i + 1,
        r.document.title,
        r.hit.combined,
        preview(&r.document.description, 100)
    );
}

fn print_rrf(i: usize, r: &HybridResult) {
    let rank = |c: Option<search_core::fusion::Contribution>| c.map_or("-".to_string(), |c| c.rank.to_string());
    println!(
        "{}. {}\n   RRF score: {:.3}\n   BM25 Rank: {}, Semantic Rank: {}\n{}...",
        i + 1,
        r.document.title,
        r.hit.combined,
        rank(r.hit.lexical),
        rank(r.hit.semantic),
        preview(&r.document.description, 100)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_description_lists_head_and_width() {
        let encoder = HashingEncoder::new(8, Tokenizer::default());
        let out = describe_embedding(&encoder, "princess with a bow", 3).unwrap();
        assert!(out.contains("Model: fnv1a-hashing"));
        assert!(out.contains("First 3 dimensions: ["));
        assert!(out.ends_with("Dimensions: 8"));
    }

    #[test]
    fn empty_text_cannot_be_embedded() {
        assert!(describe_embedding(&HashingEncoder::default(), "  ", 3).is_err());
    }

    #[test]
    fn rrf_search_accepts_rerank_flag() {
        let cli = Cli::try_parse_from(["hybrid-search", "rrf-search", "bow", "--rerank", "--limit", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::RrfSearch { rerank: true, limit: 2, .. }));
    }
}
