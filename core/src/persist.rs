//! On-disk cache for the inverted index and chunk vectors.
//!
//! Index tables and chunk vectors are bincode files, chunk metadata is JSON.
//! `meta.json` is written last and removed first, so a cache without it is
//! treated as missing: an interrupted save never looks like a valid cache.

use crate::chunking::ChunkMetadata;
use crate::config;
use crate::index::{DocLengths, InvertedIndex, PostingMap, TermFrequencies};
use crate::semantic::ChunkStore;
use crate::tokenizer::Tokenizer;
use crate::{DocId, Document, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_chunks: usize,
    pub created_at: String,
    pub version: u32,
}

#[derive(Serialize, Deserialize)]
struct ChunkMetadataFile {
    chunks: Vec<ChunkMetadata>,
    total_chunks: usize,
    num_documents: usize,
    dimension: usize,
}

pub struct CachePaths {
    pub root: PathBuf,
}

impl CachePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn index(&self) -> PathBuf { self.root.join(config::INDEX_FILE) }
    fn docmap(&self) -> PathBuf { self.root.join(config::DOCMAP_FILE) }
    fn term_frequencies(&self) -> PathBuf { self.root.join(config::TERM_FREQ_FILE) }
    fn doc_lengths(&self) -> PathBuf { self.root.join(config::DOC_LENGTHS_FILE) }
    fn chunk_embeddings(&self) -> PathBuf { self.root.join(config::CHUNK_EMBEDDINGS_FILE) }
    fn chunk_metadata(&self) -> PathBuf { self.root.join(config::CHUNK_METADATA_FILE) }
    fn meta(&self) -> PathBuf { self.root.join(config::META_FILE) }

    fn index_artifacts(&self) -> Vec<PathBuf> {
        vec![self.index(), self.docmap(), self.term_frequencies(), self.doc_lengths(), self.meta()]
    }

    fn chunk_artifacts(&self) -> Vec<PathBuf> {
        vec![self.chunk_embeddings(), self.chunk_metadata(), self.meta()]
    }

    /// Artifacts a full load needs that are not on disk.
    pub fn missing(&self) -> Vec<PathBuf> {
        let mut all = self.index_artifacts();
        all.extend([self.chunk_embeddings(), self.chunk_metadata()]);
        all.into_iter().filter(|p| !p.exists()).collect()
    }
}

/// Write the index tables, chunk vectors, chunk metadata and `meta.json`.
pub fn save_cache(paths: &CachePaths, index: &InvertedIndex, store: &ChunkStore, created_at: &str) -> Result<()> {
    create_dir_all(&paths.root)?;
    let (postings, docmap, term_frequencies, doc_lengths) = index.parts();
    let chunk_meta = ChunkMetadataFile {
        chunks: store.metadata().to_vec(),
        total_chunks: store.len(),
        num_documents: store.num_documents(),
        dimension: store.dimension(),
    };
    // encode everything before touching the directory
    let files = vec![
        (paths.index(), bincode::serialize(postings)?),
        (paths.docmap(), bincode::serialize(docmap)?),
        (paths.term_frequencies(), bincode::serialize(term_frequencies)?),
        (paths.doc_lengths(), bincode::serialize(doc_lengths)?),
        (paths.chunk_embeddings(), bincode::serialize(store.vectors())?),
        (paths.chunk_metadata(), serde_json::to_vec_pretty(&chunk_meta)?),
    ];
    let meta = MetaFile {
        num_docs: index.num_documents(),
        num_chunks: store.len(),
        created_at: created_at.to_string(),
        version: config::CACHE_VERSION,
    };
    let meta_bytes = serde_json::to_vec_pretty(&meta)?;

    match fs::remove_file(paths.meta()) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    write_staged(files)?;
    write_staged(vec![(paths.meta(), meta_bytes)])?;
    tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, num_chunks = meta.num_chunks, "cache written");
    Ok(())
}

pub fn load_meta(paths: &CachePaths) -> Result<MetaFile> {
    let bytes = read_artifact(&paths.meta())?;
    serde_json::from_slice(&bytes).map_err(|e| unreadable(&paths.meta(), e))
}

pub fn load_index(paths: &CachePaths, tokenizer: Tokenizer) -> Result<InvertedIndex> {
    require(&paths.index_artifacts())?;
    let postings: PostingMap = read_bin(&paths.index())?;
    let docmap: HashMap<DocId, Document> = read_bin(&paths.docmap())?;
    let term_frequencies: TermFrequencies = read_bin(&paths.term_frequencies())?;
    let doc_lengths: DocLengths = read_bin(&paths.doc_lengths())?;
    let index = InvertedIndex::from_parts(tokenizer, postings, docmap, term_frequencies, doc_lengths)?;
    tracing::info!(num_docs = index.num_documents(), num_terms = index.num_terms(), "inverted index loaded");
    Ok(index)
}

/// Load chunk vectors built for a set of `expected_documents` documents.
pub fn load_chunks(paths: &CachePaths, expected_documents: usize) -> Result<ChunkStore> {
    require(&paths.chunk_artifacts())?;
    let bytes = read_artifact(&paths.chunk_metadata())?;
    let meta: ChunkMetadataFile = serde_json::from_slice(&bytes).map_err(|e| unreadable(&paths.chunk_metadata(), e))?;
    if meta.num_documents != expected_documents {
        return Err(Error::CacheMissing(format!(
            "chunk vectors were built for {} documents, found {expected_documents}",
            meta.num_documents
        )));
    }
    let vectors: Vec<Vec<f32>> = read_bin(&paths.chunk_embeddings())?;
    if vectors.len() != meta.total_chunks {
        return Err(Error::CacheMissing(format!(
            "chunk metadata lists {} chunks, embeddings hold {}",
            meta.total_chunks,
            vectors.len()
        )));
    }
    let store = ChunkStore::new(vectors, meta.chunks, meta.dimension, meta.num_documents)
        .map_err(|e| Error::CacheMissing(format!("chunk cache inconsistent: {e}")))?;
    tracing::info!(num_chunks = store.len(), dimension = store.dimension(), "chunk vectors loaded");
    Ok(store)
}

fn require(artifacts: &[PathBuf]) -> Result<()> {
    let missing: Vec<String> = artifacts.iter().filter(|p| !p.exists()).map(|p| p.display().to_string()).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::CacheMissing(missing.join(", ")))
    }
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| unreadable(path, e))
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_artifact(path)?;
    bincode::deserialize(&bytes).map_err(|e| unreadable(path, e))
}

fn unreadable(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::CacheMissing(format!("{}: {e}", path.display()))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write every file to a `.tmp` sibling, then rename them into place.
/// Temporaries are removed if any step fails.
fn write_staged(files: Vec<(PathBuf, Vec<u8>)>) -> Result<()> {
    let staged: Vec<(PathBuf, PathBuf)> = files.iter().map(|(p, _)| (tmp_path(p), p.clone())).collect();
    let result = files
        .iter()
        .zip(&staged)
        .try_for_each(|((_, bytes), (tmp, _))| fs::write(tmp, bytes))
        .and_then(|()| staged.iter().try_for_each(|(tmp, dest)| fs::rename(tmp, dest)));
    if let Err(e) = result {
        for (tmp, _) in &staged {
            let _ = fs::remove_file(tmp);
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use crate::embedding::HashingEncoder;
    use crate::semantic::ChunkRanker;
    use crate::Bm25Params;
    use tempfile::tempdir;

    fn docs() -> Vec<Document> {
        vec![
            Document::new(1, "Brave", "A princess with bow and arrow. She defies tradition."),
            Document::new(2, "Cars", "Talking race cars."),
            Document::new(3, "Silent", ""),
        ]
    }

    fn built() -> (InvertedIndex, ChunkStore) {
        let index = InvertedIndex::build(Tokenizer::default(), docs()).unwrap();
        let ranker = ChunkRanker::build(HashingEncoder::new(32, Tokenizer::default()), &docs(), ChunkingConfig::default()).unwrap();
        (index, ranker.store().clone())
    }

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let (index, store) = built();
        save_cache(&paths, &index, &store, "2024-01-01T00:00:00Z").unwrap();
        assert!(paths.missing().is_empty());

        let loaded = load_index(&paths, Tokenizer::default()).unwrap();
        assert_eq!(loaded.parts().0, index.parts().0);
        assert_eq!(loaded.parts().1, index.parts().1);
        assert_eq!(
            loaded.bm25_search("princess race", 5, Bm25Params::default()).unwrap(),
            index.bm25_search("princess race", 5, Bm25Params::default()).unwrap()
        );
        assert_eq!(load_chunks(&paths, 3).unwrap(), store);
        let meta = load_meta(&paths).unwrap();
        assert_eq!(meta.num_docs, 3);
        assert_eq!(meta.num_chunks, store.len());
    }

    #[test]
    fn missing_artifact_is_cache_missing() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        assert!(matches!(load_index(&paths, Tokenizer::default()), Err(Error::CacheMissing(_))));

        let (index, store) = built();
        save_cache(&paths, &index, &store, "").unwrap();
        fs::remove_file(paths.term_frequencies()).unwrap();
        assert!(matches!(load_index(&paths, Tokenizer::default()), Err(Error::CacheMissing(_))));
        assert!(load_chunks(&paths, 3).is_ok());
    }

    #[test]
    fn corrupt_or_stale_artifacts_are_cache_missing() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let (index, store) = built();
        save_cache(&paths, &index, &store, "").unwrap();
        assert!(matches!(load_chunks(&paths, 4), Err(Error::CacheMissing(_))));
        fs::write(paths.docmap(), b"\x01garbage").unwrap();
        assert!(matches!(load_index(&paths, Tokenizer::default()), Err(Error::CacheMissing(_))));
    }

    #[test]
    fn failed_save_leaves_no_usable_cache() {
        let dir = tempdir().unwrap();
        let paths = CachePaths::new(dir.path());
        let (index, store) = built();
        save_cache(&paths, &index, &store, "").unwrap();

        // a directory in the way makes one rename fail midway
        fs::remove_file(paths.doc_lengths()).unwrap();
        fs::create_dir(paths.doc_lengths()).unwrap();
        fs::write(paths.doc_lengths().join("blocker"), b"x").unwrap();
        assert!(save_cache(&paths, &index, &store, "").is_err());

        assert!(matches!(load_index(&paths, Tokenizer::default()), Err(Error::CacheMissing(_))));
        assert!(matches!(load_chunks(&paths, 3), Err(Error::CacheMissing(_))));
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
