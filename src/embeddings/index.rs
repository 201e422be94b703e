//! Vector index with attached article ids and the metadata stored beside it.
//!
//! Each row carries its article id, and metadata is keyed by that id, so the
//! two stores never depend on positional alignment.
//!
//! # On-disk layout
//!
//! ```text
//! index_dir/
//! ├── metadata.json   # { article_id: ArticleMetadata }
//! └── index.json      # { dimension, rows: [{ article_id, vector }] }
//! ```
//!
//! Both files are written to a `.tmp` sibling and renamed into place, metadata
//! first. A crash between the two renames leaves metadata ahead of the index;
//! [`ArticleIndex::load`] drops the orphaned metadata and keeps the index. An
//! index row without metadata is rejected.

use crate::error::IndexError;
use crate::models::ArticleMetadata;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Cosine similarity clamped to `[0, 1]`. Zero vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// One row of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVector {
    pub article_id: String,
    pub vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    rows: Vec<IndexedVector>,
}

/// Brute-force cosine index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    rows: Vec<IndexedVector>,
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn from_rows(dimension: usize, rows: Vec<IndexedVector>) -> Result<Self, IndexError> {
        let mut index = Self::new(dimension);
        for row in rows {
            if index.positions.contains_key(&row.article_id) {
                return Err(IndexError::Inconsistent(format!(
                    "duplicate index row for {}",
                    row.article_id
                )));
            }
            index.upsert(row.article_id, row.vector)?;
        }
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, article_id: &str) -> bool {
        self.positions.contains_key(article_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.article_id.as_str())
    }

    /// Insert a row, replacing the vector if the id is already present.
    pub fn upsert(&mut self, article_id: String, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        match self.positions.get(&article_id) {
            Some(&pos) => self.rows[pos].vector = vector,
            None => {
                self.positions.insert(article_id.clone(), self.rows.len());
                self.rows.push(IndexedVector { article_id, vector });
            }
        }
        Ok(())
    }

    /// Top `k` rows by similarity, descending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(&str, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut scores: Vec<(&str, f32)> = self
            .rows
            .iter()
            .map(|row| (row.article_id.as_str(), cosine_similarity(query, &row.vector)))
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scores.truncate(k);
        Ok(scores)
    }
}

/// Vector index plus the metadata of every indexed article.
#[derive(Debug, Clone)]
pub struct ArticleIndex {
    vectors: VectorIndex,
    metadata: BTreeMap<String, ArticleMetadata>,
}

impl ArticleIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: VectorIndex::new(dimension),
            metadata: BTreeMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, article_id: &str) -> bool {
        self.vectors.contains(article_id)
    }

    /// Every vector row has metadata and the counts agree.
    pub fn is_consistent(&self) -> bool {
        self.vectors.len() == self.metadata.len()
            && self.vectors.ids().all(|id| self.metadata.contains_key(id))
    }

    /// Add or replace one article. Nothing changes if the vector is rejected.
    pub fn insert(&mut self, metadata: ArticleMetadata, vector: Vec<f32>) -> Result<(), IndexError> {
        self.vectors.upsert(metadata.article_id.clone(), vector)?;
        self.metadata.insert(metadata.article_id.clone(), metadata);
        Ok(())
    }

    /// Rows at or above `threshold`, best first, at most `top_k`.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<(ArticleMetadata, f32)>, IndexError> {
        let hits = self.vectors.search(query, top_k)?;
        Ok(hits
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .filter_map(|(id, score)| self.metadata.get(id).map(|m| (m.clone(), score)))
            .collect())
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    pub fn metadata_path(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    /// Read both files and verify they describe the same set of articles.
    #[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
    pub async fn load(dir: &Path, expected_dimension: usize) -> Result<Self, IndexError> {
        let index_raw = tokio::fs::read_to_string(Self::index_path(dir)).await?;
        let metadata_raw = tokio::fs::read_to_string(Self::metadata_path(dir)).await?;

        let file: IndexFile = serde_json::from_str(&index_raw)?;
        if file.dimension != expected_dimension {
            return Err(IndexError::Dimension {
                expected: expected_dimension,
                actual: file.dimension,
            });
        }
        let vectors = VectorIndex::from_rows(file.dimension, file.rows)?;
        let mut metadata: BTreeMap<String, ArticleMetadata> = serde_json::from_str(&metadata_raw)?;

        if let Some(missing) = vectors.ids().find(|id| !metadata.contains_key(*id)) {
            return Err(IndexError::Inconsistent(format!(
                "index row {missing} has no metadata ({} vectors vs {} metadata records)",
                vectors.len(),
                metadata.len()
            )));
        }
        let before = metadata.len();
        metadata.retain(|id, _| vectors.contains(id));
        if metadata.len() < before {
            warn!(
                dropped = before - metadata.len(),
                vectors = vectors.len(),
                "Metadata ahead of index (interrupted save); dropping orphaned records"
            );
        }

        let loaded = Self { vectors, metadata };
        info!(vectors = loaded.vector_count(), "Loaded persisted index");
        Ok(loaded)
    }

    /// Write metadata, then the index, each through a temp file and rename.
    #[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
    pub async fn save(&self, dir: &Path) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(dir).await?;

        let metadata_json = serde_json::to_string(&self.metadata)?;
        write_atomic(&Self::metadata_path(dir), metadata_json.as_bytes()).await?;

        let file = IndexFile {
            dimension: self.vectors.dimension,
            rows: self.vectors.rows.clone(),
        };
        let index_json = serde_json::to_string(&file)?;
        write_atomic(&Self::index_path(dir), index_json.as_bytes()).await?;

        debug!(
            vectors = self.vector_count(),
            bytes = metadata_json.len() + index_json.len(),
            "Index persisted"
        );
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
