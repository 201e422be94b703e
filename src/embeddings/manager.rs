//! Long-lived similarity index over every published article.
//!
//! The manager owns the [`ArticleIndex`] behind an async `RwLock`: searches
//! share the read side, while additions and persistence take the write side and
//! therefore never interleave.

use super::index::ArticleIndex;
use super::provider::EmbeddingProvider;
use crate::config::{EmbeddingConfig, IndexConfig};
use crate::error::{EmbeddingError, IndexError};
use crate::models::{Article, ArticleMetadata, SimilarArticle};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Snapshot of the index for operators.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub metadata_count: usize,
    pub consistent: bool,
    pub dimension: usize,
    pub index_dir: PathBuf,
    pub index_file_exists: bool,
    pub metadata_file_exists: bool,
}

/// Shared handle to the article index and the embedding provider.
///
/// Construct once per process with [`EmbeddingManager::load`] and share it
/// behind an `Arc`.
pub struct EmbeddingManager {
    state: RwLock<ArticleIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    dir: PathBuf,
    max_input_chars: usize,
    /// Vectors computed during this run, keyed by article id.
    computed: Mutex<HashMap<String, Vec<f32>>>,
}

impl fmt::Debug for EmbeddingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingManager")
            .field("provider", &self.provider)
            .field("dir", &self.dir)
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

impl EmbeddingManager {
    /// Load the persisted index from `index.dir`, or start empty.
    ///
    /// Never fails: missing, unreadable or inconsistent state is logged and
    /// treated as "no prior history".
    #[instrument(level = "info", skip_all, fields(dir = %index.dir.display()))]
    pub async fn load(
        embedding: &EmbeddingConfig,
        index: &IndexConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let dimension = embedding.dimension;
        if provider.dimension() != dimension {
            warn!(
                configured = dimension,
                provider = provider.dimension(),
                "Embedding provider dimension differs from configuration"
            );
        }

        let state = match ArticleIndex::load(&index.dir, dimension).await {
            Ok(loaded) => loaded,
            Err(IndexError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!("No persisted index found; starting with empty history");
                ArticleIndex::new(dimension)
            }
            Err(e) => {
                warn!(error = %e, "Persisted index unusable; starting with empty history");
                ArticleIndex::new(dimension)
            }
        };

        Self {
            state: RwLock::new(state),
            provider,
            dir: index.dir.clone(),
            max_input_chars: embedding.max_input_chars,
            computed: Mutex::new(HashMap::new()),
        }
    }

    /// Embedding of the article's title and content, computed once per run.
    pub async fn embed_article(&self, article: &Article) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(v) = self.cached(&article.id) {
            return Ok(v);
        }
        let vector = self
            .provider
            .embed(&article.embedding_text(self.max_input_chars))
            .await?;
        self.computed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(article.id.clone(), vector.clone());
        Ok(vector)
    }

    fn cached(&self, article_id: &str) -> Option<Vec<f32>> {
        self.computed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(article_id)
            .cloned()
    }

    /// Add an article with a precomputed vector.
    #[instrument(level = "debug", skip_all, fields(article_id = %article.id))]
    pub async fn add(&self, article: &Article, vector: Vec<f32>) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        state.insert(ArticleMetadata::from(article), vector)?;
        debug!(vectors = state.vector_count(), "Article indexed");
        Ok(())
    }

    /// Embed and add an article. A provider failure leaves the index untouched.
    pub async fn index_article(&self, article: &Article) -> Result<(), IndexError> {
        let vector = self.embed_article(article).await?;
        self.add(article, vector).await
    }

    /// Write the index and metadata to disk.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn persist(&self) -> Result<(), IndexError> {
        let state = self.state.write().await;
        state.save(&self.dir).await?;
        info!(vectors = state.vector_count(), "Index saved");
        Ok(())
    }

    /// Prior articles similar to `article`, best first.
    ///
    /// An empty index returns an empty result without calling the provider.
    #[instrument(level = "info", skip_all, fields(article_id = %article.id, top_k = top_k, threshold = threshold))]
    pub async fn search_similar_articles(
        &self,
        article: &Article,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarArticle>, IndexError> {
        if top_k == 0 || self.state.read().await.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embed_article(article).await?;
        self.search_by_vector(&query, top_k, threshold).await
    }

    /// Nearest indexed articles to a precomputed query vector.
    ///
    /// # Arguments
    ///
    /// * `query` - Vector of the index dimension
    /// * `top_k` - Maximum number of results
    /// * `threshold` - Minimum similarity for a result to be returned
    ///
    /// # Returns
    ///
    /// Matches ordered by descending similarity, or [`IndexError::Dimension`]
    /// when `query` has the wrong length.
    pub async fn search_by_vector(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarArticle>, IndexError> {
        let state = self.state.read().await;
        if top_k == 0 || state.is_empty() {
            return Ok(Vec::new());
        }
        let hits = state.search(query, top_k, threshold)?;
        debug!(hits = hits.len(), "Similarity search finished");
        Ok(hits
            .into_iter()
            .map(|(metadata, similarity)| SimilarArticle {
                metadata,
                similarity,
            })
            .collect())
    }

    /// Counts, parity and on-disk presence of the index files.
    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            vector_count: state.vector_count(),
            metadata_count: state.metadata_count(),
            consistent: state.is_consistent(),
            dimension: state.dimension(),
            index_dir: self.dir.clone(),
            index_file_exists: ArticleIndex::index_path(&self.dir).exists(),
            metadata_file_exists: ArticleIndex::metadata_path(&self.dir).exists(),
        }
    }

    /// Whether `article_id` already has a row in the index.
    pub async fn contains(&self, article_id: &str) -> bool {
        self.state.read().await.contains(article_id)
    }
}
