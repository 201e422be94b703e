//! Batch steps of the `analyze` command.
//!
//! [`analyze_batch`] fans the articles out over the analyzer with bounded
//! concurrency and returns the results in input order. [`index_accepted`]
//! then adds every article that will be published to the index and persists
//! it once.

use crate::context::ContextAnalyzer;
use crate::embeddings::EmbeddingManager;
use crate::models::{AnalyzedArticle, Article, Decision};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Analyze `articles` with at most `concurrency` analyses in flight.
///
/// # Arguments
///
/// * `analyzer` - Shared analyzer; each task holds a clone of the `Arc`
/// * `articles` - The batch, in collection order
/// * `concurrency` - Upper bound on concurrent analyses (at least 1)
///
/// # Returns
///
/// One `(input_index, result)` pair per article, sorted by `input_index`.
#[instrument(level = "info", skip_all, fields(count = articles.len(), concurrency = concurrency))]
pub async fn analyze_batch(
    analyzer: Arc<ContextAnalyzer>,
    articles: &[Article],
    concurrency: usize,
) -> Vec<(usize, AnalyzedArticle)> {
    let mut results: Vec<(usize, AnalyzedArticle)> = stream::iter(articles.iter().enumerate())
        .map(|(i, article)| {
            let analyzer = Arc::clone(&analyzer);
            async move {
                debug!(index = i, source = %article.source_id, "Analyzing article");
                let analysis = analyzer.analyze_context(article).await;
                (
                    i,
                    AnalyzedArticle {
                        article_id: article.id.clone(),
                        title: article.title.clone(),
                        analysis,
                    },
                )
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(i, _)| *i);
    results
}

/// Add every non-SKIP article to the index, then persist once.
///
/// Individual embedding failures are logged and skipped. Nothing is written
/// when no article was added.
///
/// # Arguments
///
/// * `manager` - Index to extend
/// * `articles` - The batch passed to [`analyze_batch`]
/// * `results` - Its output; indices refer to `articles`
///
/// # Returns
///
/// The number of articles added to the index.
#[instrument(level = "info", skip_all, fields(results = results.len()))]
pub async fn index_accepted(
    manager: &EmbeddingManager,
    articles: &[Article],
    results: &[(usize, AnalyzedArticle)],
) -> usize {
    let mut indexed = 0;
    for (i, result) in results {
        if result.analysis.decision == Decision::Skip {
            continue;
        }
        let Some(article) = articles.get(*i) else {
            warn!(index = i, article_id = %result.article_id, "Result has no matching article");
            continue;
        };
        if manager.contains(&article.id).await {
            debug!(article_id = %article.id, "Replacing existing index entry");
        }
        match manager.index_article(article).await {
            Ok(()) => indexed += 1,
            Err(e) => warn!(article_id = %result.article_id, error = %e, "Failed to index article"),
        }
    }

    if indexed > 0 {
        if let Err(e) = manager.persist().await {
            error!(error = %e, "Failed to persist index; this run's articles will not be remembered");
        }
    }
    info!(indexed, "Indexing finished");
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatModel, ModelPool};
    use crate::config::{AnalysisConfig, EmbeddingConfig, IndexConfig};
    use crate::embeddings::index::INDEX_FILE;
    use crate::testing::{KeywordEmbedder, ScriptedModel, article};
    use std::path::Path;

    fn configs(dir: &Path) -> (EmbeddingConfig, IndexConfig) {
        (
            EmbeddingConfig {
                dimension: KeywordEmbedder::DIMENSION,
                ..EmbeddingConfig::default()
            },
            IndexConfig {
                dir: dir.to_path_buf(),
            },
        )
    }

    /// Manager seeded with one published article "prior"; "dup" sits right on
    /// top of it, keyword titles land far away.
    async fn seeded_manager(dir: &Path) -> Arc<EmbeddingManager> {
        let embedder = Arc::new(
            KeywordEmbedder::new()
                .with_vector("prior", KeywordEmbedder::vector_at(1.0))
                .with_vector("dup", KeywordEmbedder::vector_at(0.9995)),
        );
        let (embedding, index) = configs(dir);
        let manager = Arc::new(EmbeddingManager::load(&embedding, &index, embedder).await);
        manager.index_article(&article("p1", "prior")).await.unwrap();
        manager
    }

    fn skipping_analyzer(manager: &Arc<EmbeddingManager>) -> Arc<ContextAnalyzer> {
        let model: Arc<dyn ChatModel> =
            Arc::new(ScriptedModel::new("primary", r#"{"decision":"SKIP","reasoning":"same story"}"#));
        Arc::new(ContextAnalyzer::new(
            Some(Arc::clone(manager)),
            ModelPool::new(vec![model]),
            AnalysisConfig::default(),
        ))
    }

    fn batch() -> Vec<Article> {
        vec![
            article("n1", "anthropic funding"),
            article("d1", "dup"),
            article("n2", "gemini release"),
            article("n3", "google launch"),
            article("d2", "dup"),
        ]
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = seeded_manager(dir.path()).await;
        let articles = batch();

        let results = analyze_batch(skipping_analyzer(&manager), &articles, 4).await;
        let ids: Vec<_> = results.iter().map(|(_, r)| r.article_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "d1", "n2", "n3", "d2"]);
        assert!(results.iter().enumerate().all(|(pos, (i, _))| pos == *i));

        let decisions: Vec<_> = results.iter().map(|(_, r)| r.analysis.decision).collect();
        assert_eq!(
            decisions,
            vec![Decision::Keep, Decision::Skip, Decision::Keep, Decision::Keep, Decision::Skip]
        );
    }

    #[tokio::test]
    async fn test_only_non_skip_articles_are_indexed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = seeded_manager(dir.path()).await;
        let articles = batch();

        let results = analyze_batch(skipping_analyzer(&manager), &articles, 2).await;
        let indexed = index_accepted(&manager, &articles, &results).await;
        assert_eq!(indexed, 3);

        for id in ["n1", "n2", "n3"] {
            assert!(manager.contains(id).await, "{id} should be indexed");
        }
        assert!(!manager.contains("d1").await);
        assert!(!manager.contains("d2").await);

        let (embedding, index) = configs(dir.path());
        let reloaded = EmbeddingManager::load(&embedding, &index, Arc::new(KeywordEmbedder::new())).await;
        let stats = reloaded.stats().await;
        assert_eq!((stats.vector_count, stats.metadata_count), (4, 4));
    }

    #[tokio::test]
    async fn test_all_skipped_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = seeded_manager(dir.path()).await;
        let articles = vec![article("d1", "dup"), article("d2", "dup")];

        let results = analyze_batch(skipping_analyzer(&manager), &articles, 2).await;
        assert_eq!(index_accepted(&manager, &articles, &results).await, 0);
        assert!(!dir.path().join(INDEX_FILE).exists());
        assert_eq!(manager.stats().await.vector_count, 1);
    }

    #[tokio::test]
    async fn test_analysis_alone_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let manager = seeded_manager(dir.path()).await;
        let articles = batch();

        let results = analyze_batch(skipping_analyzer(&manager), &articles, 3).await;
        assert_eq!(results.len(), articles.len());
        let stats = manager.stats().await;
        assert_eq!((stats.vector_count, stats.metadata_count), (1, 1));
        assert!(!stats.index_file_exists);
    }

    #[tokio::test]
    async fn test_concurrent_analysis_and_indexing_keep_parity() {
        let dir = tempfile::tempdir().unwrap();
        let manager = seeded_manager(dir.path()).await;
        let analyzer = skipping_analyzer(&manager);
        let queries: Vec<Article> = (0..16)
            .map(|i| article(&format!("q{i}"), if i % 2 == 0 { "dup" } else { "openai model" }))
            .collect();
        let additions: Vec<Article> = (0..8)
            .map(|i| article(&format!("w{i}"), "google gemini release"))
            .collect();

        let analyses = futures::future::join_all(queries.iter().map(|a| analyzer.analyze_context(a)));
        let writes = async {
            for a in &additions {
                manager.index_article(a).await.unwrap();
                manager.persist().await.unwrap();
            }
        };
        let (results, ()) = tokio::join!(analyses, writes);

        assert_eq!(results.len(), queries.len());
        let stats = manager.stats().await;
        assert_eq!(stats.vector_count, 1 + additions.len());
        assert_eq!(stats.vector_count, stats.metadata_count);
        assert!(stats.consistent);

        let (embedding, index) = configs(dir.path());
        let reloaded = EmbeddingManager::load(&embedding, &index, Arc::new(KeywordEmbedder::new())).await;
        assert_eq!(reloaded.stats().await.vector_count, 1 + additions.len());
    }
}
