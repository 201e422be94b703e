//! Data models for articles, similarity results and context decisions.
//!
//! - [`Article`]: a summarized article as produced upstream
//! - [`ArticleMetadata`]: the denormalized record stored next to each vector
//! - [`SimilarArticle`]: one similarity search hit
//! - [`ContextAnalysis`]: the SKIP / UPDATE / KEEP verdict with references
//! - [`ContextReport`]: everything a single run produced

use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A summarized article handed to the context pipeline.
///
/// Articles are immutable once summarized and are referred to by `id`
/// afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    pub source_id: String,
    /// Short bullet-point summary.
    #[serde(default)]
    pub summary: Option<String>,
}

impl Article {
    /// Text sent to the embedding provider: title, blank line, content.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let combined = format!("{}\n\n{}", self.title, self.content);
        truncate_chars(&combined, max_chars).to_string()
    }

    /// The summary if present, otherwise the head of the content.
    pub fn summary_or_excerpt(&self, max_chars: usize) -> String {
        match self.summary.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => truncate_chars(self.content.trim(), max_chars).to_string(),
        }
    }
}

const METADATA_SUMMARY_CHARS: usize = 500;

/// Metadata stored alongside each indexed vector so search hits need no
/// secondary lookup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleMetadata {
    pub article_id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    pub source_id: String,
    #[serde(default)]
    pub content_summary: String,
}

impl From<&Article> for ArticleMetadata {
    fn from(article: &Article) -> Self {
        Self {
            article_id: article.id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            canonical_url: article.canonical_url.clone(),
            published_date: article.published_date,
            source_id: article.source_id.clone(),
            content_summary: article.summary_or_excerpt(METADATA_SUMMARY_CHARS),
        }
    }
}

/// One nearest-neighbor hit. `similarity` is in `[0, 1]`.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarArticle {
    pub metadata: ArticleMetadata,
    pub similarity: f32,
}

/// Relationship of a new article to previously published coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// Duplicate; not published.
    Skip,
    /// Follow-up; published with a link to the earlier story.
    Update,
    /// Independent story.
    Keep,
}

impl Decision {
    /// Case-insensitive parse of a model-provided decision string.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SKIP" => Some(Decision::Skip),
            "UPDATE" => Some(Decision::Update),
            "KEEP" => Some(Decision::Keep),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Skip => "SKIP",
            Decision::Update => "UPDATE",
            Decision::Keep => "KEEP",
        };
        f.write_str(s)
    }
}

/// Which branch of the analysis produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOrigin {
    NoHistory,
    Model,
    ModelOverride,
    HeuristicFallback,
    Error,
}

/// A prior article cited by an analysis. `url` is never empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleReference {
    pub article_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    pub url: String,
    pub published_date: Option<DateTime<Utc>>,
    pub similarity: f32,
}

/// Verdict for one article.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextAnalysis {
    pub decision: Decision,
    pub reasoning: String,
    /// Present only for [`Decision::Update`].
    pub contextual_summary: Option<String>,
    pub references: Vec<ArticleReference>,
    /// Similarity of the closest prior article, `0.0` when none.
    pub similarity_score: f32,
    pub origin: AnalysisOrigin,
}

impl ContextAnalysis {
    /// KEEP with no references and a similarity score of `0.0`.
    pub fn keep(reasoning: impl Into<String>, origin: AnalysisOrigin) -> Self {
        Self {
            decision: Decision::Keep,
            reasoning: reasoning.into(),
            contextual_summary: None,
            references: Vec::new(),
            similarity_score: 0.0,
            origin,
        }
    }

    /// Edge from the closest prior article to `child_id`, for UPDATE results.
    pub fn relationship(&self, child_id: &str) -> Option<RelationshipEdge> {
        if self.decision != Decision::Update {
            return None;
        }
        self.references.first().map(|parent| RelationshipEdge {
            parent_id: parent.article_id.clone(),
            child_id: child_id.to_string(),
            relationship: RelationshipKind::Update,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Update,
}

/// Parent → child link implied by an UPDATE decision.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelationshipEdge {
    pub parent_id: String,
    pub child_id: String,
    pub relationship: RelationshipKind,
}

/// An analyzed article as recorded in the run report.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzedArticle {
    pub article_id: String,
    pub title: String,
    pub analysis: ContextAnalysis,
}

/// Output of one `analyze` run.
#[derive(Debug, Deserialize, Serialize)]
pub struct ContextReport {
    pub generated_at: DateTime<Utc>,
    pub kept: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Articles added to the index during this run.
    pub indexed: usize,
    pub articles: Vec<AnalyzedArticle>,
    pub relationships: Vec<RelationshipEdge>,
}

impl ContextReport {
    /// Report with per-decision counts and UPDATE edges derived from `articles`.
    ///
    /// `indexed` starts at zero; the caller fills it in after indexing.
    pub fn new(generated_at: DateTime<Utc>, articles: Vec<AnalyzedArticle>) -> Self {
        let count = |d: Decision| articles.iter().filter(|a| a.analysis.decision == d).count();
        let relationships = articles
            .iter()
            .filter_map(|a| a.analysis.relationship(&a.article_id))
            .collect();
        Self {
            generated_at,
            kept: count(Decision::Keep),
            updated: count(Decision::Update),
            skipped: count(Decision::Skip),
            indexed: 0,
            articles,
            relationships,
        }
    }
}
