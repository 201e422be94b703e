//! Reference objects shown next to an analyzed article.
//!
//! A reference always carries a usable link. The stored URL fields are tried
//! first; when all are empty a search link is synthesised from the title, and
//! as a last resort an in-page anchor is used.

use crate::config::Script;
use crate::models::{ArticleMetadata, ArticleReference, SimilarArticle};
use crate::utils::slugify_title;
use itertools::Itertools;
use url::Url;

fn is_http_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// First non-empty stored URL, or a synthesised fallback.
pub fn resolve_reference_url(metadata: &ArticleMetadata) -> String {
    let candidates = [
        Some(metadata.url.as_str()),
        metadata.canonical_url.as_deref(),
        Some(metadata.article_id.as_str()).filter(|id| is_http_url(id)),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback_url(&metadata.source_id, &metadata.title, &metadata.article_id))
}

/// Search link built from the title slug, chosen by the source id.
pub fn fallback_url(source_id: &str, title: &str, article_id: &str) -> String {
    let slug = slugify_title(title);
    if slug.is_empty() {
        let anchor = slugify_title(article_id);
        return format!("#article-{}", if anchor.is_empty() { "unknown" } else { anchor.as_str() });
    }
    let query = urlencoding::encode(&slug.replace('-', " ")).into_owned();
    let source = source_id.to_lowercase();
    if source.contains("youtube") {
        format!("https://www.youtube.com/results?search_query={query}")
    } else if source.contains("arxiv") {
        format!("https://arxiv.org/search/?query={query}&searchtype=all")
    } else if source.contains("github") {
        format!("https://github.com/search?q={query}")
    } else {
        format!("https://duckduckgo.com/?q={query}")
    }
}

/// References for the first `max` distinct prior articles.
pub fn build_references(similar: &[SimilarArticle], max: usize) -> Vec<ArticleReference> {
    similar
        .iter()
        .unique_by(|hit| hit.metadata.article_id.clone())
        .take(max)
        .map(|hit| ArticleReference {
            article_id: hit.metadata.article_id.clone(),
            title: hit.metadata.title.clone(),
            translated_title: None,
            url: resolve_reference_url(&hit.metadata),
            published_date: hit.metadata.published_date,
            similarity: hit.similarity,
        })
        .collect()
}

/// Share of alphabetic characters in `text` that belong to `script`.
///
/// Text with no alphabetic characters counts as fully in script.
pub fn script_ratio(text: &str, script: Script) -> f32 {
    let (total, matching) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(total, matching), c| {
            (total + 1, matching + usize::from(script.contains(c)))
        });
    if total == 0 {
        1.0
    } else {
        matching as f32 / total as f32
    }
}
