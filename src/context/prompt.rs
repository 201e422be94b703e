//! Prompts for relationship classification and title translation, and parsing
//! of the classifier's JSON reply.

use crate::models::{Article, Decision, SimilarArticle};
use crate::utils::{looks_truncated, truncate_chars};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Write as _;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You are the editor of a daily AI news newsletter. \
You decide how a new article relates to articles the newsletter already published.

Answer with exactly one of:
- SKIP: the new article reports the same story with no meaningful new information.
- UPDATE: the new article is a follow-up or development of a previously published story.
- KEEP: the new article is an independent story.

Prefer KEEP or UPDATE when unsure; skipping removes a story from the newsletter.

Respond with a single JSON object and nothing else:
{\"decision\": \"SKIP|UPDATE|KEEP\", \"reasoning\": \"one or two sentences\", \"contextual_summary\": \"for UPDATE only: what is new compared to the earlier coverage\"}";

pub fn translation_system_prompt(language: &str) -> String {
    format!(
        "Translate the news headline you are given into {language}. \
         Reply with the translated headline only, without quotes or commentary."
    )
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// User prompt describing the new article and its nearest prior articles.
pub fn classifier_user_prompt(article: &Article, similar: &[SimilarArticle], max_content_chars: usize) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "## New article");
    let _ = writeln!(prompt, "Title: {}", article.title);
    let _ = writeln!(prompt, "Published: {}", format_date(article.published_date));
    if let Some(summary) = article.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(prompt, "Summary:\n{}", summary.trim());
    }
    let _ = writeln!(
        prompt,
        "Content:\n{}",
        truncate_chars(article.content.trim(), max_content_chars)
    );

    let _ = writeln!(prompt, "\n## Previously published articles");
    for (i, hit) in similar.iter().enumerate() {
        let m = &hit.metadata;
        let _ = writeln!(prompt, "{}. {}", i + 1, m.title);
        let _ = writeln!(prompt, "   Published: {}", format_date(m.published_date));
        let _ = writeln!(prompt, "   Similarity: {:.1}%", hit.similarity * 100.0);
        if !m.content_summary.trim().is_empty() {
            let _ = writeln!(prompt, "   Summary: {}", m.content_summary.trim());
        }
    }
    prompt
}

/// Classifier answer after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub decision: Decision,
    pub reasoning: String,
    pub contextual_summary: Option<String>,
}

#[derive(Deserialize)]
struct RawVerdict {
    decision: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    contextual_summary: Option<String>,
}

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex"));

/// Locate the JSON object in a model reply: a fenced block if present,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(m) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse the classifier reply. The error is a short reason for logging and
/// for the KEEP reasoning string.
pub fn parse_verdict(text: &str) -> Result<ModelVerdict, String> {
    let block = extract_json_block(text).ok_or_else(|| "no JSON object in response".to_string())?;
    let raw: RawVerdict = serde_json::from_str(block).map_err(|e| {
        if looks_truncated(&e) {
            format!("truncated JSON ({e})")
        } else {
            format!("invalid JSON ({e})")
        }
    })?;
    let decision = raw
        .decision
        .as_deref()
        .ok_or_else(|| "missing decision".to_string())
        .and_then(|d| Decision::parse_loose(d).ok_or_else(|| format!("unknown decision {d:?}")))?;

    Ok(ModelVerdict {
        decision,
        reasoning: raw.reasoning.unwrap_or_default().trim().to_string(),
        contextual_summary: raw
            .contextual_summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{article, metadata};

    #[test]
    fn test_extract_fenced_block() {
        let text = "Sure!\n```json\n{\"decision\": \"KEEP\"}\n```\nthanks";
        assert_eq!(extract_json_block(text), Some("{\"decision\": \"KEEP\"}"));
    }

    #[test]
    fn test_extract_bare_object() {
        let text = "Here: {\"decision\": \"UPDATE\", \"reasoning\": \"{nested}\"} done";
        assert_eq!(
            extract_json_block(text),
            Some("{\"decision\": \"UPDATE\", \"reasoning\": \"{nested}\"}")
        );
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("} backwards {"), None);
    }

    #[test]
    fn test_parse_verdict_full() {
        let v = parse_verdict(
            r#"{"decision":"update","reasoning":" follow-up ","contextual_summary":"Now GA."}"#,
        )
        .unwrap();
        assert_eq!(v.decision, Decision::Update);
        assert_eq!(v.reasoning, "follow-up");
        assert_eq!(v.contextual_summary.as_deref(), Some("Now GA."));
    }

    #[test]
    fn test_parse_verdict_failures() {
        assert!(parse_verdict("I think this is new.").unwrap_err().contains("no JSON"));
        assert!(parse_verdict(r#"{"reasoning":"x"}"#).unwrap_err().contains("missing decision"));
        assert!(parse_verdict(r#"{"decision":"MAYBE"}"#).unwrap_err().contains("unknown decision"));
        assert!(parse_verdict(r#"{"decision": 3}"#).unwrap_err().contains("invalid JSON"));
    }

    #[test]
    fn test_empty_contextual_summary_is_dropped() {
        let v = parse_verdict(r#"{"decision":"KEEP","contextual_summary":"  "}"#).unwrap();
        assert_eq!(v.contextual_summary, None);
        assert_eq!(v.reasoning, "");
    }

    #[test]
    fn test_user_prompt_lists_prior_articles() {
        let similar = vec![SimilarArticle {
            metadata: metadata("p1", "OpenAI launches GPT-5"),
            similarity: 0.873,
        }];
        let prompt = classifier_user_prompt(&article("n1", "GPT-5 now generally available"), &similar, 100);
        assert!(prompt.contains("Title: GPT-5 now generally available"));
        assert!(prompt.contains("1. OpenAI launches GPT-5"));
        assert!(prompt.contains("Similarity: 87.3%"));
        assert!(prompt.contains("Published: unknown"));
    }
}
