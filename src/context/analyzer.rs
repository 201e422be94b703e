//! Relationship classification of new articles against published history.
//!
//! ```text
//! SEARCH ──no hits──> KEEP (no_history)
//!   │
//!   └─hits─> CLASSIFY ──all models failed──> FALLBACK_HEURISTIC
//!              │
//!              └─reply─> parse ──unparseable──> KEEP
//!                          │
//!                          └─> VALIDATE (SKIP override) ──> result
//! ```
//!
//! Any error or panic along the way yields KEEP. Failures never suppress a
//! story.

use super::prompt::{
    CLASSIFIER_SYSTEM_PROMPT, ModelVerdict, classifier_user_prompt, parse_verdict,
    translation_system_prompt,
};
use super::references::{build_references, script_ratio};
use crate::api::ModelPool;
use crate::config::{AnalysisConfig, TranslationConfig};
use crate::embeddings::EmbeddingManager;
use crate::error::AnalyzerError;
use crate::models::{AnalysisOrigin, Article, ArticleReference, ContextAnalysis, Decision, SimilarArticle};
use crate::utils::truncate_for_log;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const NO_SIMILAR_REASONING: &str = "No similar prior article found";
pub const ERROR_REASONING: &str = "Context analysis failed; keeping article";
pub const PARSE_FAILURE_PREFIX: &str = "Failed to parse model response";

/// Decision taken when every model is unavailable.
///
/// Pure function of the top similarity: SKIP strictly above
/// `skip_threshold`, UPDATE strictly above `fallback_update_threshold`,
/// KEEP otherwise.
pub fn fallback_decision(max_similarity: f32, config: &AnalysisConfig) -> Decision {
    if max_similarity > config.skip_threshold {
        Decision::Skip
    } else if max_similarity > config.fallback_update_threshold {
        Decision::Update
    } else {
        Decision::Keep
    }
}

/// Replacement for a model SKIP that is not backed by near-identical
/// similarity. `None` means the SKIP stands.
pub fn skip_override(max_similarity: f32, config: &AnalysisConfig) -> Option<Decision> {
    if max_similarity >= config.skip_threshold {
        None
    } else if max_similarity > config.update_override_floor {
        Some(Decision::Update)
    } else {
        Some(Decision::Keep)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

struct Classified {
    decision: Decision,
    reasoning: String,
    contextual_summary: Option<String>,
    origin: AnalysisOrigin,
}

/// Classifies new articles against the index with an ordered model pool.
///
/// Cheap to share behind an `Arc`; all state is read-only apart from the
/// manager, which guards itself.
pub struct ContextAnalyzer {
    manager: Option<Arc<EmbeddingManager>>,
    models: ModelPool,
    config: AnalysisConfig,
}

impl ContextAnalyzer {
    /// `manager` may be absent, in which case every article is new.
    pub fn new(manager: Option<Arc<EmbeddingManager>>, models: ModelPool, config: AnalysisConfig) -> Self {
        Self {
            manager,
            models,
            config,
        }
    }

    /// Decide how `article` relates to previously published coverage.
    ///
    /// Never fails and never panics; any internal failure yields KEEP.
    #[instrument(level = "info", skip_all, fields(article_id = %article.id))]
    pub async fn analyze_context(&self, article: &Article) -> ContextAnalysis {
        let outcome = AssertUnwindSafe(self.try_analyze(article)).catch_unwind().await;
        let err = match outcome {
            Ok(Ok(analysis)) => {
                info!(
                    decision = %analysis.decision,
                    similarity = analysis.similarity_score,
                    origin = ?analysis.origin,
                    references = analysis.references.len(),
                    "Context analysis complete"
                );
                return analysis;
            }
            Ok(Err(e)) => e,
            Err(panic) => AnalyzerError::Panicked(panic_message(panic.as_ref())),
        };
        error!(error = %err, "Context analysis failed; defaulting to KEEP");
        ContextAnalysis::keep(ERROR_REASONING, AnalysisOrigin::Error)
    }

    async fn try_analyze(&self, article: &Article) -> Result<ContextAnalysis, AnalyzerError> {
        let similar = match &self.manager {
            Some(manager) => {
                manager
                    .search_similar_articles(article, self.config.top_k, self.config.similarity_floor)
                    .await?
            }
            None => {
                debug!("No embedding manager; treating article as new");
                Vec::new()
            }
        };

        let Some(max_similarity) = similar.iter().map(|s| s.similarity).reduce(f32::max) else {
            return Ok(ContextAnalysis::keep(NO_SIMILAR_REASONING, AnalysisOrigin::NoHistory));
        };

        let classified = self.classify(article, &similar, max_similarity).await;
        let mut references = build_references(&similar, self.config.max_references);
        match &self.config.translation {
            Some(_) if classified.origin == AnalysisOrigin::HeuristicFallback => {
                debug!("Models unavailable; leaving reference titles untranslated");
            }
            Some(translation) => self.translate_titles(&mut references, translation).await,
            None => {}
        }

        let contextual_summary = match classified.decision {
            Decision::Update => classified.contextual_summary.or_else(|| {
                references
                    .first()
                    .map(|r| format!("Follow-up to earlier coverage: \"{}\"", r.title))
            }),
            Decision::Skip | Decision::Keep => None,
        };

        Ok(ContextAnalysis {
            decision: classified.decision,
            reasoning: classified.reasoning,
            contextual_summary,
            references,
            similarity_score: max_similarity,
            origin: classified.origin,
        })
    }

    async fn classify(&self, article: &Article, similar: &[SimilarArticle], max_similarity: f32) -> Classified {
        let user_prompt = classifier_user_prompt(article, similar, self.config.max_prompt_content_chars);

        let (model, reply) = match self
            .models
            .generate_with_fallback(CLASSIFIER_SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                let decision = fallback_decision(max_similarity, &self.config);
                warn!(error = %e, %decision, max_similarity, "Models unavailable; using similarity heuristic");
                return Classified {
                    decision,
                    reasoning: format!(
                        "Language models unavailable; decided {decision} from similarity {:.3}",
                        max_similarity
                    ),
                    contextual_summary: None,
                    origin: AnalysisOrigin::HeuristicFallback,
                };
            }
        };

        match parse_verdict(&reply) {
            Ok(verdict) => self.validate(verdict, max_similarity),
            Err(reason) => {
                warn!(
                    %model,
                    %reason,
                    response_preview = %truncate_for_log(&reply, 300),
                    "Model returned non-conforming JSON; keeping article"
                );
                Classified {
                    decision: Decision::Keep,
                    reasoning: format!("{PARSE_FAILURE_PREFIX}: {reason}"),
                    contextual_summary: None,
                    origin: AnalysisOrigin::Model,
                }
            }
        }
    }

    fn validate(&self, verdict: ModelVerdict, max_similarity: f32) -> Classified {
        if verdict.decision == Decision::Skip {
            if let Some(replacement) = skip_override(max_similarity, &self.config) {
                info!(%replacement, max_similarity, "Overriding model SKIP");
                return Classified {
                    decision: replacement,
                    reasoning: format!(
                        "Model proposed SKIP but top similarity {:.3} is below {:.3}; treated as {}. Model reasoning: {}",
                        max_similarity, self.config.skip_threshold, replacement, verdict.reasoning
                    ),
                    contextual_summary: verdict.contextual_summary,
                    origin: AnalysisOrigin::ModelOverride,
                };
            }
        }
        Classified {
            decision: verdict.decision,
            reasoning: verdict.reasoning,
            contextual_summary: verdict.contextual_summary,
            origin: AnalysisOrigin::Model,
        }
    }

    async fn translate_titles(&self, references: &mut [ArticleReference], translation: &TranslationConfig) {
        let system_prompt = translation_system_prompt(&translation.language);
        for reference in references.iter_mut() {
            if script_ratio(&reference.title, translation.script) >= translation.min_script_ratio {
                continue;
            }
            match self.models.generate_with_fallback(&system_prompt, &reference.title).await {
                Ok((_, text)) => {
                    let translated = text.trim().trim_matches('"').trim().to_string();
                    if !translated.is_empty() {
                        reference.translated_title = Some(translated);
                    }
                }
                Err(e) => warn!(article_id = %reference.article_id, error = %e, "Title translation failed"),
            }
        }
    }
}
