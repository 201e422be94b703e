//! YAML configuration for the context pipeline.
//!
//! Every section has serde defaults, so an empty file (or no file at all) yields
//! a usable configuration. The values are handed to each component's constructor;
//! nothing reads configuration implicitly.
//!
//! ```yaml
//! embedding:
//!   model: text-embedding-3-small
//!   dimension: 1536
//! llm:
//!   primary_model: gpt-4o-mini
//!   fallback_models: [gpt-4.1-mini, gpt-3.5-turbo]
//! analysis:
//!   skip_threshold: 0.998
//!   fallback_update_threshold: 0.92
//!   update_override_floor: 0.75
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Length of every vector the provider returns and the index stores.
    pub dimension: usize,
    /// Title and content are truncated to this many characters before embedding.
    pub max_input_chars: usize,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            max_input_chars: 8000,
            max_retries: 3,
        }
    }
}

/// OpenAI-compatible chat endpoint and the ordered model fallback list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    /// Retries against the same model before moving to the next one.
    pub max_retries: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            primary_model: "gpt-4o-mini".to_string(),
            fallback_models: vec!["gpt-4.1-mini".to_string()],
            max_retries: 1,
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

impl LlmConfig {
    /// Primary model followed by the fallbacks, in the order they are tried.
    pub fn models(&self) -> Vec<String> {
        std::iter::once(self.primary_model.clone())
            .chain(self.fallback_models.iter().cloned())
            .filter(|m| !m.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding `index.json` and `metadata.json`.
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/embeddings"),
        }
    }
}

/// Similarity thresholds and reference construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub top_k: usize,
    /// Minimum similarity for a prior article to count as related.
    pub similarity_floor: f32,
    /// A model SKIP is honored only at or above this similarity; the heuristic
    /// fallback skips strictly above it.
    pub skip_threshold: f32,
    /// Heuristic fallback: UPDATE strictly above this, KEEP at or below.
    pub fallback_update_threshold: f32,
    /// An overridden SKIP becomes UPDATE strictly above this, KEEP otherwise.
    pub update_override_floor: f32,
    pub max_references: usize,
    /// Article content is cut to this many characters inside the prompt.
    pub max_prompt_content_chars: usize,
    pub translation: Option<TranslationConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_floor: 0.3,
            skip_threshold: 0.998,
            fallback_update_threshold: 0.92,
            update_override_floor: 0.75,
            max_references: 3,
            max_prompt_content_chars: 2000,
            translation: None,
        }
    }
}

/// Display-language settings for reference titles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Human-readable language name used in the translation prompt.
    pub language: String,
    pub script: Script,
    /// Titles whose share of `script` letters is below this get translated.
    #[serde(default = "default_min_script_ratio")]
    pub min_script_ratio: f32,
}

fn default_min_script_ratio() -> f32 {
    0.5
}

/// Writing systems recognised by the translated-title heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Hangul,
    Han,
    Kana,
    Cyrillic,
}

impl Script {
    /// Whether `c` is a letter of this script.
    pub fn contains(self, c: char) -> bool {
        match self {
            Script::Latin => c.is_ascii_alphabetic() || matches!(c, '\u{00C0}'..='\u{024F}'),
            Script::Hangul => matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}'),
            Script::Han => matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}'),
            Script::Kana => matches!(c, '\u{3040}'..='\u{30FF}'),
            Script::Cyrillic => matches!(c, '\u{0400}'..='\u{04FF}'),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on analyses in flight at once.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

impl AppConfig {
    /// Parse and validate a YAML configuration file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let display = path.as_ref().display().to_string();
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: AppConfig = if raw.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
                path: display,
                source,
            })?
        };
        config.validate()?;
        info!("Loaded configuration");
        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            warn!(path = %path.as_ref().display(), "Config file not found; using defaults");
            return Ok(AppConfig::default());
        }
        Self::load(path)
    }

    /// Reject thresholds outside `[0, 1]`, UPDATE thresholds above the SKIP
    /// threshold, and zero sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        for (name, value) in [
            ("similarity_floor", a.similarity_floor),
            ("skip_threshold", a.skip_threshold),
            ("fallback_update_threshold", a.fallback_update_threshold),
            ("update_override_floor", a.update_override_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "analysis.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if a.fallback_update_threshold > a.skip_threshold || a.update_override_floor > a.skip_threshold {
            return Err(ConfigError::Invalid(
                "UPDATE thresholds must not exceed analysis.skip_threshold".to_string(),
            ));
        }
        if a.top_k == 0 {
            return Err(ConfigError::Invalid("analysis.top_k must be at least 1".to_string()));
        }
        if !(1..=3).contains(&a.max_references) {
            return Err(ConfigError::Invalid(
                "analysis.max_references must be between 1 and 3".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be positive".to_string()));
        }
        if self.llm.models().is_empty() {
            return Err(ConfigError::Invalid("llm.primary_model must be set".to_string()));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.analysis.skip_threshold, 0.998);
        assert_eq!(config.analysis.fallback_update_threshold, 0.92);
        assert_eq!(config.analysis.update_override_floor, 0.75);
        assert_eq!(config.analysis.max_references, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "llm:\n  primary_model: model-a\n  fallback_models: [model-b, model-c]\nanalysis:\n  top_k: 7\n"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.llm.models(), vec!["model-a", "model-b", "model-c"]);
        assert_eq!(config.analysis.top_k, 7);
        assert_eq!(config.analysis.similarity_floor, 0.3);
        assert_eq!(config.embedding.dimension, 1536);
    }

    #[test]
    fn test_translation_section() {
        let yaml = "analysis:\n  translation:\n    language: Korean\n    script: hangul\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        let translation = config.analysis.translation.unwrap();
        assert_eq!(translation.script, Script::Hangul);
        assert_eq!(translation.min_script_ratio, 0.5);
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = AppConfig::default();
        config.analysis.skip_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.fallback_update_threshold = 0.999;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.pipeline.max_concurrency, 8);
    }

    #[test]
    fn test_script_membership() {
        assert!(Script::Hangul.contains('한'));
        assert!(!Script::Hangul.contains('a'));
        assert!(Script::Latin.contains('é'));
        assert!(Script::Cyrillic.contains('Ж'));
    }
}
