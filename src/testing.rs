//! Deterministic providers and fixtures shared by unit tests.

use crate::api::ChatModel;
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbeddingError, LlmError};
use crate::models::{Article, ArticleMetadata};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn article(id: &str, title: &str) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        content: String::new(),
        url: format!("https://news.example.com/{id}"),
        canonical_url: None,
        published_date: None,
        source_id: "rss_example".to_string(),
        summary: Some(format!("- {title}")),
    }
}

pub fn metadata(id: &str, title: &str) -> ArticleMetadata {
    ArticleMetadata::from(&article(id, title))
}

const VOCABULARY: [&str; 8] = [
    "openai", "model", "launch", "funding", "gemini", "release", "google", "anthropic",
];

/// Bag-of-words embedder over a tiny vocabulary. Titles can be pinned to exact
/// vectors to produce chosen similarities.
#[derive(Debug, Default)]
pub struct KeywordEmbedder {
    pinned: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    panicking: AtomicBool,
}

impl KeywordEmbedder {
    pub const DIMENSION: usize = VOCABULARY.len();

    pub fn new() -> Self {
        Self::default()
    }

    /// Return `vector` for any text whose title is `title`.
    pub fn with_vector(mut self, title: &str, vector: Vec<f32>) -> Self {
        self.pinned.insert(title.to_string(), vector);
        self
    }

    /// Unit vector whose cosine with the first axis is `similarity`.
    pub fn vector_at(similarity: f32) -> Vec<f32> {
        let mut v = vec![0.0; Self::DIMENSION];
        v[0] = similarity;
        v[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
        v
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.load(Ordering::SeqCst) {
            panic!("embedder exploded");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let title = text.split("\n\n").next().unwrap_or_default();
        if let Some(v) = self.pinned.get(title) {
            return Ok(v.clone());
        }
        let lowered = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|word| lowered.split_whitespace().filter(|w| w == word).count() as f32)
            .collect())
    }
}

/// Always answers with the same text and records the prompts it saw.
#[derive(Debug)]
pub struct ScriptedModel {
    name: String,
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(name: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            response: response.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        Ok(self.response.clone())
    }
}

/// Always fails with a server error.
#[derive(Debug)]
pub struct FailingModel {
    name: String,
    calls: AtomicUsize,
}

impl FailingModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FailingModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Status {
            model: self.name.clone(),
            status: 500,
            body: "boom".to_string(),
        })
    }
}

/// Panics on every call.
#[derive(Debug)]
pub struct PanickingModel;

#[async_trait]
impl ChatModel for PanickingModel {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, LlmError> {
        panic!("model exploded");
    }
}
