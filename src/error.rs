//! Error types for the embedding, index, LLM and analysis layers.
//!
//! None of these escape [`crate::context::ContextAnalyzer::analyze_context`];
//! the analyzer folds every failure into a conservative KEEP decision.

use thiserror::Error;

/// Failure while computing an embedding.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding endpoint returned no vectors")]
    EmptyResponse,

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether another attempt against the same provider can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Request(_) => true,
            EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::EmptyResponse | EmbeddingError::Dimension { .. } => false,
        }
    }
}

/// Failure inside the vector index or its persistence.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("index and metadata disagree: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Failure talking to a chat model.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model {model} request failed: {source}")]
    Request {
        model: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model {model} returned HTTP {status}: {body}")]
    Status {
        model: String,
        status: u16,
        body: String,
    },

    #[error("model {model} returned an empty completion")]
    EmptyCompletion { model: String },

    #[error("no models configured")]
    NoModels,

    #[error("all models failed: {attempted:?}")]
    AllModelsFailed { attempted: Vec<String> },
}

/// Failure anywhere in a single context analysis.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("similarity search failed: {0}")]
    Search(#[from] IndexError),

    #[error("analysis panicked: {0}")]
    Panicked(String),
}

/// Failure loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
