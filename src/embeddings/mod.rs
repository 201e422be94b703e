//! Embedding computation, the persistent vector index and nearest-neighbor
//! search over previously published articles.
//!
//! # Submodules
//!
//! - [`provider`]: the [`EmbeddingProvider`] seam and its OpenAI-compatible client
//! - [`index`]: the vector index and its metadata store, with atomic persistence
//! - [`manager`]: [`EmbeddingManager`], the fail-soft facade used by the pipeline
//!
//! ```text
//! Article ──> EmbeddingProvider ──> Vec<f32>[dimension]
//!                                      │
//!                  ┌───────────────────┴──────────────┐
//!                  ▼                                  ▼
//!           search (read lock)              add + persist (write lock)
//! ```

pub mod index;
pub mod manager;
pub mod provider;

pub use manager::{EmbeddingManager, IndexStats};
pub use provider::{EmbeddingProvider, OpenAiEmbedder, RetryingEmbedder};
