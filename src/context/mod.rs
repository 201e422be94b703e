//! Context analysis: decides whether a new article is a duplicate (SKIP), a
//! follow-up (UPDATE) or an independent story (KEEP), and attaches references
//! to the prior coverage it relates to.

pub mod analyzer;
pub mod prompt;
pub mod references;

pub use analyzer::ContextAnalyzer;
