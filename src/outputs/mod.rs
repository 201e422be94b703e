//! Output generation for run reports.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── context_071502.json
//!     └── context_183044.json
//! ```

pub mod json;
