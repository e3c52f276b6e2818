//! Workload generation and token counting
//!
//! This crate builds the pre-generated workload a tokenbench run consumes:
//!
//! - Seeded sampling of per-request output token targets
//! - Prompt construction from a built-in corpus or a custom prompt
//! - Token counters backed by HuggingFace tokenizers or a character heuristic

#![warn(missing_docs)]
#![warn(clippy::all)]

mod corpus;
pub mod error;
pub mod prompt;
pub mod tokenizer;
pub mod workload;

pub use error::SamplerError;
pub use prompt::PromptSource;
pub use tokenizer::{ApproxTokenCounter, HfTokenCounter};
pub use workload::WorkloadGenerator;
