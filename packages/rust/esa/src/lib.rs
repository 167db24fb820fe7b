//! Explicit Semantic Analysis: text as a weighted vector over the concept
//! space.
//!
//! [`ConceptVectorBuilder`] reads the shared [`espm_storage::ConceptIndex`]
//! and concept link graph; everything it returns is per-query and owned by
//! the caller.

mod builder;
mod tokenizer;
mod vector;

pub use builder::{ConceptVectorBuilder, LinkOptions};
pub use tokenizer::{Tokenizer, WordTokenizer};
pub use vector::ConceptVector;
