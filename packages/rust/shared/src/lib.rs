//! Shared types, error model, and configuration for ESPM.
//!
//! This crate is the foundation depended on by all other ESPM crates.
//! It provides:
//! - [`EspmError`]: the unified error type
//! - Domain types ([`Category`], [`Concept`], [`TaggedPath`], raw build records)
//! - Configuration ([`AppConfig`], [`MiningConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EsaConfig, MiningConfig, SelectionConfig, StorageConfig, TaxonomyConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{EspmError, Result};
pub use types::{
    BuildId, BuildJob, Category, CategoryId, CategoryPathNode, Concept, ConceptId, LevelWeight,
    Posting, RawCategory, RawConcept, RawTerm, TaggedNode, TaggedPath, UNASSIGNED_DEPTH,
};
