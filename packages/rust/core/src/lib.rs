//! Semantic path mining for ESPM.
//!
//! This crate ties the concept vectors, the category taxonomy and the
//! per-query path machinery into end-to-end workflows: the offline build
//! ([`build::build_knowledge_base`]) and query-time mining
//! ([`pipeline::SemanticPathMiner`]).

pub mod aggregator;
pub mod build;
pub mod path_tree;
pub mod pipeline;
pub mod selector;
