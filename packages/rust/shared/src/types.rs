//! Core domain types for ESPM taxonomies, concept spaces and mined paths.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a taxonomy category.
pub type CategoryId = i32;

/// Identifier of a concept (an article of the ESA concept space).
pub type ConceptId = i32;

/// Depth of a category not reached by the edge-relation BFS.
pub const UNASSIGNED_DEPTH: i32 = -1;

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for build job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub Uuid);

impl BuildId {
    /// Generate a new time-sortable build identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BuildId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Persistent taxonomy records
// ---------------------------------------------------------------------------

/// A taxonomy node as held by a category store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    /// BFS depth from the root, [`UNASSIGNED_DEPTH`] when unreachable.
    pub depth: i32,
    #[serde(default)]
    pub parent_ids: BTreeSet<CategoryId>,
    #[serde(default)]
    pub child_ids: BTreeSet<CategoryId>,
    #[serde(default)]
    pub direct_concept_count: i32,
    #[serde(default)]
    pub recursive_concept_count: i32,
}

impl Category {
    /// A freshly registered category with no edges, depth or counts.
    pub fn new(id: CategoryId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            depth: UNASSIGNED_DEPTH,
            parent_ids: BTreeSet::new(),
            child_ids: BTreeSet::new(),
            direct_concept_count: 0,
            recursive_concept_count: 0,
        }
    }
}

/// A concept of the ESA space with its category memberships and link sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub title: String,
    #[serde(default)]
    pub category_titles: BTreeSet<String>,
    #[serde(default)]
    pub inlink_ids: BTreeSet<ConceptId>,
    #[serde(default)]
    pub outlink_ids: BTreeSet<ConceptId>,
}

/// One entry of a term's postings list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub concept_id: ConceptId,
    pub tfidf: f32,
}

// ---------------------------------------------------------------------------
// Raw build input (one JSON object per line, produced by the dump job)
// ---------------------------------------------------------------------------

/// A category as extracted from the dump, before depth/edge resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCategory {
    pub id: CategoryId,
    pub title: String,
    /// Raw subcategory titles; may contain cycles and unknown names.
    #[serde(default)]
    pub children: Vec<String>,
}

/// A concept as extracted from the dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConcept {
    pub id: ConceptId,
    pub title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub inlinks: Vec<ConceptId>,
    #[serde(default)]
    pub outlinks: Vec<ConceptId>,
}

impl From<RawConcept> for Concept {
    fn from(raw: RawConcept) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            category_titles: raw.categories.into_iter().collect(),
            inlink_ids: raw.inlinks.into_iter().collect(),
            outlink_ids: raw.outlinks.into_iter().collect(),
        }
    }
}

/// A vocabulary term with its global idf and concept postings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTerm {
    pub term: String,
    pub idf: f32,
    /// `[concept_id, tfidf]` pairs.
    #[serde(default)]
    pub postings: Vec<(ConceptId, f32)>,
}

// ---------------------------------------------------------------------------
// Query output
// ---------------------------------------------------------------------------

/// One node of a mined path, annotated with its category title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedNode {
    pub category_id: CategoryId,
    pub title: String,
    pub weight: f64,
}

/// A selected root→leaf path with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedPath {
    pub nodes: Vec<TaggedNode>,
    /// Arithmetic mean of node weights.
    pub score: f64,
}

impl TaggedPath {
    /// Titles joined root→leaf, e.g. `Science/Physics/Optics`.
    pub fn display_path(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.title.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Weight mass of one level-one category for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelWeight {
    pub category_id: CategoryId,
    pub title: String,
    pub weight: f64,
    /// Share of the fan-in degree over all present level-one categories.
    pub normalized: f64,
}

/// A node of a persistent root→category path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPathNode {
    pub category_id: CategoryId,
    pub concept_count: i32,
}

/// Metadata of one recorded build job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: BuildId,
    pub namespace: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}
