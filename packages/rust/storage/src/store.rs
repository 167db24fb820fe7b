//! Narrow capability interfaces over the three persistent collaborators.
//!
//! The taxonomy build writes through [`CategoryStore`]; query-time code only
//! reads. [`ConceptStore`] and [`ConceptIndex`] are read-only views produced
//! by external ingestion jobs. All traits are `Send + Sync` so a loaded store
//! can sit behind an `Arc` and serve concurrent queries.

use espm_shared::{CategoryId, ConceptId, Posting};

/// Category ↔ title resolution, adjacency, counts and build state.
pub trait CategoryStore: Send + Sync {
    /// Register a category. Returns `false` if the id or the
    /// (case-insensitive) title is already taken.
    fn insert_category(&mut self, id: CategoryId, title: &str) -> bool;

    /// All registered category ids, ascending.
    fn category_ids(&self) -> Vec<CategoryId>;

    fn contains(&self, id: CategoryId) -> bool;

    /// Case-insensitive title lookup.
    fn category_id(&self, title: &str) -> Option<CategoryId>;

    fn category_title(&self, id: CategoryId) -> Option<String>;

    /// `None` for unknown ids; registered but unreached categories report
    /// `Some(UNASSIGNED_DEPTH)`.
    fn depth(&self, id: CategoryId) -> Option<i32>;

    fn set_depth(&mut self, id: CategoryId, depth: i32);

    fn parent_ids(&self, id: CategoryId) -> Vec<CategoryId>;

    fn child_ids(&self, id: CategoryId) -> Vec<CategoryId>;

    /// Record parent→child in both adjacency sets. Returns `false` when the
    /// edge already existed or an endpoint is unknown.
    fn add_edge(&mut self, parent: CategoryId, child: CategoryId) -> bool;

    fn direct_concept_count(&self, id: CategoryId) -> Option<i32>;

    fn set_direct_concept_count(&mut self, id: CategoryId, count: i32);

    fn recursive_concept_count(&self, id: CategoryId) -> Option<i32>;

    fn set_recursive_concept_count(&mut self, id: CategoryId, count: i32);

    /// Record concept↔category membership. Returns `false` when it already
    /// existed or the category is unknown.
    fn add_membership(&mut self, concept: ConceptId, category: CategoryId) -> bool;

    fn category_ids_by_concept(&self, concept: ConceptId) -> Vec<CategoryId>;

    fn concept_ids_by_category(&self, category: CategoryId) -> Vec<ConceptId>;

    fn root_id(&self) -> Option<CategoryId>;

    fn set_root_id(&mut self, id: CategoryId);

    fn build_completed(&self) -> bool;

    fn set_build_completed(&mut self, completed: bool);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Concept titles, category-title memberships and the article link graph.
pub trait ConceptStore: Send + Sync {
    /// All concept ids, ascending.
    fn concept_ids(&self) -> Vec<ConceptId>;

    fn concept_title(&self, id: ConceptId) -> Option<String>;

    /// Raw category titles, unresolved.
    fn category_titles(&self, id: ConceptId) -> Vec<String>;

    fn inlink_ids(&self, id: ConceptId) -> Vec<ConceptId>;

    fn outlink_ids(&self, id: ConceptId) -> Vec<ConceptId>;

    fn inlink_count(&self, id: ConceptId) -> usize;

    fn outlink_count(&self, id: ConceptId) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ESA inverted index: term → idf and term → concept postings.
pub trait ConceptIndex: Send + Sync {
    /// Global idf of a term, `None` when it is out of vocabulary.
    fn idf(&self, term: &str) -> Option<f32>;

    /// Postings ordered by descending tfidf; empty for unknown terms.
    fn postings(&self, term: &str) -> Vec<Posting>;

    /// Number of distinct concepts referenced by any posting.
    fn concept_space_size(&self) -> usize;

    fn term_count(&self) -> usize;
}
