//! Read side of the category taxonomy.

use espm_shared::{
    CategoryId, CategoryPathNode, ConceptId, EspmError, Result, UNASSIGNED_DEPTH,
};
use espm_storage::{CategoryStore, MemoryCategoryStore};

/// The persistent category taxonomy.
///
/// Mutated only by the build jobs in [`crate::build`]; every query method
/// takes `&self`, so a completed graph can be shared across queries.
#[derive(Debug, Clone, Default)]
pub struct CategoryGraph<S: CategoryStore = MemoryCategoryStore> {
    pub(crate) store: S,
}

impl<S: CategoryStore> CategoryGraph<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn is_build_completed(&self) -> bool {
        self.store.build_completed()
    }

    pub fn root_id(&self) -> Option<CategoryId> {
        self.store.root_id()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn category_id(&self, title: &str) -> Option<CategoryId> {
        self.store.category_id(title)
    }

    pub fn require_category_id(&self, title: &str) -> Result<CategoryId> {
        self.store
            .category_id(title)
            .ok_or_else(|| EspmError::missing("category", title))
    }

    pub fn category_title(&self, id: CategoryId) -> Option<String> {
        self.store.category_title(id)
    }

    pub fn require_category_title(&self, id: CategoryId) -> Result<String> {
        self.store
            .category_title(id)
            .ok_or_else(|| EspmError::missing("category", id.to_string()))
    }

    /// Title of `id`, or `default` when unknown.
    pub fn title_or(&self, id: CategoryId, default: &str) -> String {
        self.store
            .category_title(id)
            .unwrap_or_else(|| default.to_string())
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn parent_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        self.store.parent_ids(id)
    }

    pub fn child_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        self.store.child_ids(id)
    }

    /// Depth from the root, [`UNASSIGNED_DEPTH`] for unknown or unreached
    /// categories.
    pub fn depth(&self, id: CategoryId) -> i32 {
        self.store.depth(id).unwrap_or(UNASSIGNED_DEPTH)
    }

    pub fn concept_count(&self, id: CategoryId) -> i32 {
        self.store.direct_concept_count(id).unwrap_or(0)
    }

    pub fn recursive_concept_count(&self, id: CategoryId) -> i32 {
        self.store.recursive_concept_count(id).unwrap_or(0)
    }

    pub fn category_ids_by_concept(&self, concept: ConceptId) -> Vec<CategoryId> {
        self.store.category_ids_by_concept(concept)
    }

    pub fn concept_ids_by_category(&self, category: CategoryId) -> Vec<ConceptId> {
        self.store.concept_ids_by_category(category)
    }

    /// Children of the root.
    pub fn level_one_category_ids(&self) -> Vec<CategoryId> {
        self.root_id()
            .map(|root| self.store.child_ids(root))
            .unwrap_or_default()
    }

    /// Reached categories without recorded children.
    pub fn leaf_category_ids(&self) -> Vec<CategoryId> {
        self.store
            .category_ids()
            .into_iter()
            .filter(|&id| {
                self.depth(id) != UNASSIGNED_DEPTH && self.store.child_ids(id).is_empty()
            })
            .collect()
    }

    /// Every root → `id` path, branching at multi-parent categories. Each
    /// node carries its direct concept count. Empty when `id` is unknown or
    /// not connected to the root.
    pub fn get_paths(&self, id: CategoryId) -> Vec<Vec<CategoryPathNode>> {
        let Some(root) = self.root_id() else {
            return Vec::new();
        };
        if !self.store.contains(id) {
            return Vec::new();
        }
        self.paths_to(root, id)
    }

    fn paths_to(&self, root: CategoryId, id: CategoryId) -> Vec<Vec<CategoryPathNode>> {
        let node = CategoryPathNode {
            category_id: id,
            concept_count: self.concept_count(id),
        };
        if id == root {
            return vec![vec![node]];
        }

        // Recorded edges always go one level deeper, so this recursion is
        // bounded by the depth of `id`.
        let mut paths = Vec::new();
        for parent in self.store.parent_ids(id) {
            for mut path in self.paths_to(root, parent) {
                path.push(node);
                paths.push(path);
            }
        }
        paths
    }
}
