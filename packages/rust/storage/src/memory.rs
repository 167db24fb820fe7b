//! In-memory reference implementations of the store traits.
//!
//! These are what the build pipeline writes into and what [`crate::Storage`]
//! snapshots load back into for query serving.

use std::collections::{BTreeSet, HashMap};

use espm_shared::{
    Category, CategoryId, Concept, ConceptId, Posting, RawTerm, UNASSIGNED_DEPTH,
};

use crate::store::{CategoryStore, ConceptIndex, ConceptStore};

/// Title keys are compared case-insensitively.
fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Hash-map backed category store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCategoryStore {
    categories: HashMap<CategoryId, Category>,
    titles: HashMap<String, CategoryId>,
    by_concept: HashMap<ConceptId, BTreeSet<CategoryId>>,
    by_category: HashMap<CategoryId, BTreeSet<ConceptId>>,
    root_id: Option<CategoryId>,
    build_completed: bool,
}

impl MemoryCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    /// Iterate all categories (arbitrary order).
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Iterate all `(concept, category)` memberships.
    pub fn memberships(&self) -> impl Iterator<Item = (ConceptId, CategoryId)> + '_ {
        self.by_concept
            .iter()
            .flat_map(|(&concept, cats)| cats.iter().map(move |&cat| (concept, cat)))
    }

    /// Restore a full record (used by snapshot loading). Edges listed in the
    /// record are kept as-is; the reverse side is expected to be restored by
    /// the other endpoint's record.
    pub fn insert_record(&mut self, category: Category) -> bool {
        let key = title_key(&category.title);
        if self.categories.contains_key(&category.id) || self.titles.contains_key(&key) {
            return false;
        }
        self.titles.insert(key, category.id);
        self.categories.insert(category.id, category);
        true
    }
}

impl CategoryStore for MemoryCategoryStore {
    fn insert_category(&mut self, id: CategoryId, title: &str) -> bool {
        self.insert_record(Category::new(id, title))
    }

    fn category_ids(&self) -> Vec<CategoryId> {
        let mut ids: Vec<_> = self.categories.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn contains(&self, id: CategoryId) -> bool {
        self.categories.contains_key(&id)
    }

    fn category_id(&self, title: &str) -> Option<CategoryId> {
        self.titles.get(&title_key(title)).copied()
    }

    fn category_title(&self, id: CategoryId) -> Option<String> {
        self.categories.get(&id).map(|c| c.title.clone())
    }

    fn depth(&self, id: CategoryId) -> Option<i32> {
        self.categories.get(&id).map(|c| c.depth)
    }

    fn set_depth(&mut self, id: CategoryId, depth: i32) {
        if let Some(c) = self.categories.get_mut(&id) {
            c.depth = depth;
        }
    }

    fn parent_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        self.categories
            .get(&id)
            .map(|c| c.parent_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn child_ids(&self, id: CategoryId) -> Vec<CategoryId> {
        self.categories
            .get(&id)
            .map(|c| c.child_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn add_edge(&mut self, parent: CategoryId, child: CategoryId) -> bool {
        if !self.categories.contains_key(&parent) || !self.categories.contains_key(&child) {
            return false;
        }
        let added = self
            .categories
            .get_mut(&parent)
            .is_some_and(|p| p.child_ids.insert(child));
        if let Some(c) = self.categories.get_mut(&child) {
            c.parent_ids.insert(parent);
        }
        added
    }

    fn direct_concept_count(&self, id: CategoryId) -> Option<i32> {
        self.categories.get(&id).map(|c| c.direct_concept_count)
    }

    fn set_direct_concept_count(&mut self, id: CategoryId, count: i32) {
        if let Some(c) = self.categories.get_mut(&id) {
            c.direct_concept_count = count;
        }
    }

    fn recursive_concept_count(&self, id: CategoryId) -> Option<i32> {
        self.categories.get(&id).map(|c| c.recursive_concept_count)
    }

    fn set_recursive_concept_count(&mut self, id: CategoryId, count: i32) {
        if let Some(c) = self.categories.get_mut(&id) {
            c.recursive_concept_count = count;
        }
    }

    fn add_membership(&mut self, concept: ConceptId, category: CategoryId) -> bool {
        if !self.categories.contains_key(&category) {
            return false;
        }
        let added = self.by_concept.entry(concept).or_default().insert(category);
        self.by_category.entry(category).or_default().insert(concept);
        added
    }

    fn category_ids_by_concept(&self, concept: ConceptId) -> Vec<CategoryId> {
        self.by_concept
            .get(&concept)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn concept_ids_by_category(&self, category: CategoryId) -> Vec<ConceptId> {
        self.by_category
            .get(&category)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn root_id(&self) -> Option<CategoryId> {
        self.root_id
    }

    fn set_root_id(&mut self, id: CategoryId) {
        self.root_id = Some(id);
    }

    fn build_completed(&self) -> bool {
        self.build_completed
    }

    fn set_build_completed(&mut self, completed: bool) {
        self.build_completed = completed;
    }

    fn len(&self) -> usize {
        self.categories.len()
    }
}

// ---------------------------------------------------------------------------
// Concepts
// ---------------------------------------------------------------------------

/// Hash-map backed concept cache.
#[derive(Debug, Default, Clone)]
pub struct MemoryConceptStore {
    concepts: HashMap<ConceptId, Concept>,
}

impl MemoryConceptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a concept.
    pub fn insert(&mut self, concept: Concept) {
        self.concepts.insert(concept.id, concept);
    }

    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(&id)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// Mirror every known link on the other endpoint, so that an outlink
    /// a→b implies the inlink b←a and vice versa. Links to unknown concepts
    /// stay one-sided. Returns the number of links added.
    pub fn mirror_links(&mut self) -> usize {
        let mut pending: Vec<(ConceptId, ConceptId)> = Vec::new();
        for concept in self.concepts.values() {
            for &to in &concept.outlink_ids {
                pending.push((concept.id, to));
            }
            for &from in &concept.inlink_ids {
                pending.push((from, concept.id));
            }
        }

        let mut added = 0;
        for (from, to) in pending {
            if let Some(c) = self.concepts.get_mut(&from) {
                added += usize::from(c.outlink_ids.insert(to));
            }
            if let Some(c) = self.concepts.get_mut(&to) {
                added += usize::from(c.inlink_ids.insert(from));
            }
        }
        added
    }
}

impl ConceptStore for MemoryConceptStore {
    fn concept_ids(&self) -> Vec<ConceptId> {
        let mut ids: Vec<_> = self.concepts.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn concept_title(&self, id: ConceptId) -> Option<String> {
        self.concepts.get(&id).map(|c| c.title.clone())
    }

    fn category_titles(&self, id: ConceptId) -> Vec<String> {
        self.concepts
            .get(&id)
            .map(|c| c.category_titles.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn inlink_ids(&self, id: ConceptId) -> Vec<ConceptId> {
        self.concepts
            .get(&id)
            .map(|c| c.inlink_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn outlink_ids(&self, id: ConceptId) -> Vec<ConceptId> {
        self.concepts
            .get(&id)
            .map(|c| c.outlink_ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn inlink_count(&self, id: ConceptId) -> usize {
        self.concepts.get(&id).map_or(0, |c| c.inlink_ids.len())
    }

    fn outlink_count(&self, id: ConceptId) -> usize {
        self.concepts.get(&id).map_or(0, |c| c.outlink_ids.len())
    }

    fn len(&self) -> usize {
        self.concepts.len()
    }
}

// ---------------------------------------------------------------------------
// Concept index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TermEntry {
    idf: f32,
    postings: Vec<Posting>,
}

/// Hash-map backed inverted index.
#[derive(Debug, Default, Clone)]
pub struct MemoryConceptIndex {
    terms: HashMap<String, TermEntry>,
    concepts: BTreeSet<ConceptId>,
}

impl MemoryConceptIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a term. Terms are keyed lowercase; postings are
    /// kept in descending tfidf order.
    pub fn insert_term(&mut self, term: &str, idf: f32, mut postings: Vec<Posting>) {
        postings.sort_by(|a, b| {
            b.tfidf
                .total_cmp(&a.tfidf)
                .then_with(|| a.concept_id.cmp(&b.concept_id))
        });
        self.concepts.extend(postings.iter().map(|p| p.concept_id));
        self.terms
            .insert(term.to_lowercase(), TermEntry { idf, postings });
    }

    pub fn insert_raw(&mut self, raw: RawTerm) {
        let postings = raw
            .postings
            .into_iter()
            .map(|(concept_id, tfidf)| Posting { concept_id, tfidf })
            .collect();
        self.insert_term(&raw.term, raw.idf, postings);
    }

    /// Iterate `(term, idf, postings)`.
    pub fn terms(&self) -> impl Iterator<Item = (&str, f32, &[Posting])> {
        self.terms
            .iter()
            .map(|(t, e)| (t.as_str(), e.idf, e.postings.as_slice()))
    }
}

impl ConceptIndex for MemoryConceptIndex {
    fn idf(&self, term: &str) -> Option<f32> {
        self.terms.get(&term.to_lowercase()).map(|e| e.idf)
    }

    fn postings(&self, term: &str) -> Vec<Posting> {
        self.terms
            .get(&term.to_lowercase())
            .map(|e| e.postings.clone())
            .unwrap_or_default()
    }

    fn concept_space_size(&self) -> usize {
        self.concepts.len()
    }

    fn term_count(&self) -> usize {
        self.terms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_titles_are_case_insensitive() {
        let mut store = MemoryCategoryStore::new();
        assert!(store.insert_category(1, "Physics"));
        assert!(!store.insert_category(2, "physics"));
        assert!(!store.insert_category(1, "Chemistry"));
        assert_eq!(store.category_id("PHYSICS"), Some(1));
        assert_eq!(store.category_id(" physics "), Some(1));
        assert_eq!(store.depth(1), Some(UNASSIGNED_DEPTH));
        assert_eq!(store.depth(99), None);
    }

    #[test]
    fn edges_are_bidirectional_and_idempotent() {
        let mut store = MemoryCategoryStore::new();
        store.insert_category(1, "Root");
        store.insert_category(2, "Child");

        assert!(store.add_edge(1, 2));
        assert!(!store.add_edge(1, 2));
        assert!(!store.add_edge(1, 42));
        assert_eq!(store.child_ids(1), vec![2]);
        assert_eq!(store.parent_ids(2), vec![1]);
        assert!(store.parent_ids(42).is_empty());
    }

    #[test]
    fn memberships_track_both_directions() {
        let mut store = MemoryCategoryStore::new();
        store.insert_category(10, "Optics");
        assert!(store.add_membership(100, 10));
        assert!(!store.add_membership(100, 10));
        assert!(!store.add_membership(100, 11));
        assert_eq!(store.category_ids_by_concept(100), vec![10]);
        assert_eq!(store.concept_ids_by_category(10), vec![100]);
        assert_eq!(store.memberships().count(), 1);
    }

    #[test]
    fn mirror_links_fills_reverse_side() {
        let mut store = MemoryConceptStore::new();
        store.insert(Concept {
            id: 1,
            title: "Lens".into(),
            category_titles: BTreeSet::new(),
            inlink_ids: BTreeSet::new(),
            outlink_ids: [2, 99].into_iter().collect(),
        });
        store.insert(Concept {
            id: 2,
            title: "Light".into(),
            category_titles: BTreeSet::new(),
            inlink_ids: BTreeSet::new(),
            outlink_ids: BTreeSet::new(),
        });

        let added = store.mirror_links();
        assert_eq!(added, 1);
        assert_eq!(store.inlink_ids(2), vec![1]);
        assert_eq!(store.inlink_count(2), 1);
        assert_eq!(store.outlink_count(1), 2);
    }

    #[test]
    fn index_orders_postings_and_lowercases_terms() {
        let mut index = MemoryConceptIndex::new();
        index.insert_raw(RawTerm {
            term: "Lens".into(),
            idf: 2.0,
            postings: vec![(1, 0.1), (2, 0.9), (3, 0.5)],
        });

        assert_eq!(index.idf("lens"), Some(2.0));
        assert_eq!(index.idf("LENS"), Some(2.0));
        assert_eq!(index.idf("mirror"), None);
        let ids: Vec<_> = index.postings("lens").iter().map(|p| p.concept_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(index.concept_space_size(), 3);
        assert_eq!(index.term_count(), 1);
    }
}
