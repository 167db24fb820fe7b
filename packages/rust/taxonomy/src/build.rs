//! Offline build jobs: edges and depths, concept membership, recursive
//! counts.
//!
//! Jobs run once, single-writer, in order. [`CategoryGraph::build`] runs all
//! three and marks the graph completed; query pipelines refuse graphs that
//! were not completed.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use espm_shared::{CategoryId, EspmError, RawCategory, Result, UNASSIGNED_DEPTH};
use espm_storage::{CategoryStore, ConceptStore};

use crate::graph::CategoryGraph;

/// Counters collected while building, persisted as build-job stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub categories: usize,
    pub duplicate_categories: usize,
    pub visited: usize,
    pub edges: usize,
    pub skipped: usize,
    pub unresolved_children: usize,
    pub memberships: usize,
    pub unresolved_memberships: usize,
    pub leaves: usize,
}

impl<S: CategoryStore> CategoryGraph<S> {
    /// Run every build job over `raw` and the concept cache, then mark the
    /// graph completed.
    #[instrument(skip_all, fields(root = root_title, categories = raw.len()))]
    pub fn build(
        &mut self,
        raw: &[RawCategory],
        concepts: &dyn ConceptStore,
        root_title: &str,
        skip_titles: &[String],
    ) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        self.store.set_build_completed(false);

        self.register_categories(raw, &mut report);
        self.build_edge_relation(raw, root_title, skip_titles, &mut report)?;
        self.build_concept_relation(concepts, &mut report);
        report.leaves = self.build_recursive_count_info();

        self.store.set_build_completed(true);
        info!(
            categories = report.categories,
            visited = report.visited,
            edges = report.edges,
            memberships = report.memberships,
            leaves = report.leaves,
            "taxonomy build complete"
        );
        Ok(report)
    }

    /// Register every raw category. Colliding ids or titles keep the first
    /// record.
    pub fn register_categories(&mut self, raw: &[RawCategory], report: &mut BuildReport) {
        for record in raw {
            if self.store.insert_category(record.id, &record.title) {
                report.categories += 1;
            } else {
                warn!(id = record.id, title = %record.title, "duplicate category, skipping");
                report.duplicate_categories += 1;
            }
        }
    }

    /// BFS from the root assigning depth by first arrival. A parent → child
    /// edge is recorded only when the child sits exactly one level below the
    /// parent, which drops back edges and cycles. Categories named in
    /// `skip_titles` get neither depth nor edges.
    #[instrument(skip_all, fields(root = root_title))]
    pub fn build_edge_relation(
        &mut self,
        raw: &[RawCategory],
        root_title: &str,
        skip_titles: &[String],
        report: &mut BuildReport,
    ) -> Result<()> {
        let root = self
            .store
            .category_id(root_title)
            .ok_or_else(|| EspmError::missing("root category", root_title))?;
        self.store.set_root_id(root);

        let skip: HashSet<String> = skip_titles
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect();
        let children: HashMap<CategoryId, &[String]> = raw
            .iter()
            .map(|r| (r.id, r.children.as_slice()))
            .collect();

        let mut visited: HashSet<CategoryId> = HashSet::from([root]);
        let mut skipped: HashSet<CategoryId> = HashSet::new();
        let mut queue = VecDeque::from([root]);
        self.store.set_depth(root, 0);

        while let Some(parent) = queue.pop_front() {
            let parent_depth = self.store.depth(parent).unwrap_or(UNASSIGNED_DEPTH);
            let Some(titles) = children.get(&parent) else {
                continue;
            };

            for title in titles.iter() {
                let Some(child) = self.store.category_id(title) else {
                    debug!(parent, title = %title, "unknown child category");
                    report.unresolved_children += 1;
                    continue;
                };
                if skip.contains(&title.trim().to_lowercase()) {
                    skipped.insert(child);
                    continue;
                }

                if visited.insert(child) {
                    self.store.set_depth(child, parent_depth + 1);
                    queue.push_back(child);
                }
                if self.store.depth(child) == Some(parent_depth + 1)
                    && self.store.add_edge(parent, child)
                {
                    report.edges += 1;
                }
            }
        }

        report.visited = visited.len();
        report.skipped = skipped.len();
        info!(
            visited = report.visited,
            edges = report.edges,
            skipped = report.skipped,
            unresolved = report.unresolved_children,
            "edge relation built"
        );
        Ok(())
    }

    /// Resolve each concept's category titles and record the memberships.
    /// A concept counts once per category however many titles resolve to it.
    pub fn build_concept_relation(&mut self, concepts: &dyn ConceptStore, report: &mut BuildReport) {
        for concept in concepts.concept_ids() {
            for title in concepts.category_titles(concept) {
                let Some(category) = self.store.category_id(&title) else {
                    debug!(concept, title = %title, "unresolved concept category");
                    report.unresolved_memberships += 1;
                    continue;
                };
                if self.store.add_membership(concept, category) {
                    let count = self.store.direct_concept_count(category).unwrap_or(0);
                    self.store.set_direct_concept_count(category, count + 1);
                    report.memberships += 1;
                }
            }
        }
        info!(
            memberships = report.memberships,
            unresolved = report.unresolved_memberships,
            "concept relation built"
        );
    }

    /// Seed every recursive count with the direct count, then push each
    /// leaf's direct count to all of its ancestors. An ancestor reachable
    /// over k routes receives the leaf count k times. Returns the number of
    /// leaves.
    pub fn build_recursive_count_info(&mut self) -> usize {
        for id in self.store.category_ids() {
            let direct = self.store.direct_concept_count(id).unwrap_or(0);
            self.store.set_recursive_concept_count(id, direct);
        }

        let leaves = self.leaf_category_ids();
        for &leaf in &leaves {
            let count = self.store.direct_concept_count(leaf).unwrap_or(0);
            if count == 0 {
                continue;
            }
            let mut queue: VecDeque<CategoryId> = self.store.parent_ids(leaf).into();
            while let Some(ancestor) = queue.pop_front() {
                let current = self.store.recursive_concept_count(ancestor).unwrap_or(0);
                self.store
                    .set_recursive_concept_count(ancestor, current.saturating_add(count));
                queue.extend(self.store.parent_ids(ancestor));
            }
        }

        info!(leaves = leaves.len(), "recursive counts built");
        leaves.len()
    }
}
