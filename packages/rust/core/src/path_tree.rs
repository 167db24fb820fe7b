//! Per-query weighted subtree of the taxonomy and its path enumeration.
//!
//! A [`PathTree`] is an arena of [`DynamicTreeNode`]s keyed by category id.
//! It borrows the shared [`CategoryGraph`] for structure and never writes to
//! it; the whole arena is dropped with the query.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, warn};

use espm_shared::{CategoryId, EspmError, LevelWeight, Result, UNASSIGNED_DEPTH};
use espm_storage::CategoryStore;
use espm_taxonomy::CategoryGraph;

type NodeIdx = usize;

/// One category inside the ephemeral tree.
#[derive(Debug, Clone)]
pub struct DynamicTreeNode {
    pub category_id: CategoryId,
    pub weight: f64,
    /// Fractional fan-out degree, filled in by [`PathTree::adjust`].
    pub child_count: f64,
    pub recursive_concept_count: i32,
    parents: BTreeSet<NodeIdx>,
    children: BTreeSet<NodeIdx>,
}

/// A weighted root → node sequence. `score` is the mean node weight.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticPath {
    pub nodes: Vec<(CategoryId, f64)>,
    pub score: f64,
}

impl SemanticPath {
    pub fn new(nodes: Vec<(CategoryId, f64)>) -> Self {
        let score = if nodes.is_empty() {
            0.0
        } else {
            nodes.iter().map(|(_, w)| w).sum::<f64>() / nodes.len() as f64
        };
        Self { nodes, score }
    }

    pub fn terminal(&self) -> Option<CategoryId> {
        self.nodes.last().map(|(id, _)| *id)
    }

    pub fn category_id_at(&self, depth: usize) -> Option<CategoryId> {
        self.nodes.get(depth).map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Per-query tree builder.
pub struct PathTree<'g, S: CategoryStore> {
    graph: &'g CategoryGraph<S>,
    nodes: Vec<DynamicTreeNode>,
    index: HashMap<CategoryId, NodeIdx>,
    leaves: Vec<NodeIdx>,
    leaf_ids: HashSet<CategoryId>,
    adjusted: bool,
    deadline: Option<Instant>,
    started: Instant,
}

impl<'g, S: CategoryStore> PathTree<'g, S> {
    pub fn new(graph: &'g CategoryGraph<S>) -> Self {
        Self {
            graph,
            nodes: Vec::new(),
            index: HashMap::new(),
            leaves: Vec::new(),
            leaf_ids: HashSet::new(),
            adjusted: false,
            deadline: None,
            started: Instant::now(),
        }
    }

    /// Fail tree construction and enumeration with [`EspmError::Timeout`]
    /// once `deadline` passes.
    pub fn with_deadline(mut self, started: Instant, deadline: Instant) -> Self {
        self.started = started;
        self.deadline = Some(deadline);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, category_id: CategoryId) -> Option<&DynamicTreeNode> {
        self.index.get(&category_id).map(|&i| &self.nodes[i])
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Insert `category_id` as a leaf carrying `weight` and spread that
    /// weight up to the root, splitting equally at every multi-parent node.
    ///
    /// Returns `Ok(false)` (and changes nothing) for a repeated leaf or a
    /// category the taxonomy never reached.
    pub fn add_leaf_node(&mut self, category_id: CategoryId, weight: f64) -> Result<bool> {
        if self.leaf_ids.contains(&category_id) {
            warn!(category_id, "duplicate leaf insertion ignored");
            return Ok(false);
        }
        if self.graph.depth(category_id) == UNASSIGNED_DEPTH {
            debug!(category_id, "category has no depth, skipping");
            return Ok(false);
        }

        let leaf = self.node_for(category_id);
        self.nodes[leaf].weight += weight;
        self.leaves.push(leaf);
        self.leaf_ids.insert(category_id);

        // Recorded edges always go exactly one level up, so every frontier
        // is a single taxonomy level and transit merges per node.
        let mut frontier = BTreeMap::from([(leaf, weight)]);
        while !frontier.is_empty() {
            self.check_deadline()?;
            let mut next: BTreeMap<NodeIdx, f64> = BTreeMap::new();
            for (node, transit) in frontier {
                let parents = self.graph.parent_ids(self.nodes[node].category_id);
                if parents.is_empty() {
                    continue;
                }
                let share = transit / parents.len() as f64;
                for parent_id in parents {
                    let parent = self.node_for(parent_id);
                    self.nodes[parent].weight += share;
                    self.link(parent, node);
                    *next.entry(parent).or_default() += share;
                }
            }
            frontier = next;
        }
        Ok(true)
    }

    /// Second pass over every leaf's ancestry: record fractional child
    /// counts and redistribute node weight to parents in proportion to their
    /// recursive concept counts. Runs once per tree.
    ///
    /// A node reached from a leaf by `n` routes contributes `n` times.
    pub fn adjust(&mut self) -> Result<()> {
        if self.adjusted {
            warn!("path tree already adjusted, ignoring");
            return Ok(());
        }
        self.adjusted = true;

        for i in 0..self.leaves.len() {
            let mut frontier = BTreeMap::from([(self.leaves[i], 1.0)]);
            while !frontier.is_empty() {
                self.check_deadline()?;
                let mut next: BTreeMap<NodeIdx, f64> = BTreeMap::new();
                for (node, routes) in frontier {
                    let parents: Vec<NodeIdx> =
                        self.nodes[node].parents.iter().copied().collect();
                    if parents.is_empty() {
                        continue;
                    }

                    let fan_out = 1.0 / parents.len() as f64;
                    let total_rc: f64 = parents
                        .iter()
                        .map(|&p| f64::from(self.nodes[p].recursive_concept_count))
                        .sum();
                    let weight = self.nodes[node].weight;

                    for &p in &parents {
                        let share = if total_rc > 0.0 {
                            f64::from(self.nodes[p].recursive_concept_count) / total_rc
                        } else {
                            fan_out
                        };
                        let parent = &mut self.nodes[p];
                        parent.child_count += routes * fan_out;
                        parent.weight += routes * weight * share;
                        *next.entry(p).or_default() += routes;
                    }
                }
                frontier = next;
            }
        }
        Ok(())
    }

    /// [`Self::get_semantic_paths`] without the paths that end at a leaf
    /// with `child_count > 0`, which is a prefix rather than a terminus.
    pub fn get_filtered_semantic_paths(&self) -> Result<Vec<SemanticPath>> {
        let excluded: HashSet<CategoryId> = self
            .leaves
            .iter()
            .filter(|&&leaf| self.nodes[leaf].child_count > 0.0)
            .map(|&leaf| self.nodes[leaf].category_id)
            .collect();

        let mut paths = self.get_semantic_paths()?;
        paths.retain(|p| p.terminal().is_some_and(|t| !excluded.contains(&t)));
        Ok(paths)
    }

    /// Every root → tail path of the tree, ascending by score.
    pub fn get_semantic_paths(&self) -> Result<Vec<SemanticPath>> {
        self.check_deadline()?;
        let Some(root) = self.root_node() else {
            return Ok(Vec::new());
        };

        let mut finished: Vec<Vec<NodeIdx>> = Vec::new();
        let mut open: Vec<Vec<NodeIdx>> = vec![vec![root]];
        while let Some(chain) = open.pop() {
            self.check_deadline()?;
            let Some(&tail) = chain.last() else {
                continue;
            };
            let children = &self.nodes[tail].children;
            if children.is_empty() {
                finished.push(chain);
                continue;
            }
            // Reverse so the smallest child is expanded first.
            for &child in children.iter().rev() {
                let mut next = chain.clone();
                next.push(child);
                open.push(next);
            }
        }

        let mut paths: Vec<SemanticPath> = finished.iter().map(|c| self.to_path(c)).collect();
        sort_ascending(&mut paths);
        Ok(paths)
    }

    /// Weight and normalized child count of each level-one category present
    /// in the tree.
    pub fn get_level_distribution(&self) -> Vec<LevelWeight> {
        let present: Vec<&DynamicTreeNode> = self
            .graph
            .level_one_category_ids()
            .into_iter()
            .filter_map(|id| self.node(id))
            .collect();
        let total: f64 = present.iter().map(|n| n.child_count).sum();

        present
            .into_iter()
            .map(|n| LevelWeight {
                category_id: n.category_id,
                title: self.graph.title_or(n.category_id, ""),
                weight: n.weight,
                normalized: if total > 0.0 { n.child_count / total } else { 0.0 },
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn node_for(&mut self, category_id: CategoryId) -> NodeIdx {
        if let Some(&idx) = self.index.get(&category_id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(DynamicTreeNode {
            category_id,
            weight: 0.0,
            child_count: 0.0,
            recursive_concept_count: self.graph.recursive_concept_count(category_id),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
        });
        self.index.insert(category_id, idx);
        idx
    }

    fn link(&mut self, parent: NodeIdx, child: NodeIdx) {
        self.nodes[parent].children.insert(child);
        self.nodes[child].parents.insert(parent);
    }

    fn root_node(&self) -> Option<NodeIdx> {
        self.graph
            .root_id()
            .and_then(|root| self.index.get(&root).copied())
    }

    fn to_path(&self, chain: &[NodeIdx]) -> SemanticPath {
        SemanticPath::new(
            chain
                .iter()
                .map(|&i| (self.nodes[i].category_id, self.nodes[i].weight))
                .collect(),
        )
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EspmError::Timeout {
                elapsed_ms: self.started.elapsed().as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// Stable ascending sort by score.
fn sort_ascending(paths: &mut [SemanticPath]) {
    paths.sort_by(|a, b| a.score.total_cmp(&b.score));
}
