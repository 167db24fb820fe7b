//! Greedy maximum-weight independent set over candidate paths.
//!
//! Paths that share most of their prefix (or end at the same category) are
//! considered redundant and joined by an edge; selection repeatedly takes
//! the best remaining path and drops its neighbours.

use std::collections::BTreeSet;
use std::time::Instant;

use espm_shared::{EspmError, Result};

use crate::path_tree::SemanticPath;

pub const DEFAULT_REDUNDANCY_THRESHOLD: f64 = 0.7;

/// Redundancy graph over candidate paths. Vertex identity is the insertion
/// slot.
#[derive(Debug, Clone)]
pub struct PathSelector {
    threshold: f64,
    paths: Vec<SemanticPath>,
    neighbours: Vec<BTreeSet<usize>>,
    removed: Vec<bool>,
}

impl Default for PathSelector {
    fn default() -> Self {
        Self::new(DEFAULT_REDUNDANCY_THRESHOLD)
    }
}

impl PathSelector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            paths: Vec::new(),
            neighbours: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Vertices not yet selected or dropped.
    pub fn remaining(&self) -> usize {
        self.removed.iter().filter(|r| !**r).count()
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.neighbours.get(a).is_some_and(|n| n.contains(&b))
    }

    /// Add `path` as a vertex and connect it to every live vertex it is
    /// redundant with. Returns its slot.
    pub fn add_path(&mut self, path: SemanticPath) -> usize {
        let slot = self.paths.len();
        let mut linked = BTreeSet::new();
        for (i, existing) in self.paths.iter().enumerate() {
            if self.removed[i] {
                continue;
            }
            if redundancy_probability(existing, &path) > self.threshold {
                linked.insert(i);
            }
        }
        for &i in &linked {
            self.neighbours[i].insert(slot);
        }

        self.paths.push(path);
        self.neighbours.push(linked);
        self.removed.push(false);
        slot
    }

    /// Take the highest-scoring live path (earliest on ties) and remove it
    /// together with its neighbours.
    pub fn find_top_node(&mut self) -> Option<SemanticPath> {
        let mut best: Option<usize> = None;
        for i in 0..self.paths.len() {
            if self.removed[i] {
                continue;
            }
            match best {
                Some(b) if self.paths[i].score <= self.paths[b].score => {}
                _ => best = Some(i),
            }
        }

        let top = best?;
        self.removed[top] = true;
        for &n in &self.neighbours[top] {
            self.removed[n] = true;
        }
        Some(self.paths[top].clone())
    }

    /// Add every candidate, then take up to `top_k` paths in selection
    /// order. Fails with [`EspmError::Timeout`] past `deadline`.
    pub fn select(
        mut self,
        candidates: Vec<SemanticPath>,
        top_k: usize,
        deadline: Option<(Instant, Instant)>,
    ) -> Result<Vec<SemanticPath>> {
        for path in candidates {
            check_deadline(deadline)?;
            self.add_path(path);
        }

        let mut selected = Vec::new();
        while selected.len() < top_k {
            check_deadline(deadline)?;
            match self.find_top_node() {
                Some(path) => selected.push(path),
                None => break,
            }
        }
        Ok(selected)
    }
}

fn check_deadline(deadline: Option<(Instant, Instant)>) -> Result<()> {
    match deadline {
        Some((started, end)) if Instant::now() >= end => Err(EspmError::Timeout {
            elapsed_ms: started.elapsed().as_millis(),
        }),
        _ => Ok(()),
    }
}

/// Probability that two paths describe the same topic.
///
/// Paths ending at the same category are fully redundant. Otherwise each
/// shared depth `i` below the shorter length weighs `min_len − i` (shallow
/// agreement matters most), and the length difference only adds to the
/// denominator.
pub fn redundancy_probability(p1: &SemanticPath, p2: &SemanticPath) -> f64 {
    if p1.terminal().is_some() && p1.terminal() == p2.terminal() {
        return 1.0;
    }

    let min_len = p1.len().min(p2.len());
    let max_len = p1.len().max(p2.len());
    let mut total = 0.0;
    let mut current = 0.0;
    for i in 0..min_len {
        let weight = (min_len - i) as f64;
        total += weight;
        if p1.category_id_at(i) == p2.category_id_at(i) {
            current += weight;
        }
    }
    total += (max_len - min_len) as f64;

    if total == 0.0 { 0.0 } else { current / total }
}
