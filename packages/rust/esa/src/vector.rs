//! Sparse concept-weight vectors.

use std::collections::HashMap;

use espm_shared::ConceptId;

/// Sparse map `concept id → weight`, created per query.
///
/// Iteration through [`ConceptVector::ranked`] is by descending weight,
/// ties broken by ascending concept id so results are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptVector {
    weights: HashMap<ConceptId, f32>,
}

impl ConceptVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, id: ConceptId) -> Option<f32> {
        self.weights.get(&id).copied()
    }

    pub fn contains(&self, id: ConceptId) -> bool {
        self.weights.contains_key(&id)
    }

    /// Add `weight` onto the entry for `id`, creating it if absent.
    pub fn add(&mut self, id: ConceptId, weight: f32) {
        *self.weights.entry(id).or_insert(0.0) += weight;
    }

    /// Sum `other` into `self` entry by entry.
    pub fn merge(&mut self, other: &ConceptVector) {
        for (&id, &w) in &other.weights {
            self.add(id, w);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConceptId, f32)> + '_ {
        self.weights.iter().map(|(&id, &w)| (id, w))
    }

    /// Entries in descending weight order.
    pub fn ranked(&self) -> Vec<(ConceptId, f32)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    /// The `n` highest-weight entries as a new vector.
    pub fn top(&self, n: usize) -> ConceptVector {
        self.ranked().into_iter().take(n).collect()
    }

    /// L2 norm.
    pub fn norm(&self) -> f64 {
        self.weights
            .values()
            .map(|&w| f64::from(w) * f64::from(w))
            .sum::<f64>()
            .sqrt()
    }

    pub fn dot(&self, other: &ConceptVector) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .iter()
            .filter_map(|(id, w)| large.get(id).map(|o| f64::from(w) * f64::from(o)))
            .sum()
    }

    /// Cosine similarity; `None` when either side has zero norm.
    pub fn cosine(&self, other: &ConceptVector) -> Option<f64> {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return None;
        }
        Some(self.dot(other) / denom)
    }
}

impl FromIterator<(ConceptId, f32)> for ConceptVector {
    fn from_iter<I: IntoIterator<Item = (ConceptId, f32)>>(iter: I) -> Self {
        let mut v = ConceptVector::new();
        for (id, w) in iter {
            v.add(id, w);
        }
        v
    }
}
