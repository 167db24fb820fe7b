//! Concept vector → category scores.

use std::collections::{BTreeMap, HashMap, HashSet};

use espm_esa::ConceptVector;
use espm_shared::{CategoryId, ConceptId};
use espm_storage::{CategoryStore, ConceptStore};
use espm_taxonomy::CategoryGraph;

/// Weight of a concept's own vector weight in its blended value.
const OWN_WEIGHT: f64 = 0.6;
/// Weight of the mean weight of its in-bag inlink neighbours.
const NEIGHBOUR_WEIGHT: f64 = 0.4;

/// Groups the top concepts of a vector by category and scores each
/// category from its members' blended weights.
#[derive(Debug, Clone, Copy)]
pub struct CategoryScoreAggregator {
    concept_limit: usize,
    normalize: bool,
}

impl CategoryScoreAggregator {
    pub fn new(concept_limit: usize, normalize: bool) -> Self {
        Self {
            concept_limit,
            normalize,
        }
    }

    /// Score every category holding at least one of the top
    /// `concept_limit` concepts. Scores sum to 1 when normalization is on.
    pub fn aggregate<S: CategoryStore>(
        &self,
        cv: &ConceptVector,
        graph: &CategoryGraph<S>,
        concepts: &dyn ConceptStore,
    ) -> BTreeMap<CategoryId, f64> {
        let top: HashMap<ConceptId, f64> = cv
            .ranked()
            .into_iter()
            .take(self.concept_limit)
            .map(|(id, w)| (id, f64::from(w)))
            .collect();

        let mut bags: BTreeMap<CategoryId, HashSet<ConceptId>> = BTreeMap::new();
        for &concept in top.keys() {
            for category in graph.category_ids_by_concept(concept) {
                bags.entry(category).or_default().insert(concept);
            }
        }

        let mut scores: BTreeMap<CategoryId, f64> = bags
            .iter()
            .map(|(&category, bag)| {
                let total: f64 = bag
                    .iter()
                    .map(|&concept| blended_weight(concept, bag, &top, concepts))
                    .sum();
                (category, total / bag.len() as f64)
            })
            .collect();

        if self.normalize {
            let sum: f64 = scores.values().sum();
            if sum > 0.0 {
                scores.values_mut().for_each(|s| *s /= sum);
            }
        }
        scores
    }
}

/// `0.6 · own + 0.4 · mean(weight of inlinks in the same bag)`.
fn blended_weight(
    concept: ConceptId,
    bag: &HashSet<ConceptId>,
    weights: &HashMap<ConceptId, f64>,
    concepts: &dyn ConceptStore,
) -> f64 {
    let own = weights.get(&concept).copied().unwrap_or(0.0);
    let neighbours: Vec<f64> = concepts
        .inlink_ids(concept)
        .into_iter()
        .filter(|n| *n != concept && bag.contains(n))
        .filter_map(|n| weights.get(&n).copied())
        .collect();

    let mean = if neighbours.is_empty() {
        0.0
    } else {
        neighbours.iter().sum::<f64>() / neighbours.len() as f64
    };
    OWN_WEIGHT * own + NEIGHBOUR_WEIGHT * mean
}
