//! Text → concept vector, with optional link-graph reinforcement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use espm_shared::{ConceptId, MiningConfig};
use espm_storage::{ConceptIndex, ConceptStore};
use tracing::debug;

use crate::tokenizer::{Tokenizer, WordTokenizer};
use crate::vector::ConceptVector;

/// An inlink counts as a more general concept when its log inlink count
/// exceeds the source's by more than this margin.
const GENERALITY_MARGIN: f64 = 1.0;

/// Link reinforcement settings.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    pub alpha: f32,
    pub enabled: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            enabled: true,
        }
    }
}

impl From<&MiningConfig> for LinkOptions {
    fn from(config: &MiningConfig) -> Self {
        Self {
            alpha: config.link_alpha,
            enabled: config.link_reinforcement,
        }
    }
}

/// Builds ESA concept vectors over a shared, read-only index and concept
/// cache. Cheap to share across queries behind an `Arc`.
pub struct ConceptVectorBuilder {
    index: Arc<dyn ConceptIndex>,
    concepts: Arc<dyn ConceptStore>,
    tokenizer: Box<dyn Tokenizer>,
    links: LinkOptions,
}

impl ConceptVectorBuilder {
    pub fn new(index: Arc<dyn ConceptIndex>, concepts: Arc<dyn ConceptStore>) -> Self {
        Self {
            index,
            concepts,
            tokenizer: Box::new(WordTokenizer::default()),
            links: LinkOptions::default(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_link_options(mut self, links: LinkOptions) -> Self {
        self.links = links;
        self
    }

    pub fn concepts(&self) -> &dyn ConceptStore {
        self.concepts.as_ref()
    }

    /// Weighted concept vector for `text`.
    ///
    /// Each in-vocabulary term gets `idf × (1 + ln tf)`; the term weights are
    /// L2-normalized and spread over the term's postings. Returns `None` when
    /// no term is in the vocabulary or no posting is hit.
    pub fn get_concept_vector(&self, text: &str) -> Option<ConceptVector> {
        let mut tf: BTreeMap<String, u32> = BTreeMap::new();
        for token in self.tokenizer.tokenize(text) {
            *tf.entry(token).or_insert(0) += 1;
        }

        let weighted: Vec<(String, f64)> = tf
            .into_iter()
            .filter_map(|(term, count)| {
                let idf = f64::from(self.index.idf(&term)?);
                (idf != 0.0).then(|| (term, idf * (1.0 + f64::from(count).ln())))
            })
            .collect();

        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            debug!("no in-vocabulary terms");
            return None;
        }

        let mut cv = ConceptVector::new();
        for (term, w) in &weighted {
            let query_weight = (w / norm) as f32;
            for posting in self.index.postings(term) {
                cv.add(posting.concept_id, posting.tfidf * query_weight);
            }
        }

        if cv.is_empty() {
            debug!(terms = weighted.len(), "terms matched but no postings");
            return None;
        }
        Some(cv)
    }

    /// Keep the `limit` highest-weight entries.
    pub fn trim_vector(&self, cv: &ConceptVector, limit: usize) -> ConceptVector {
        cv.top(limit)
    }

    /// Reinforcement mass from more general linked concepts.
    ///
    /// For each of the top `limit` concepts, sums the weights of its inlinks
    /// that are themselves in the top `limit` and are more general by log
    /// inlink count, scaled by `alpha`. Concepts receiving nothing are
    /// absent from the result.
    pub fn get_link_vector(&self, cv: &ConceptVector, alpha: f32, limit: usize) -> ConceptVector {
        let top: HashMap<ConceptId, f32> = cv.ranked().into_iter().take(limit).collect();
        let mut out = ConceptVector::new();

        for (&id, _) in &top {
            let own = log_count(self.concepts.inlink_count(id));
            let mass: f32 = self
                .concepts
                .inlink_ids(id)
                .into_iter()
                .filter_map(|inlink| {
                    let w = top.get(&inlink)?;
                    let general = log_count(self.concepts.inlink_count(inlink)) - own;
                    (general > GENERALITY_MARGIN).then_some(*w)
                })
                .sum();
            if mass > 0.0 {
                out.add(id, alpha * mass);
            }
        }
        out
    }

    /// Concept vector trimmed to `2 × limit`, plus link reinforcement when
    /// enabled. `None` exactly when [`Self::get_concept_vector`] is `None`.
    pub fn get_combined_vector(&self, text: &str, limit: usize) -> Option<ConceptVector> {
        let base = self.get_concept_vector(text)?;
        let window = limit.saturating_mul(2);
        let mut combined = self.trim_vector(&base, window);

        if self.links.enabled {
            let link = self.get_link_vector(&combined, self.links.alpha, window);
            debug!(reinforced = link.len(), "link vector applied");
            combined.merge(&link);
        }
        Some(combined)
    }

    /// Cosine similarity of two documents' combined vectors. `None` when
    /// either has no vector.
    pub fn get_relatedness(&self, doc1: &str, doc2: &str, limit: usize) -> Option<f64> {
        let v1 = self.get_combined_vector(doc1, limit)?;
        let v2 = self.get_combined_vector(doc2, limit)?;
        v1.cosine(&v2)
    }
}

/// `ln(count)`, with zero counts treated as one.
fn log_count(count: usize) -> f64 {
    (count.max(1) as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use espm_shared::{Concept, RawTerm};
    use espm_storage::{MemoryConceptIndex, MemoryConceptStore};

    fn concept(id: ConceptId, title: &str, inlinks: &[ConceptId]) -> Concept {
        Concept {
            id,
            title: title.into(),
            category_titles: Default::default(),
            inlink_ids: inlinks.iter().copied().collect(),
            outlink_ids: Default::default(),
        }
    }

    fn fixture() -> ConceptVectorBuilder {
        let mut index = MemoryConceptIndex::new();
        index.insert_raw(RawTerm {
            term: "lens".into(),
            idf: 2.0,
            postings: vec![(1, 0.5), (2, 0.25)],
        });
        index.insert_raw(RawTerm {
            term: "light".into(),
            idf: 1.0,
            postings: vec![(2, 1.0)],
        });
        index.insert_raw(RawTerm {
            term: "stopword".into(),
            idf: 0.0,
            postings: vec![(3, 1.0)],
        });

        let mut concepts = MemoryConceptStore::new();
        // Concept 2 ("Light") is far more linked-to than concept 1 ("Lens").
        concepts.insert(concept(1, "Lens", &[2]));
        concepts.insert(concept(2, "Light", &(100..110).collect::<Vec<_>>()));

        ConceptVectorBuilder::new(Arc::new(index), Arc::new(concepts))
    }

    #[test]
    fn concept_vector_weights_terms() {
        let builder = fixture();
        let cv = builder.get_concept_vector("lens light lens").unwrap();

        // lens: 2·(1+ln2), light: 1·(1+ln1), then L2-normalized
        let lens = 2.0 * (1.0 + 2f64.ln());
        let norm = (lens * lens + 1.0).sqrt();
        let expected_1 = 0.5 * lens / norm;
        let expected_2 = 0.25 * lens / norm + 1.0 / norm;

        assert!((f64::from(cv.get(1).unwrap()) - expected_1).abs() < 1e-5);
        assert!((f64::from(cv.get(2).unwrap()) - expected_2).abs() < 1e-5);
        assert_eq!(cv.ranked()[0].0, 2);
    }

    #[test]
    fn concept_vector_none_without_vocabulary_hits() {
        let builder = fixture();
        assert!(builder.get_concept_vector("unrelated words here").is_none());
        assert!(builder.get_concept_vector("stopword").is_none());
        assert!(builder.get_concept_vector("").is_none());
    }

    #[test]
    fn trim_vector_is_descending_prefix() {
        let builder = fixture();
        let cv: ConceptVector = [(1, 0.1), (2, 0.7), (3, 0.4), (4, 0.9)]
            .into_iter()
            .collect();
        let trimmed = builder.trim_vector(&cv, 2);

        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.ranked(), cv.ranked()[..2].to_vec());
        assert_eq!(builder.trim_vector(&cv, 10).len(), 4);
    }

    #[test]
    fn link_vector_reinforces_from_general_inlinks() {
        let builder = fixture();
        let cv: ConceptVector = [(1, 0.4), (2, 0.6)].into_iter().collect();
        let link = builder.get_link_vector(&cv, 0.5, 10);

        // Concept 1 is linked from the much more general concept 2.
        assert_eq!(link.len(), 1);
        assert!((link.get(1).unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn link_vector_ignores_inlinks_outside_top() {
        let builder = fixture();
        let cv: ConceptVector = [(1, 0.9), (2, 0.1)].into_iter().collect();
        assert!(builder.get_link_vector(&cv, 0.5, 1).is_empty());
    }

    #[test]
    fn combined_vector_none_iff_concept_vector_none() {
        let builder = fixture();
        for text in ["lens", "light", "nothing matches", ""] {
            assert_eq!(
                builder.get_combined_vector(text, 5).is_none(),
                builder.get_concept_vector(text).is_none(),
                "mismatch for {text:?}"
            );
        }
    }

    #[test]
    fn combined_vector_without_links_is_trimmed_base() {
        let builder = fixture().with_link_options(LinkOptions {
            alpha: 0.5,
            enabled: false,
        });
        let base = builder.get_concept_vector("lens light").unwrap();
        let combined = builder.get_combined_vector("lens light", 1).unwrap();
        assert_eq!(combined, base.top(2));
    }

    #[test]
    fn relatedness_is_cosine_of_combined_vectors() {
        let builder = fixture();
        let same = builder.get_relatedness("lens light", "lens light", 5).unwrap();
        assert!((same - 1.0).abs() < 1e-9);

        let partial = builder.get_relatedness("lens", "light", 5).unwrap();
        assert!(partial > 0.0 && partial < 1.0);

        assert!(builder.get_relatedness("lens", "unknown", 5).is_none());
    }
}
