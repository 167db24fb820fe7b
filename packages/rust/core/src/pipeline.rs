//! End-to-end query pipeline: text → concept vector → category scores →
//! path tree → candidate paths → selected paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument};

use espm_esa::ConceptVectorBuilder;
use espm_shared::{EspmError, LevelWeight, MiningConfig, Result, TaggedNode, TaggedPath};
use espm_storage::{CategoryStore, MemoryCategoryStore};
use espm_taxonomy::CategoryGraph;

use crate::aggregator::CategoryScoreAggregator;
use crate::path_tree::{PathTree, SemanticPath};
use crate::selector::PathSelector;

/// Output of one [`SemanticPathMiner::mine`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MiningResult {
    /// Selected paths, best first.
    pub paths: Vec<TaggedPath>,
    /// Level-one distribution of the query's path tree.
    pub levels: Vec<LevelWeight>,
    /// Number of candidate paths before selection.
    pub candidates: usize,
    pub elapsed_ms: u64,
}

impl MiningResult {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Query-time entry point. Holds the shared read-only taxonomy and vector
/// builder; every call to [`Self::mine`] owns its own tree and selector.
pub struct SemanticPathMiner<S: CategoryStore = MemoryCategoryStore> {
    graph: Arc<CategoryGraph<S>>,
    vectors: Arc<ConceptVectorBuilder>,
    config: MiningConfig,
}

impl<S: CategoryStore> SemanticPathMiner<S> {
    /// Refuses graphs whose build did not complete.
    pub fn new(
        graph: Arc<CategoryGraph<S>>,
        vectors: Arc<ConceptVectorBuilder>,
        config: MiningConfig,
    ) -> Result<Self> {
        if !graph.is_build_completed() {
            return Err(EspmError::BuildIncomplete);
        }
        Ok(Self {
            graph,
            vectors,
            config,
        })
    }

    pub fn graph(&self) -> &CategoryGraph<S> {
        &self.graph
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    /// Mine the top diverse category paths for `text`.
    ///
    /// Texts without any vocabulary hit, or whose concepts resolve to no
    /// category, give an empty result rather than an error.
    #[instrument(skip_all, fields(len = text.len()))]
    pub fn mine(&self, text: &str) -> Result<MiningResult> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.query_timeout_ms);

        let Some(cv) = self
            .vectors
            .get_combined_vector(text, self.config.concept_limit)
        else {
            debug!("no concept vector");
            return Ok(self.empty(started));
        };

        let scores = CategoryScoreAggregator::new(
            self.config.concept_limit,
            self.config.normalize_scores,
        )
        .aggregate(&cv, self.graph.as_ref(), self.vectors.concepts());
        if scores.is_empty() {
            debug!(concepts = cv.len(), "no category resolved");
            return Ok(self.empty(started));
        }

        let mut tree = PathTree::new(self.graph.as_ref()).with_deadline(started, deadline);
        for (&category, &score) in &scores {
            tree.add_leaf_node(category, score)?;
        }
        tree.adjust()?;

        let candidates = tree.get_filtered_semantic_paths()?;
        let candidate_count = candidates.len();
        let selected = PathSelector::new(self.config.redundancy_threshold).select(
            candidates,
            self.config.top_paths,
            Some((started, deadline)),
        )?;

        let result = MiningResult {
            paths: selected.iter().map(|p| self.tag(p)).collect(),
            levels: tree.get_level_distribution(),
            candidates: candidate_count,
            elapsed_ms: elapsed_ms(started),
        };
        info!(
            concepts = cv.len(),
            categories = scores.len(),
            tree_nodes = tree.len(),
            candidates = candidate_count,
            selected = result.paths.len(),
            elapsed_ms = result.elapsed_ms,
            "mined semantic paths"
        );
        Ok(result)
    }

    /// Cosine relatedness of two texts; `None` when either has no vector.
    pub fn relatedness(&self, doc1: &str, doc2: &str) -> Option<f64> {
        self.vectors
            .get_relatedness(doc1, doc2, self.config.concept_limit)
    }

    fn tag(&self, path: &SemanticPath) -> TaggedPath {
        TaggedPath {
            nodes: path
                .nodes
                .iter()
                .map(|&(category_id, weight)| TaggedNode {
                    category_id,
                    title: self.graph.title_or(category_id, ""),
                    weight,
                })
                .collect(),
            score: path.score,
        }
    }

    fn empty(&self, started: Instant) -> MiningResult {
        MiningResult {
            elapsed_ms: elapsed_ms(started),
            ..MiningResult::default()
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use espm_shared::{Concept, ConceptId, RawCategory, RawTerm};
    use espm_storage::{MemoryConceptIndex, MemoryConceptStore};

    pub(crate) fn raw_categories() -> Vec<RawCategory> {
        let raw = |id, title: &str, children: &[&str]| RawCategory {
            id,
            title: title.into(),
            children: children.iter().map(|c| c.to_string()).collect(),
        };
        vec![
            raw(1, "Root", &["Science", "Arts"]),
            raw(2, "Science", &["Optics", "Physics"]),
            raw(3, "Arts", &["Painting"]),
            raw(4, "Optics", &[]),
            raw(5, "Physics", &[]),
            raw(6, "Painting", &[]),
        ]
    }

    pub(crate) fn concepts() -> MemoryConceptStore {
        let mut store = MemoryConceptStore::new();
        let mut add = |id: ConceptId, title: &str, cats: &[&str]| {
            store.insert(Concept {
                id,
                title: title.into(),
                category_titles: cats.iter().map(|c| c.to_string()).collect(),
                inlink_ids: Default::default(),
                outlink_ids: Default::default(),
            });
        };
        add(10, "Lens", &["Optics"]);
        add(11, "Light", &["Optics", "Physics"]);
        add(12, "Canvas", &["Painting"]);
        store
    }

    pub(crate) fn index() -> MemoryConceptIndex {
        let mut index = MemoryConceptIndex::new();
        for (term, postings) in [
            ("lens", vec![(10, 0.9)]),
            ("light", vec![(11, 0.8)]),
            ("canvas", vec![(12, 1.0)]),
        ] {
            index.insert_raw(RawTerm {
                term: term.into(),
                idf: 1.0,
                postings,
            });
        }
        index
    }

    fn miner(config: MiningConfig) -> Result<SemanticPathMiner> {
        let concepts = concepts();
        let mut graph: CategoryGraph = CategoryGraph::default();
        graph.build(&raw_categories(), &concepts, "Root", &[])?;
        let vectors = ConceptVectorBuilder::new(Arc::new(index()), Arc::new(concepts));
        SemanticPathMiner::new(Arc::new(graph), Arc::new(vectors), config)
    }

    fn titles(path: &TaggedPath) -> Vec<&str> {
        path.nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn single_topic_yields_single_path() {
        let miner = miner(MiningConfig::default()).unwrap();
        let result = miner.mine("a lens").unwrap();

        assert_eq!(result.paths.len(), 1);
        assert_eq!(titles(&result.paths[0]), vec!["Root", "Science", "Optics"]);
        assert_eq!(result.paths[0].display_path(), "Root/Science/Optics");
        assert_eq!(result.candidates, 1);
    }

    #[test]
    fn distinct_topics_are_both_selected() {
        let miner = miner(MiningConfig::default()).unwrap();
        let result = miner.mine("lens canvas").unwrap();

        let mut terminals: Vec<_> = result
            .paths
            .iter()
            .filter_map(|p| p.nodes.last().map(|n| n.title.clone()))
            .collect();
        terminals.sort();
        assert_eq!(terminals, vec!["Optics", "Painting"]);
        assert!(result.paths[0].score >= result.paths[1].score);

        let levels: Vec<_> = result.levels.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(levels, vec!["Science", "Arts"]);
        let total: f64 = result.levels.iter().map(|l| l.normalized).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn redundant_siblings_collapse_to_one() {
        let miner = miner(MiningConfig::default()).unwrap();
        let result = miner.mine("lens light").unwrap();
        // Optics and Physics share Root/Science.
        assert_eq!(result.candidates, 2);
        assert_eq!(result.paths.len(), 1);
    }

    #[test]
    fn unknown_text_is_empty_not_an_error() {
        let miner = miner(MiningConfig::default()).unwrap();
        let result = miner.mine("nothing to see here").unwrap();
        assert!(result.is_empty());
        assert!(result.levels.is_empty());
    }

    #[test]
    fn incomplete_graph_is_refused() {
        let vectors = ConceptVectorBuilder::new(Arc::new(index()), Arc::new(concepts()));
        let result = SemanticPathMiner::new(
            Arc::new(CategoryGraph::<MemoryCategoryStore>::default()),
            Arc::new(vectors),
            MiningConfig::default(),
        );
        assert!(matches!(result, Err(EspmError::BuildIncomplete)));
    }

    #[test]
    fn zero_timeout_fails_with_timeout() {
        let config = MiningConfig {
            query_timeout_ms: 0,
            ..MiningConfig::default()
        };
        let miner = miner(config).unwrap();
        assert!(matches!(
            miner.mine("lens"),
            Err(EspmError::Timeout { .. })
        ));
    }

    #[test]
    fn relatedness_delegates_to_vectors() {
        let miner = miner(MiningConfig::default()).unwrap();
        assert!((miner.relatedness("lens", "lens").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(miner.relatedness("lens", "canvas"), Some(0.0));
        assert!(miner.relatedness("lens", "zzz").is_none());
    }
}
