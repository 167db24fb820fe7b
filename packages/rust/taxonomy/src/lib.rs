//! The category taxonomy: a multi-parent, possibly cyclic category graph
//! reduced to a depth-consistent DAG rooted at a single category.
//!
//! Built once offline ([`CategoryGraph::build`]) and read-only afterwards.

pub mod build;
mod graph;

pub use build::BuildReport;
pub use graph::CategoryGraph;

#[cfg(test)]
mod tests {
    use super::*;
    use espm_shared::{
        CategoryId, CategoryPathNode, Concept, EspmError, RawCategory, UNASSIGNED_DEPTH,
    };
    use espm_storage::{CategoryStore, MemoryCategoryStore, MemoryConceptStore};

    fn raw(id: CategoryId, title: &str, children: &[&str]) -> RawCategory {
        RawCategory {
            id,
            title: title.into(),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn concept(id: i32, categories: &[&str]) -> Concept {
        Concept {
            id,
            title: format!("Concept {id}"),
            category_titles: categories.iter().map(|c| c.to_string()).collect(),
            inlink_ids: Default::default(),
            outlink_ids: Default::default(),
        }
    }

    /// Root(1) → Science(2), Arts(3); Science → Physics(4), Optics(5) and a
    /// back edge to Root; Arts → Optics, Junk(6, skipped), an unknown title;
    /// Physics → Optics (would skip a level).
    fn sample() -> (Vec<RawCategory>, MemoryConceptStore) {
        let categories = vec![
            raw(1, "Root", &["Science", "Arts"]),
            raw(2, "Science", &["Physics", "Optics", "Root"]),
            raw(3, "Arts", &["optics", "Junk", "Nonexistent"]),
            raw(4, "Physics", &["Optics"]),
            raw(5, "Optics", &[]),
            raw(6, "Junk", &[]),
        ];

        let mut concepts = MemoryConceptStore::new();
        concepts.insert(concept(100, &["Optics"]));
        concepts.insert(concept(101, &["Optics", "Physics"]));
        concepts.insert(concept(102, &["Arts", "Unknown category"]));
        concepts.insert(concept(103, &["optics", "Optics"]));
        (categories, concepts)
    }

    fn built() -> (CategoryGraph, BuildReport) {
        let (categories, concepts) = sample();
        let mut graph: CategoryGraph = CategoryGraph::default();
        let report = graph
            .build(&categories, &concepts, "Root", &["junk".to_string()])
            .expect("build taxonomy");
        (graph, report)
    }

    #[test]
    fn every_recorded_edge_goes_one_level_down() {
        let (graph, _) = built();
        for id in graph.store().category_ids() {
            let depth = graph.depth(id);
            for child in graph.child_ids(id) {
                assert_eq!(graph.depth(child), depth + 1, "edge {id} -> {child}");
            }
        }
    }

    #[test]
    fn bfs_assigns_first_arrival_depths() {
        let (graph, report) = built();
        assert_eq!(graph.root_id(), Some(1));
        assert_eq!(graph.depth(1), 0);
        assert_eq!(graph.depth(2), 1);
        assert_eq!(graph.depth(3), 1);
        assert_eq!(graph.depth(4), 2);
        assert_eq!(graph.depth(5), 2);
        assert_eq!(graph.depth(6), UNASSIGNED_DEPTH);
        assert_eq!(graph.depth(999), UNASSIGNED_DEPTH);

        assert_eq!(report.categories, 6);
        assert_eq!(report.visited, 5);
        assert_eq!(report.edges, 5);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.unresolved_children, 1);
    }

    #[test]
    fn cycles_and_level_skips_are_not_recorded() {
        let (graph, _) = built();
        assert!(graph.parent_ids(1).is_empty());
        assert!(graph.child_ids(4).is_empty());
        assert_eq!(graph.parent_ids(5), vec![2, 3]);
        assert!(graph.parent_ids(6).is_empty());
    }

    #[test]
    fn memberships_count_once_per_category() {
        let (graph, report) = built();
        assert_eq!(graph.concept_count(5), 3);
        assert_eq!(graph.concept_count(4), 1);
        assert_eq!(graph.concept_count(3), 1);
        assert_eq!(graph.concept_count(999), 0);
        assert_eq!(graph.category_ids_by_concept(101), vec![4, 5]);
        assert_eq!(report.memberships, 5);
        assert_eq!(report.unresolved_memberships, 1);
    }

    #[test]
    fn recursive_counts_duplicate_over_multiple_parents() {
        let (graph, report) = built();
        assert_eq!(report.leaves, 2);
        assert_eq!(graph.leaf_category_ids(), vec![4, 5]);

        assert_eq!(graph.recursive_concept_count(5), 3);
        assert_eq!(graph.recursive_concept_count(4), 1);
        // Science gets Optics (3) and Physics (1); Arts keeps its own 1.
        assert_eq!(graph.recursive_concept_count(2), 4);
        assert_eq!(graph.recursive_concept_count(3), 4);
        // Optics reaches Root twice.
        assert_eq!(graph.recursive_concept_count(1), 7);
    }

    #[test]
    fn diamond_counts_are_duplicated_not_divided() {
        let categories = vec![
            raw(1, "Root", &["A", "B"]),
            raw(2, "A", &["D"]),
            raw(3, "B", &["D"]),
            raw(4, "D", &[]),
        ];
        let mut concepts = MemoryConceptStore::new();
        for id in 0..5 {
            concepts.insert(concept(id, &["D"]));
        }
        concepts.insert(concept(10, &["A"]));
        concepts.insert(concept(11, &["B"]));
        concepts.insert(concept(12, &["B"]));

        let mut graph: CategoryGraph = CategoryGraph::default();
        graph.build(&categories, &concepts, "Root", &[]).unwrap();

        assert_eq!(graph.recursive_concept_count(4), 5);
        assert_eq!(graph.recursive_concept_count(2), 6);
        assert_eq!(graph.recursive_concept_count(3), 7);
        assert_eq!(graph.recursive_concept_count(1), 10);
    }

    #[test]
    fn paths_branch_at_multi_parent_nodes() {
        let (graph, _) = built();
        let paths = graph.get_paths(5);
        let node = |category_id, concept_count| CategoryPathNode {
            category_id,
            concept_count,
        };
        assert_eq!(
            paths,
            vec![
                vec![node(1, 0), node(2, 0), node(5, 3)],
                vec![node(1, 0), node(3, 1), node(5, 3)],
            ]
        );
        assert_eq!(graph.get_paths(1), vec![vec![node(1, 0)]]);
        assert!(graph.get_paths(6).is_empty());
        assert!(graph.get_paths(999).is_empty());
    }

    #[test]
    fn level_one_and_lookups() {
        let (graph, _) = built();
        assert_eq!(graph.level_one_category_ids(), vec![2, 3]);
        assert_eq!(graph.category_id("OPTICS"), Some(5));
        assert_eq!(graph.category_id("Nope"), None);
        assert_eq!(graph.title_or(999, "?"), "?");
        assert!(matches!(
            graph.require_category_id("Nope"),
            Err(EspmError::Missing { kind: "category", .. })
        ));
        assert!(graph.is_build_completed());
    }

    #[test]
    fn missing_root_fails_and_leaves_graph_incomplete() {
        let (categories, concepts) = sample();
        let mut graph = CategoryGraph::new(MemoryCategoryStore::new());
        let result = graph.build(&categories, &concepts, "Main topic classifications", &[]);
        assert!(matches!(result, Err(EspmError::Missing { .. })));
        assert!(!graph.is_build_completed());
    }
}
