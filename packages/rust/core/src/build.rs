//! Offline knowledge-base build and query-time loading.
//!
//! The build reads three JSON-lines files produced by the dump job
//! (categories, concepts, index terms), runs the taxonomy build jobs and
//! snapshots everything into [`Storage`]. [`load_miner`] reverses that for
//! query serving.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument, warn};

use espm_esa::{ConceptVectorBuilder, LinkOptions, WordTokenizer};
use espm_shared::{
    BuildId, EspmError, MiningConfig, RawCategory, RawConcept, RawTerm, Result, TaxonomyConfig,
};
use espm_storage::{ConceptIndex, ConceptStore, MemoryConceptIndex, MemoryConceptStore, Storage};
use espm_taxonomy::{BuildReport, CategoryGraph};

use crate::pipeline::SemanticPathMiner;

/// Locations of the build input files.
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub categories: PathBuf,
    pub concepts: PathBuf,
    pub terms: PathBuf,
}

impl BuildInputs {
    /// `categories.jsonl`, `concepts.jsonl` and `terms.jsonl` under `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            categories: dir.join("categories.jsonl"),
            concepts: dir.join("concepts.jsonl"),
            terms: dir.join("terms.jsonl"),
        }
    }
}

/// Summary of a finished build, stored as the build job's stats.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub build_id: BuildId,
    pub taxonomy: BuildReport,
    pub concepts: usize,
    pub terms: usize,
    pub mirrored_links: usize,
    pub skipped_lines: usize,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after an input file has been read.
    fn records_loaded(&self, kind: &str, count: usize);
    /// Called when the build completes.
    fn done(&self, outcome: &BuildOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn records_loaded(&self, _kind: &str, _count: usize) {}
    fn done(&self, _outcome: &BuildOutcome) {}
}

/// Run the full offline build into `storage`.
///
/// 1. Load the concept cache and mirror its links
/// 2. Load the inverted index
/// 3. Load categories and run the taxonomy build jobs
/// 4. Snapshot all three stores and close the build job
///
/// A failed build still closes its job, with `{"error": ...}` as stats.
#[instrument(skip_all, fields(namespace = storage.namespace(), root = %taxonomy.root_title))]
pub async fn build_knowledge_base(
    inputs: &BuildInputs,
    taxonomy: &TaxonomyConfig,
    storage: &Storage,
    progress: &dyn ProgressReporter,
) -> Result<BuildOutcome> {
    let build_id = storage.insert_build_job().await?;
    info!(%build_id, "starting build");

    match run_build(&build_id, inputs, taxonomy, storage, progress).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            warn!(%build_id, error = %e, "build failed");
            let stats = serde_json::json!({ "error": e.to_string() }).to_string();
            if let Err(finish_err) = storage.finish_build_job(&build_id, &stats).await {
                warn!(%build_id, error = %finish_err, "failed to record build failure");
            }
            Err(e)
        }
    }
}

async fn run_build(
    build_id: &BuildId,
    inputs: &BuildInputs,
    taxonomy: &TaxonomyConfig,
    storage: &Storage,
    progress: &dyn ProgressReporter,
) -> Result<BuildOutcome> {
    let start = Instant::now();

    // --- Phase 1: Concepts ---
    progress.phase("Loading concepts");
    let (raw_concepts, skipped_concepts) = read_jsonl::<RawConcept>(&inputs.concepts).await?;
    progress.records_loaded("concepts", raw_concepts.len());
    let mut concepts = MemoryConceptStore::new();
    for raw in raw_concepts {
        concepts.insert(raw.into());
    }
    let mirrored_links = concepts.mirror_links();

    // --- Phase 2: Concept index ---
    progress.phase("Loading concept index");
    let (raw_terms, skipped_terms) = read_jsonl::<RawTerm>(&inputs.terms).await?;
    progress.records_loaded("terms", raw_terms.len());
    let mut index = MemoryConceptIndex::new();
    for raw in raw_terms {
        index.insert_raw(raw);
    }

    // --- Phase 3: Taxonomy ---
    progress.phase("Building taxonomy");
    let (raw_categories, skipped_categories) =
        read_jsonl::<RawCategory>(&inputs.categories).await?;
    progress.records_loaded("categories", raw_categories.len());
    let mut graph: CategoryGraph = CategoryGraph::default();
    let report = graph.build(
        &raw_categories,
        &concepts,
        &taxonomy.root_title,
        &taxonomy.skip_titles,
    )?;

    // --- Phase 4: Snapshot ---
    // The taxonomy save is last: its commit is the only write that marks
    // the namespace as built.
    progress.phase("Saving snapshot");
    storage.mark_build_incomplete().await?;
    storage.save_concept_store(&concepts).await?;
    storage.save_concept_index(&index).await?;
    storage.save_category_store(graph.store()).await?;

    let outcome = BuildOutcome {
        build_id: build_id.clone(),
        taxonomy: report,
        concepts: concepts.len(),
        terms: index.term_count(),
        mirrored_links,
        skipped_lines: skipped_concepts + skipped_terms + skipped_categories,
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    let stats = serde_json::to_string(&outcome)
        .map_err(|e| EspmError::parse(format!("failed to encode build stats: {e}")))?;
    storage.finish_build_job(build_id, &stats).await?;

    progress.done(&outcome);
    info!(
        %build_id,
        categories = outcome.taxonomy.categories,
        concepts = outcome.concepts,
        terms = outcome.terms,
        skipped_lines = outcome.skipped_lines,
        elapsed_ms = outcome.elapsed_ms,
        "build complete"
    );
    Ok(outcome)
}

/// Load the namespace's snapshot and assemble a query-ready miner.
pub async fn load_miner(storage: &Storage, config: MiningConfig) -> Result<SemanticPathMiner> {
    let categories = storage.load_category_store().await?;
    let concepts = storage.load_concept_store().await?;
    let index = storage.load_concept_index().await?;

    let vectors = ConceptVectorBuilder::new(Arc::new(index), Arc::new(concepts))
        .with_tokenizer(Box::new(WordTokenizer::new(config.min_token_len)))
        .with_link_options(LinkOptions::from(&config));

    SemanticPathMiner::new(
        Arc::new(CategoryGraph::new(categories)),
        Arc::new(vectors),
        config,
    )
}

/// Parse one record per non-blank line. Malformed lines are logged and
/// counted, not fatal.
async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| EspmError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let mut records = Vec::new();
    let mut skipped = 0;
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.map_err(|e| EspmError::io(path, e))? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(path = %path.display(), line = line_no, error = %e, "malformed record, skipping");
                skipped += 1;
            }
        }
    }
    Ok((records, skipped))
}
