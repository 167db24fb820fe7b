//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use espm_core::build::{BuildInputs, BuildOutcome, ProgressReporter, build_knowledge_base, load_miner};
use espm_core::pipeline::MiningResult;
use espm_shared::{AppConfig, MiningConfig, init_config, load_config, load_config_from};
use espm_storage::Storage;
use espm_taxonomy::CategoryGraph;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ESPM: mine diverse taxonomy paths that describe a text.
#[derive(Parser)]
#[command(
    name = "espm",
    version,
    about = "Explicit Semantic Path Mining over a Wikipedia-derived category taxonomy.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.espm/espm.toml).
    #[arg(long, global = true, env = "ESPM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Snapshot database path (overrides config).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Taxonomy namespace (overrides config).
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the taxonomy, concept cache and index snapshot from JSON-lines dumps.
    Build {
        /// Directory holding categories.jsonl, concepts.jsonl and terms.jsonl.
        #[arg(long)]
        input: PathBuf,

        /// Root category title (overrides config).
        #[arg(long)]
        root: Option<String>,
    },

    /// Mine semantic paths for a text.
    Tag {
        /// Text to tag. Reads --file or --batch when omitted.
        text: Option<String>,

        /// Read a single document from a file.
        #[arg(long, conflicts_with_all = ["text", "batch"])]
        file: Option<PathBuf>,

        /// Tag every line of a file as its own document (JSON-lines output).
        #[arg(long, conflicts_with = "text")]
        batch: Option<PathBuf>,

        /// Number of paths to keep (overrides config).
        #[arg(long)]
        top: Option<usize>,

        /// Per-document timeout in milliseconds (overrides config).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Concurrent documents in batch mode.
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Cosine relatedness of two texts.
    Relatedness {
        doc1: String,
        doc2: String,
    },

    /// List every root path to a category.
    Paths {
        /// Category title (case-insensitive).
        category: String,
    },

    /// List recorded build jobs.
    Jobs,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "espm=info",
        1 => "espm=debug",
        _ => "espm=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&cli).await,
        };
    }

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Build { input, root } => cmd_build(config, &input, root).await,
        Command::Tag {
            text,
            file,
            batch,
            top,
            timeout_ms,
            concurrency,
            json,
        } => {
            let mut mining = MiningConfig::from(&config);
            if let Some(top) = top {
                mining.top_paths = top;
            }
            if let Some(ms) = timeout_ms {
                mining.query_timeout_ms = ms;
            }
            match (text, file, batch) {
                (_, _, Some(batch)) => cmd_tag_batch(&config, mining, &batch, concurrency).await,
                (Some(text), _, _) => cmd_tag(&config, mining, &text, json).await,
                (None, Some(file), None) => {
                    let text = tokio::fs::read_to_string(&file)
                        .await
                        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
                    cmd_tag(&config, mining, &text, json).await
                }
                (None, None, None) => Err(eyre!("nothing to tag: pass TEXT, --file or --batch")),
            }
        }
        Command::Relatedness { doc1, doc2 } => cmd_relatedness(&config, &doc1, &doc2).await,
        Command::Paths { category } => cmd_paths(&config, &category).await,
        Command::Jobs => cmd_jobs(&config).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Load the config file and apply global flag overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(db) = &cli.db {
        config.storage.db_path = db.to_string_lossy().to_string();
    }
    if let Some(namespace) = &cli.namespace {
        config.storage.namespace = namespace.clone();
    }
    Ok(config)
}

async fn open_readonly(config: &AppConfig) -> Result<Storage> {
    let path = Path::new(&config.storage.db_path);
    Ok(Storage::open_readonly(path, &config.storage.namespace).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(mut config: AppConfig, input: &Path, root: Option<String>) -> Result<()> {
    if let Some(root) = root {
        config.taxonomy.root_title = root;
    }
    if !input.is_dir() {
        return Err(eyre!("input '{}' is not a directory", input.display()));
    }

    info!(
        input = %input.display(),
        db = %config.storage.db_path,
        namespace = %config.storage.namespace,
        "building knowledge base"
    );

    let storage = Storage::open(Path::new(&config.storage.db_path), &config.storage.namespace).await?;
    let reporter = CliProgress::new();
    let outcome = build_knowledge_base(
        &BuildInputs::from_dir(input),
        &config.taxonomy,
        &storage,
        &reporter,
    )
    .await?;

    println!();
    println!("  Knowledge base built!");
    println!("  Build:       {}", outcome.build_id);
    println!("  Namespace:   {}", config.storage.namespace);
    println!("  Categories:  {} ({} reached)", outcome.taxonomy.categories, outcome.taxonomy.visited);
    println!("  Edges:       {}", outcome.taxonomy.edges);
    println!("  Concepts:    {}", outcome.concepts);
    println!("  Memberships: {}", outcome.taxonomy.memberships);
    println!("  Terms:       {}", outcome.terms);
    println!("  Skipped:     {} malformed lines", outcome.skipped_lines);
    println!("  Time:        {:.1}s", outcome.elapsed_ms as f64 / 1000.0);
    println!();

    Ok(())
}

async fn cmd_tag(config: &AppConfig, mining: MiningConfig, text: &str, json: bool) -> Result<()> {
    let storage = open_readonly(config).await?;
    let miner = load_miner(&storage, mining).await?;
    let result = miner.mine(text)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

async fn cmd_tag_batch(
    config: &AppConfig,
    mining: MiningConfig,
    path: &Path,
    concurrency: usize,
) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
    let docs = batch_documents(&content);

    let storage = open_readonly(config).await?;
    let miner = Arc::new(load_miner(&storage, mining).await?);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    info!(documents = docs.len(), concurrency, "tagging batch");

    let mut handles = Vec::with_capacity(docs.len());
    for (line, doc) in docs {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let miner = Arc::clone(&miner);
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            miner.mine(&doc)
        });
        handles.push((line, handle));
    }

    for (line, handle) in handles {
        let record = match handle.await? {
            Ok(result) => serde_json::json!({ "line": line, "result": result }),
            Err(e) => {
                warn!(line, error = %e, "document failed");
                serde_json::json!({ "line": line, "error": e.to_string() })
            }
        };
        println!("{record}");
    }
    Ok(())
}

/// Non-blank lines of a batch file, paired with their 1-based line number.
fn batch_documents(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, l.to_string()))
        .collect()
}

fn print_result(result: &MiningResult) {
    if result.is_empty() {
        println!("No semantic paths found.");
        return;
    }

    println!();
    for (rank, path) in result.paths.iter().enumerate() {
        println!("  {:>2}. {:.4}  {}", rank + 1, path.score, path.display_path());
    }
    println!();
    for level in &result.levels {
        println!("  {:<32} {:>6.1}%", level.title, level.normalized * 100.0);
    }
    println!();
    println!(
        "  {} of {} candidates in {}ms",
        result.paths.len(),
        result.candidates,
        result.elapsed_ms
    );
    println!();
}

async fn cmd_relatedness(config: &AppConfig, doc1: &str, doc2: &str) -> Result<()> {
    let storage = open_readonly(config).await?;
    let miner = load_miner(&storage, MiningConfig::from(config)).await?;
    match miner.relatedness(doc1, doc2) {
        Some(score) => println!("{score:.6}"),
        None => println!("undefined"),
    }
    Ok(())
}

async fn cmd_paths(config: &AppConfig, category: &str) -> Result<()> {
    let storage = open_readonly(config).await?;
    let graph = CategoryGraph::new(storage.load_category_store().await?);
    let id = graph.require_category_id(category)?;

    let paths = graph.get_paths(id);
    if paths.is_empty() {
        println!("'{category}' is not connected to the root.");
        return Ok(());
    }
    for path in paths {
        let rendered: Vec<String> = path
            .iter()
            .map(|n| format!("{} ({})", graph.title_or(n.category_id, "?"), n.concept_count))
            .collect();
        println!("  {}", rendered.join(" / "));
    }
    Ok(())
}

async fn cmd_jobs(config: &AppConfig) -> Result<()> {
    let storage = open_readonly(config).await?;
    let jobs = storage.list_build_jobs().await?;
    if jobs.is_empty() {
        println!("No builds recorded for namespace '{}'.", config.storage.namespace);
        return Ok(());
    }
    for job in jobs {
        let finished = job
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unfinished".into());
        println!("  {}  started {}  {}", job.id, job.started_at.to_rfc3339(), finished);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn records_loaded(&self, kind: &str, count: usize) {
        self.spinner.set_message(format!("Loaded {count} {kind}"));
    }

    fn done(&self, _outcome: &BuildOutcome) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_documents_keep_file_line_numbers() {
        let docs = batch_documents("first doc\n\n   \nsecond doc\r\nthird doc\n");
        assert_eq!(
            docs,
            vec![
                (1, "first doc".to_string()),
                (4, "second doc".to_string()),
                (5, "third doc".to_string()),
            ]
        );
    }

    #[test]
    fn empty_batch_has_no_documents() {
        assert!(batch_documents("\n \n").is_empty());
    }
}
