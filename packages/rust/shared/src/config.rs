//! Application configuration for ESPM.
//!
//! User config lives at `~/.espm/espm.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EspmError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "espm.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".espm";

// ---------------------------------------------------------------------------
// Config structs (matching espm.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Snapshot database location and namespace.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Taxonomy build settings.
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,

    /// Concept vector settings.
    #[serde(default)]
    pub esa: EsaConfig,

    /// Path selection settings.
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL snapshot database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Namespace every stored row is scoped to. Several taxonomies
    /// (e.g. different wiki dumps) can share one database file.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            namespace: default_namespace(),
        }
    }
}

fn default_db_path() -> String {
    "var/espm.db".into()
}
fn default_namespace() -> String {
    "enwiki".into()
}

/// `[taxonomy]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Title of the category the depth BFS starts from.
    #[serde(default = "default_root_title")]
    pub root_title: String,

    /// Degenerate categories excluded from the edge relation.
    #[serde(default = "default_skip_titles")]
    pub skip_titles: Vec<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            root_title: default_root_title(),
            skip_titles: default_skip_titles(),
        }
    }
}

fn default_root_title() -> String {
    "Main topic classifications".into()
}
fn default_skip_titles() -> Vec<String> {
    vec![
        "Hidden categories".into(),
        "Container categories".into(),
        "Tracking categories".into(),
        "Wikipedia categories".into(),
        "Wikipedia administration".into(),
    ]
}

/// `[esa]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsaConfig {
    /// How many top concepts feed the category aggregation.
    #[serde(default = "default_concept_limit")]
    pub concept_limit: usize,

    /// Scale of the inlink reinforcement vector.
    #[serde(default = "default_link_alpha")]
    pub link_alpha: f32,

    /// Whether combined vectors include inlink reinforcement.
    #[serde(default = "default_true")]
    pub link_reinforcement: bool,

    /// Tokens shorter than this (in chars) are dropped.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

impl Default for EsaConfig {
    fn default() -> Self {
        Self {
            concept_limit: default_concept_limit(),
            link_alpha: default_link_alpha(),
            link_reinforcement: true,
            min_token_len: default_min_token_len(),
        }
    }
}

fn default_concept_limit() -> usize {
    100
}
fn default_link_alpha() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_min_token_len() -> usize {
    2
}

/// `[selection]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Maximum number of paths returned per text.
    #[serde(default = "default_top_paths")]
    pub top_paths: usize,

    /// Two paths with a redundancy probability above this are connected.
    #[serde(default = "default_redundancy_threshold")]
    pub redundancy_threshold: f64,

    /// Per-query time budget in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Normalize category scores to sum to 1 before propagation.
    #[serde(default = "default_true")]
    pub normalize_scores: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_paths: default_top_paths(),
            redundancy_threshold: default_redundancy_threshold(),
            query_timeout_ms: default_query_timeout_ms(),
            normalize_scores: true,
        }
    }
}

fn default_top_paths() -> usize {
    20
}
fn default_redundancy_threshold() -> f64 {
    0.7
}
fn default_query_timeout_ms() -> u64 {
    5_000
}

// ---------------------------------------------------------------------------
// Mining config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime mining configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct MiningConfig {
    /// Top concepts considered per query.
    pub concept_limit: usize,
    /// Inlink reinforcement scale.
    pub link_alpha: f32,
    /// Whether inlink reinforcement is applied.
    pub link_reinforcement: bool,
    /// Minimum token length for the default tokenizer.
    pub min_token_len: usize,
    /// Paths returned per query.
    pub top_paths: usize,
    /// Edge threshold of the redundancy graph.
    pub redundancy_threshold: f64,
    /// Per-query time budget.
    pub query_timeout_ms: u64,
    /// Normalize category scores to sum to 1.
    pub normalize_scores: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MiningConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concept_limit: config.esa.concept_limit,
            link_alpha: config.esa.link_alpha,
            link_reinforcement: config.esa.link_reinforcement,
            min_token_len: config.esa.min_token_len,
            top_paths: config.selection.top_paths,
            redundancy_threshold: config.selection.redundancy_threshold,
            query_timeout_ms: config.selection.query_timeout_ms,
            normalize_scores: config.selection.normalize_scores,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.espm/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EspmError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.espm/espm.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EspmError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| EspmError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EspmError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| EspmError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EspmError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the mining pipeline cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.storage.namespace.trim().is_empty() {
        return Err(EspmError::config("storage.namespace must not be empty"));
    }
    if config.taxonomy.root_title.trim().is_empty() {
        return Err(EspmError::config("taxonomy.root_title must not be empty"));
    }
    let threshold = config.selection.redundancy_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EspmError::config(format!(
            "selection.redundancy_threshold must be within [0, 1], got {threshold}"
        )));
    }
    if config.esa.concept_limit == 0 {
        return Err(EspmError::config("esa.concept_limit must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("root_title"));
        assert!(toml_str.contains("Main topic classifications"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.selection.top_paths, 20);
        assert_eq!(parsed.storage.namespace, "enwiki");
        assert!((parsed.esa.link_alpha - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[taxonomy]
root_title = "Contents"

[selection]
top_paths = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.taxonomy.root_title, "Contents");
        assert!(!config.taxonomy.skip_titles.is_empty());
        assert_eq!(config.selection.top_paths, 5);
        assert!((config.selection.redundancy_threshold - 0.7).abs() < 1e-12);
        assert_eq!(config.esa.concept_limit, 100);
    }

    #[test]
    fn mining_config_from_app_config() {
        let app = AppConfig::default();
        let mining = MiningConfig::from(&app);
        assert_eq!(mining.top_paths, 20);
        assert_eq!(mining.query_timeout_ms, 5_000);
        assert!(mining.link_reinforcement);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = AppConfig::default();
        config.selection.redundancy_threshold = 1.5;
        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("redundancy_threshold"));
    }
}
