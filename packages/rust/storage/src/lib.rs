//! Storage layer for ESPM: capability traits, in-memory stores, and a
//! libSQL snapshot database.
//!
//! The offline build writes into the in-memory stores, then [`Storage`]
//! persists them. Query serving loads the snapshot back into memory once
//! and shares it read-only.
//!
//! **Access rules:**
//! - build job: read-write (sole writer) via [`Storage::open`]
//! - query serving: read-only via [`Storage::open_readonly`]
//!
//! Every row is scoped by the namespace given at open time, so several
//! taxonomies can live in one database file.

mod memory;
mod migrations;
mod store;

use std::path::Path;

use chrono::Utc;
use espm_shared::{BuildId, BuildJob, Category, Concept, EspmError, Posting, Result};
use libsql::{Connection, Database, params};

pub use memory::{MemoryCategoryStore, MemoryConceptIndex, MemoryConceptStore};
pub use store::{CategoryStore, ConceptIndex, ConceptStore};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    namespace: String,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path, namespace: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EspmError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(EspmError::storage)?;

        let conn = db.connect().map_err(EspmError::storage)?;

        let storage = Self {
            db,
            conn,
            namespace: namespace.to_string(),
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path, namespace: &str) -> Result<Self> {
        if !path.exists() {
            return Err(EspmError::missing("database", path.display().to_string()));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(EspmError::storage)?;

        let conn = db.connect().map_err(EspmError::storage)?;

        Ok(Self {
            db,
            conn,
            namespace: namespace.to_string(),
            readonly: true,
        })
    }

    /// The namespace all reads and writes are scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EspmError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(EspmError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Taxonomy snapshot
    // -----------------------------------------------------------------------

    /// Clear the namespace's completion flag so a half-written snapshot is
    /// never served. Only [`Self::save_category_store`] sets it again.
    pub async fn mark_build_incomplete(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE taxonomy_meta SET build_completed = 0, updated_at = ?1 WHERE namespace = ?2",
                params![Utc::now().to_rfc3339(), self.namespace.as_str()],
            )
            .await
            .map_err(EspmError::storage)?;
        Ok(())
    }

    /// Replace the namespace's taxonomy with the contents of `store`.
    pub async fn save_category_store(&self, store: &MemoryCategoryStore) -> Result<()> {
        self.check_writable()?;
        let ns = self.namespace.as_str();
        let tx = self.conn.transaction().await.map_err(EspmError::storage)?;

        for table in ["categories", "category_edges", "category_concepts", "taxonomy_meta"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE namespace = ?1"),
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;
        }

        let mut edges = 0usize;
        for category in store.categories() {
            tx.execute(
                "INSERT INTO categories (namespace, id, title, title_key, depth, direct_count, recursive_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ns,
                    i64::from(category.id),
                    category.title.as_str(),
                    category.title.trim().to_lowercase(),
                    i64::from(category.depth),
                    i64::from(category.direct_concept_count),
                    i64::from(category.recursive_concept_count),
                ],
            )
            .await
            .map_err(EspmError::storage)?;

            for &child in &category.child_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO category_edges (namespace, parent_id, child_id)
                     VALUES (?1, ?2, ?3)",
                    params![ns, i64::from(category.id), i64::from(child)],
                )
                .await
                .map_err(EspmError::storage)?;
                edges += 1;
            }
        }

        for (concept, category) in store.memberships() {
            tx.execute(
                "INSERT OR IGNORE INTO category_concepts (namespace, concept_id, category_id)
                 VALUES (?1, ?2, ?3)",
                params![ns, i64::from(concept), i64::from(category)],
            )
            .await
            .map_err(EspmError::storage)?;
        }

        tx.execute(
            "INSERT INTO taxonomy_meta (namespace, root_id, build_completed, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                ns,
                store.root_id().map(i64::from),
                i64::from(store.build_completed()),
                Utc::now().to_rfc3339(),
            ],
        )
        .await
        .map_err(EspmError::storage)?;

        tx.commit().await.map_err(EspmError::storage)?;
        tracing::info!(
            namespace = ns,
            categories = store.len(),
            edges,
            "taxonomy snapshot saved"
        );
        Ok(())
    }

    /// Load the namespace's taxonomy into a fresh in-memory store.
    pub async fn load_category_store(&self) -> Result<MemoryCategoryStore> {
        let ns = self.namespace.as_str();
        let mut store = MemoryCategoryStore::new();

        let mut rows = self
            .conn
            .query(
                "SELECT id, title, depth, direct_count, recursive_count
                 FROM categories WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let mut category = Category::new(get_i32(&row, 0)?, get_string(&row, 1)?);
            category.depth = get_i32(&row, 2)?;
            category.direct_concept_count = get_i32(&row, 3)?;
            category.recursive_concept_count = get_i32(&row, 4)?;
            if !store.insert_record(category) {
                return Err(EspmError::validation(format!(
                    "duplicate category in snapshot namespace '{ns}'"
                )));
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT parent_id, child_id FROM category_edges WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let (parent, child) = (get_i32(&row, 0)?, get_i32(&row, 1)?);
            if !store.add_edge(parent, child) {
                tracing::warn!(parent, child, "dangling edge in snapshot, skipping");
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT concept_id, category_id FROM category_concepts WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            store.add_membership(get_i32(&row, 0)?, get_i32(&row, 1)?);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT root_id, build_completed FROM taxonomy_meta WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        if let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            if let Ok(root) = row.get::<i64>(0) {
                store.set_root_id(to_i32(root)?);
            }
            store.set_build_completed(row.get::<i64>(1).unwrap_or(0) != 0);
        }

        tracing::debug!(namespace = ns, categories = store.len(), "taxonomy snapshot loaded");
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Concept cache snapshot
    // -----------------------------------------------------------------------

    /// Replace the namespace's concept cache with the contents of `store`.
    pub async fn save_concept_store(&self, store: &MemoryConceptStore) -> Result<()> {
        self.check_writable()?;
        let ns = self.namespace.as_str();
        let tx = self.conn.transaction().await.map_err(EspmError::storage)?;

        for table in ["concepts", "concept_category_titles", "concept_links"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE namespace = ?1"),
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;
        }

        for concept in store.concepts() {
            let id = i64::from(concept.id);
            tx.execute(
                "INSERT INTO concepts (namespace, id, title) VALUES (?1, ?2, ?3)",
                params![ns, id, concept.title.as_str()],
            )
            .await
            .map_err(EspmError::storage)?;

            for title in &concept.category_titles {
                tx.execute(
                    "INSERT OR IGNORE INTO concept_category_titles (namespace, concept_id, title)
                     VALUES (?1, ?2, ?3)",
                    params![ns, id, title.as_str()],
                )
                .await
                .map_err(EspmError::storage)?;
            }

            let outgoing = concept.outlink_ids.iter().map(|&to| (id, i64::from(to)));
            let incoming = concept.inlink_ids.iter().map(|&from| (i64::from(from), id));
            for (from, to) in outgoing.chain(incoming) {
                tx.execute(
                    "INSERT OR IGNORE INTO concept_links (namespace, from_id, to_id)
                     VALUES (?1, ?2, ?3)",
                    params![ns, from, to],
                )
                .await
                .map_err(EspmError::storage)?;
            }
        }

        tx.commit().await.map_err(EspmError::storage)?;
        tracing::info!(namespace = ns, concepts = store.len(), "concept cache saved");
        Ok(())
    }

    /// Load the namespace's concept cache. Links come back mirrored.
    pub async fn load_concept_store(&self) -> Result<MemoryConceptStore> {
        let ns = self.namespace.as_str();
        let mut concepts: std::collections::HashMap<i32, Concept> =
            std::collections::HashMap::new();

        let mut rows = self
            .conn
            .query(
                "SELECT id, title FROM concepts WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let id = get_i32(&row, 0)?;
            concepts.insert(
                id,
                Concept {
                    id,
                    title: get_string(&row, 1)?,
                    category_titles: Default::default(),
                    inlink_ids: Default::default(),
                    outlink_ids: Default::default(),
                },
            );
        }

        let mut rows = self
            .conn
            .query(
                "SELECT concept_id, title FROM concept_category_titles WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            if let Some(c) = concepts.get_mut(&get_i32(&row, 0)?) {
                c.category_titles.insert(get_string(&row, 1)?);
            }
        }

        let mut rows = self
            .conn
            .query(
                "SELECT from_id, to_id FROM concept_links WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let (from, to) = (get_i32(&row, 0)?, get_i32(&row, 1)?);
            if let Some(c) = concepts.get_mut(&from) {
                c.outlink_ids.insert(to);
            }
            if let Some(c) = concepts.get_mut(&to) {
                c.inlink_ids.insert(from);
            }
        }

        let mut store = MemoryConceptStore::new();
        for concept in concepts.into_values() {
            store.insert(concept);
        }
        tracing::debug!(namespace = ns, concepts = store.len(), "concept cache loaded");
        Ok(store)
    }

    // -----------------------------------------------------------------------
    // Concept index snapshot
    // -----------------------------------------------------------------------

    /// Replace the namespace's inverted index with the contents of `index`.
    pub async fn save_concept_index(&self, index: &MemoryConceptIndex) -> Result<()> {
        self.check_writable()?;
        let ns = self.namespace.as_str();
        let tx = self.conn.transaction().await.map_err(EspmError::storage)?;

        for table in ["terms", "postings"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE namespace = ?1"),
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;
        }

        for (term, idf, postings) in index.terms() {
            tx.execute(
                "INSERT INTO terms (namespace, term, idf) VALUES (?1, ?2, ?3)",
                params![ns, term, f64::from(idf)],
            )
            .await
            .map_err(EspmError::storage)?;

            for posting in postings {
                tx.execute(
                    "INSERT OR REPLACE INTO postings (namespace, term, concept_id, tfidf)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        ns,
                        term,
                        i64::from(posting.concept_id),
                        f64::from(posting.tfidf)
                    ],
                )
                .await
                .map_err(EspmError::storage)?;
            }
        }

        tx.commit().await.map_err(EspmError::storage)?;
        tracing::info!(namespace = ns, terms = index.term_count(), "concept index saved");
        Ok(())
    }

    /// Load the namespace's inverted index.
    pub async fn load_concept_index(&self) -> Result<MemoryConceptIndex> {
        let ns = self.namespace.as_str();
        let mut terms: std::collections::HashMap<String, (f32, Vec<Posting>)> =
            std::collections::HashMap::new();

        let mut rows = self
            .conn
            .query(
                "SELECT term, idf FROM terms WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let idf = row.get::<f64>(1).map_err(EspmError::storage)? as f32;
            terms.insert(get_string(&row, 0)?, (idf, Vec::new()));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT term, concept_id, tfidf FROM postings WHERE namespace = ?1",
                params![ns],
            )
            .await
            .map_err(EspmError::storage)?;

        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let term = get_string(&row, 0)?;
            let posting = Posting {
                concept_id: get_i32(&row, 1)?,
                tfidf: row.get::<f64>(2).map_err(EspmError::storage)? as f32,
            };
            match terms.get_mut(&term) {
                Some((_, postings)) => postings.push(posting),
                None => tracing::warn!(term, "posting without term row, skipping"),
            }
        }

        let mut index = MemoryConceptIndex::new();
        for (term, (idf, postings)) in terms {
            index.insert_term(&term, idf, postings);
        }
        tracing::debug!(namespace = ns, terms = index.term_count(), "concept index loaded");
        Ok(index)
    }

    // -----------------------------------------------------------------------
    // Build job operations
    // -----------------------------------------------------------------------

    /// Record the start of a build job. Returns the generated job ID.
    pub async fn insert_build_job(&self) -> Result<BuildId> {
        self.check_writable()?;
        let id = BuildId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO build_jobs (id, namespace, started_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), self.namespace.as_str(), now.as_str()],
            )
            .await
            .map_err(EspmError::storage)?;
        Ok(id)
    }

    /// Update a build job with completion data.
    pub async fn finish_build_job(&self, id: &BuildId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE build_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, id.to_string()],
            )
            .await
            .map_err(EspmError::storage)?;
        Ok(())
    }

    /// List the namespace's build jobs, newest first.
    pub async fn list_build_jobs(&self) -> Result<Vec<BuildJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, stats_json FROM build_jobs
                 WHERE namespace = ?1 ORDER BY started_at DESC",
                params![self.namespace.as_str()],
            )
            .await
            .map_err(EspmError::storage)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(EspmError::storage)? {
            let id: BuildId = get_string(&row, 0)?
                .parse()
                .map_err(|e| EspmError::Storage(format!("invalid build id: {e}")))?;
            let finished_at = match row.get::<String>(2).ok() {
                Some(s) => Some(parse_timestamp(&s)?),
                None => None,
            };
            let stats = row
                .get::<String>(3)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok());
            jobs.push(BuildJob {
                id,
                namespace: self.namespace.clone(),
                started_at: parse_timestamp(&get_string(&row, 1)?)?,
                finished_at,
                stats,
            });
        }
        Ok(jobs)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(EspmError::storage)
}

fn get_i32(row: &libsql::Row, idx: i32) -> Result<i32> {
    to_i32(row.get::<i64>(idx).map_err(EspmError::storage)?)
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| EspmError::Storage(format!("id out of range: {value}")))
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EspmError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use espm_shared::RawTerm;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> (Storage, std::path::PathBuf) {
        let tmp = std::env::temp_dir().join(format!("espm_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp, "test").await.expect("open test db");
        (storage, tmp)
    }

    fn sample_taxonomy() -> MemoryCategoryStore {
        let mut store = MemoryCategoryStore::new();
        store.insert_category(1, "Root");
        store.insert_category(2, "Science");
        store.insert_category(3, "Physics");
        store.add_edge(1, 2);
        store.add_edge(2, 3);
        store.set_depth(1, 0);
        store.set_depth(2, 1);
        store.set_depth(3, 2);
        store.add_membership(100, 3);
        store.set_direct_concept_count(3, 1);
        store.set_recursive_concept_count(3, 1);
        store.set_recursive_concept_count(2, 1);
        store.set_root_id(1);
        store.set_build_completed(true);
        store
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let (storage, _) = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("espm_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp, "test").await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp, "test").await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn taxonomy_snapshot_roundtrip() {
        let (storage, _) = test_storage().await;
        storage
            .save_category_store(&sample_taxonomy())
            .await
            .expect("save taxonomy");

        let loaded = storage.load_category_store().await.expect("load taxonomy");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.root_id(), Some(1));
        assert!(loaded.build_completed());
        assert_eq!(loaded.child_ids(2), vec![3]);
        assert_eq!(loaded.parent_ids(3), vec![2]);
        assert_eq!(loaded.depth(3), Some(2));
        assert_eq!(loaded.category_id("physics"), Some(3));
        assert_eq!(loaded.category_ids_by_concept(100), vec![3]);
        assert_eq!(loaded.recursive_concept_count(2), Some(1));
    }

    #[tokio::test]
    async fn saving_twice_replaces_previous_snapshot() {
        let (storage, _) = test_storage().await;
        storage.save_category_store(&sample_taxonomy()).await.unwrap();

        let mut smaller = MemoryCategoryStore::new();
        smaller.insert_category(1, "Root");
        smaller.set_root_id(1);
        storage.save_category_store(&smaller).await.unwrap();

        let loaded = storage.load_category_store().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.build_completed());
    }

    #[tokio::test]
    async fn marking_incomplete_clears_only_own_namespace() {
        let (storage, tmp) = test_storage().await;
        storage.save_category_store(&sample_taxonomy()).await.unwrap();
        let other = Storage::open(&tmp, "other").await.unwrap();
        other.save_category_store(&sample_taxonomy()).await.unwrap();

        storage.mark_build_incomplete().await.unwrap();

        let loaded = storage.load_category_store().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!loaded.build_completed());
        assert!(other.load_category_store().await.unwrap().build_completed());

        // A fresh taxonomy save sets the flag again.
        storage.save_category_store(&sample_taxonomy()).await.unwrap();
        assert!(storage.load_category_store().await.unwrap().build_completed());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let tmp = std::env::temp_dir().join(format!("espm_test_{}.db", Uuid::now_v7()));
        let a = Storage::open(&tmp, "a").await.unwrap();
        a.save_category_store(&sample_taxonomy()).await.unwrap();
        drop(a);

        let b = Storage::open(&tmp, "b").await.unwrap();
        let loaded = b.load_category_store().await.unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.root_id(), None);
    }

    #[tokio::test]
    async fn concept_store_roundtrip_mirrors_links() {
        let (storage, _) = test_storage().await;
        let mut store = MemoryConceptStore::new();
        store.insert(Concept {
            id: 1,
            title: "Lens".into(),
            category_titles: ["Optics".to_string()].into_iter().collect(),
            inlink_ids: Default::default(),
            outlink_ids: [2].into_iter().collect(),
        });
        store.insert(Concept {
            id: 2,
            title: "Light".into(),
            category_titles: Default::default(),
            inlink_ids: Default::default(),
            outlink_ids: Default::default(),
        });

        storage.save_concept_store(&store).await.expect("save concepts");
        let loaded = storage.load_concept_store().await.expect("load concepts");

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.concept_title(1).as_deref(), Some("Lens"));
        assert_eq!(loaded.category_titles(1), vec!["Optics".to_string()]);
        assert_eq!(loaded.outlink_ids(1), vec![2]);
        assert_eq!(loaded.inlink_ids(2), vec![1]);
    }

    #[tokio::test]
    async fn concept_index_roundtrip() {
        let (storage, _) = test_storage().await;
        let mut index = MemoryConceptIndex::new();
        index.insert_raw(RawTerm {
            term: "lens".into(),
            idf: 1.5,
            postings: vec![(1, 0.25), (2, 0.75)],
        });

        storage.save_concept_index(&index).await.expect("save index");
        let loaded = storage.load_concept_index().await.expect("load index");

        assert_eq!(loaded.term_count(), 1);
        assert!((loaded.idf("lens").unwrap() - 1.5).abs() < 1e-6);
        let postings = loaded.postings("lens");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].concept_id, 2);
    }

    #[tokio::test]
    async fn build_job_lifecycle() {
        let (storage, _) = test_storage().await;
        let id = storage.insert_build_job().await.expect("insert build job");
        storage
            .finish_build_job(&id, r#"{"categories": 3}"#)
            .await
            .expect("finish build job");

        let jobs = storage.list_build_jobs().await.expect("list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert!(jobs[0].finished_at.is_some());
        assert_eq!(jobs[0].stats.as_ref().unwrap()["categories"], 3);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("espm_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp, "test").await.unwrap();
        rw.save_category_store(&sample_taxonomy()).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp, "test").await.unwrap();
        assert_eq!(ro.load_category_store().await.unwrap().len(), 3);
        let result = ro.save_category_store(&MemoryCategoryStore::new()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("espm_missing_{}.db", Uuid::now_v7()));
        let result = Storage::open_readonly(&tmp, "test").await;
        assert!(matches!(result, Err(EspmError::Missing { .. })));
    }
}
