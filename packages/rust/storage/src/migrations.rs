//! SQL migration definitions for the ESPM snapshot database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: taxonomy, concept cache, concept index",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-namespace taxonomy state
CREATE TABLE IF NOT EXISTS taxonomy_meta (
    namespace       TEXT PRIMARY KEY,
    root_id         INTEGER,
    build_completed INTEGER NOT NULL DEFAULT 0,
    updated_at      TEXT NOT NULL
);

-- Category nodes
CREATE TABLE IF NOT EXISTS categories (
    namespace       TEXT NOT NULL,
    id              INTEGER NOT NULL,
    title           TEXT NOT NULL,
    title_key       TEXT NOT NULL,
    depth           INTEGER NOT NULL DEFAULT -1,
    direct_count    INTEGER NOT NULL DEFAULT 0,
    recursive_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (namespace, id),
    UNIQUE (namespace, title_key)
);

-- Recorded parent -> child edges (depth-consistent only)
CREATE TABLE IF NOT EXISTS category_edges (
    namespace TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    child_id  INTEGER NOT NULL,
    PRIMARY KEY (namespace, parent_id, child_id)
);

CREATE INDEX IF NOT EXISTS idx_category_edges_child ON category_edges(namespace, child_id);

-- Resolved concept <-> category membership
CREATE TABLE IF NOT EXISTS category_concepts (
    namespace   TEXT NOT NULL,
    concept_id  INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    PRIMARY KEY (namespace, concept_id, category_id)
);

-- Concept cache
CREATE TABLE IF NOT EXISTS concepts (
    namespace TEXT NOT NULL,
    id        INTEGER NOT NULL,
    title     TEXT NOT NULL,
    PRIMARY KEY (namespace, id)
);

CREATE TABLE IF NOT EXISTS concept_category_titles (
    namespace  TEXT NOT NULL,
    concept_id INTEGER NOT NULL,
    title      TEXT NOT NULL,
    PRIMARY KEY (namespace, concept_id, title)
);

-- Article link graph; inlinks are the reverse direction
CREATE TABLE IF NOT EXISTS concept_links (
    namespace TEXT NOT NULL,
    from_id   INTEGER NOT NULL,
    to_id     INTEGER NOT NULL,
    PRIMARY KEY (namespace, from_id, to_id)
);

CREATE INDEX IF NOT EXISTS idx_concept_links_to ON concept_links(namespace, to_id);

-- ESA inverted index
CREATE TABLE IF NOT EXISTS terms (
    namespace TEXT NOT NULL,
    term      TEXT NOT NULL,
    idf       REAL NOT NULL,
    PRIMARY KEY (namespace, term)
);

CREATE TABLE IF NOT EXISTS postings (
    namespace  TEXT NOT NULL,
    term       TEXT NOT NULL,
    concept_id INTEGER NOT NULL,
    tfidf      REAL NOT NULL,
    PRIMARY KEY (namespace, term, concept_id)
);

-- Offline build history
CREATE TABLE IF NOT EXISTS build_jobs (
    id          TEXT PRIMARY KEY,
    namespace   TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_build_jobs_namespace ON build_jobs(namespace);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
