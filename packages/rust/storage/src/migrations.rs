//! SQL migration definitions for the page graph database.
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
    vec![Migration {
        version: 1,
        description: "Initial schema: pages, keywords, keyword_relationships",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per URL; the id of the first save is kept
CREATE TABLE IF NOT EXISTS pages (
    id            TEXT PRIMARY KEY,
    url           TEXT NOT NULL UNIQUE,
    domain        TEXT NOT NULL,
    status        TEXT NOT NULL,
    title         TEXT,
    content_hash  TEXT,
    quality       REAL NOT NULL DEFAULT 0,
    relevance     REAL NOT NULL DEFAULT 0,
    metadata_json TEXT NOT NULL,
    errors_json   TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    processed_at  TEXT,
    updated_at    TEXT NOT NULL,
    save_count    INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain);

-- Canonical keywords per page
CREATE TABLE IF NOT EXISTS keywords (
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    score   REAL NOT NULL,
    PRIMARY KEY (page_id, keyword)
);

CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON keywords(keyword);

-- Directed edges between a page's keywords
CREATE TABLE IF NOT EXISTS keyword_relationships (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id       TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    source        TEXT NOT NULL,
    target        TEXT NOT NULL,
    kind          TEXT NOT NULL,
    confidence    REAL NOT NULL,
    metadata_json TEXT,
    UNIQUE (page_id, source, target, kind)
);

CREATE INDEX IF NOT EXISTS idx_relationships_page ON keyword_relationships(page_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
