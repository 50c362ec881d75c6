//! libSQL-backed graph store for processed pages.
//!
//! [`GraphStore`] persists a page record together with its canonical
//! keywords and the relationships between them. Pages are keyed by URL:
//! saving the same URL again replaces the record's contents but keeps the
//! id assigned on first save.

mod migrations;

use std::path::Path;

use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use pagegraph_shared::{
    KeywordRelationship, Page, PageStore, PipelineError, RelationshipKind, Result, StoredId,
};

/// Page metadata keys promoted to columns.
const TITLE_KEY: &str = "metadata.title";
const CONTENT_HASH_KEY: &str = "content.hash";

fn storage_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Storage(e.to_string())
}

/// A stored page row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPage {
    pub id: String,
    pub url: String,
    pub domain: String,
    pub status: String,
    pub title: Option<String>,
    pub content_hash: Option<String>,
    pub quality: f64,
    pub relevance: f64,
    pub processed_at: Option<String>,
    pub updated_at: String,
    /// How many times this URL has been saved.
    pub save_count: u32,
}

/// Primary storage handle wrapping a libSQL database.
pub struct GraphStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes multi-statement saves.
    write_lock: Mutex<()>,
}

impl GraphStore {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
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
                        PipelineError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Upsert a page with its keywords and relationships.
    ///
    /// Keywords and relationships are replaced wholesale, so re-saving a page
    /// never duplicates them.
    #[instrument(skip_all, fields(url = page.url()))]
    pub async fn save_page(&self, page: &Page) -> Result<StoredId> {
        let metadata_json = serde_json::to_string(&page.metadata).map_err(storage_err)?;
        let errors_json = serde_json::to_string(&page.errors).map_err(storage_err)?;
        let page_id = page.id.to_string();

        let _guard = self.write_lock.lock().await;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        tx.execute(
            "INSERT INTO pages (id, url, domain, status, title, content_hash, quality, relevance,
                                metadata_json, errors_json, discovered_at, processed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(url) DO UPDATE SET
               domain = excluded.domain,
               status = excluded.status,
               title = excluded.title,
               content_hash = excluded.content_hash,
               quality = excluded.quality,
               relevance = excluded.relevance,
               metadata_json = excluded.metadata_json,
               errors_json = excluded.errors_json,
               processed_at = excluded.processed_at,
               updated_at = excluded.updated_at,
               save_count = pages.save_count + 1",
            params![
                page_id.as_str(),
                page.url(),
                page.domain(),
                page.status().as_str(),
                page.meta_str(TITLE_KEY),
                page.meta_str(CONTENT_HASH_KEY),
                page.metrics.quality,
                page.metrics.relevance,
                metadata_json,
                errors_json,
                page.discovered_at.to_rfc3339(),
                page.processed_at.map(|t| t.to_rfc3339()),
                page.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(storage_err)?;

        let stored_id = {
            let mut rows = tx
                .query("SELECT id FROM pages WHERE url = ?1", params![page.url()])
                .await
                .map_err(storage_err)?;
            match rows.next().await.map_err(storage_err)? {
                Some(row) => row.get::<String>(0).map_err(storage_err)?,
                None => return Err(PipelineError::Storage("upserted page not found".into())),
            }
        };

        tx.execute(
            "DELETE FROM keywords WHERE page_id = ?1",
            params![stored_id.as_str()],
        )
        .await
        .map_err(storage_err)?;
        tx.execute(
            "DELETE FROM keyword_relationships WHERE page_id = ?1",
            params![stored_id.as_str()],
        )
        .await
        .map_err(storage_err)?;

        for (keyword, score) in &page.keywords {
            tx.execute(
                "INSERT INTO keywords (page_id, keyword, score) VALUES (?1, ?2, ?3)",
                params![stored_id.as_str(), keyword.as_str(), *score],
            )
            .await
            .map_err(storage_err)?;
        }

        for rel in &page.relationships {
            let metadata = if rel.metadata.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&rel.metadata).map_err(storage_err)?)
            };
            tx.execute(
                "INSERT OR REPLACE INTO keyword_relationships
                    (page_id, source, target, kind, confidence, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored_id.as_str(),
                    rel.source.as_str(),
                    rel.target.as_str(),
                    rel.kind.as_str(),
                    rel.confidence,
                    metadata,
                ],
            )
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;

        debug!(
            id = %stored_id,
            keywords = page.keywords.len(),
            relationships = page.relationships.len(),
            "page saved"
        );
        Ok(StoredId(stored_id))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Look up a page row by URL.
    pub async fn get_page_by_url(&self, url: &str) -> Result<Option<StoredPage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, domain, status, title, content_hash, quality, relevance,
                        processed_at, updated_at, save_count
                 FROM pages WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_stored_page(&row)?)),
            None => Ok(None),
        }
    }

    /// Keywords of a page, highest score first.
    pub async fn list_keywords(&self, page_id: &str) -> Result<Vec<(String, f64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT keyword, score FROM keywords WHERE page_id = ?1
                 ORDER BY score DESC, keyword ASC",
                params![page_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<f64>(1).map_err(storage_err)?,
            ));
        }
        Ok(results)
    }

    /// Relationships of a page, ordered by `(source, target, kind)`.
    pub async fn list_relationships(&self, page_id: &str) -> Result<Vec<KeywordRelationship>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source, target, kind, confidence, metadata_json
                 FROM keyword_relationships WHERE page_id = ?1
                 ORDER BY source, target, kind",
                params![page_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let kind: String = row.get(2).map_err(storage_err)?;
            let kind: RelationshipKind =
                serde_json::from_value(serde_json::Value::String(kind)).map_err(storage_err)?;
            let metadata = match row.get::<String>(4).ok() {
                Some(json) => serde_json::from_str(&json).map_err(storage_err)?,
                None => Default::default(),
            };
            results.push(KeywordRelationship {
                source: row.get(0).map_err(storage_err)?,
                target: row.get(1).map_err(storage_err)?,
                kind,
                confidence: row.get(3).map_err(storage_err)?,
                metadata,
            });
        }
        Ok(results)
    }

    /// Number of distinct pages stored.
    pub async fn count_pages(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM pages", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(storage_err),
            None => Ok(0),
        }
    }
}

impl PageStore for GraphStore {
    async fn save(&self, page: &Page) -> Result<StoredId> {
        self.save_page(page).await
    }
}

fn row_to_stored_page(row: &libsql::Row) -> Result<StoredPage> {
    Ok(StoredPage {
        id: row.get(0).map_err(storage_err)?,
        url: row.get(1).map_err(storage_err)?,
        domain: row.get(2).map_err(storage_err)?,
        status: row.get(3).map_err(storage_err)?,
        title: row.get::<String>(4).ok(),
        content_hash: row.get::<String>(5).ok(),
        quality: row.get(6).map_err(storage_err)?,
        relevance: row.get(7).map_err(storage_err)?,
        processed_at: row.get::<String>(8).ok(),
        updated_at: row.get(9).map_err(storage_err)?,
        save_count: row.get(10).map_err(storage_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> GraphStore {
        let tmp = std::env::temp_dir().join(format!("pg_test_{}.db", Uuid::now_v7()));
        GraphStore::open(&tmp).await.expect("open test db")
    }

    fn sample_page(url: &str) -> Page {
        let mut page = Page::new(url, "<html></html>").unwrap();
        page.metadata
            .insert(TITLE_KEY.into(), serde_json::json!("Neural Networks"));
        page.metadata
            .insert(CONTENT_HASH_KEY.into(), serde_json::json!("abc123"));
        page.keywords.insert("neural networks".into(), 1.0);
        page.keywords.insert("deep learning".into(), 0.8);
        page.relationships.push(KeywordRelationship {
            source: "deep learning".into(),
            target: "neural networks".into(),
            kind: RelationshipKind::Related,
            confidence: 0.4,
            metadata: BTreeMap::from([("shared_sentences".into(), serde_json::json!(1))]),
        });
        page.metrics.quality = 0.9;
        page
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.get_schema_version().await, 1);
        assert_eq!(store.count_pages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("pg_test_{}.db", Uuid::now_v7()));
        let first = GraphStore::open(&tmp).await.unwrap();
        drop(first);
        let second = GraphStore::open(&tmp).await.expect("reopen");
        assert_eq!(second.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn save_and_read_back() {
        let store = test_store().await;
        let page = sample_page("https://example.com/nn");

        let id = store.save(&page).await.expect("save");
        assert_eq!(id.0, page.id.to_string());

        let row = store
            .get_page_by_url(page.url())
            .await
            .unwrap()
            .expect("row");
        assert_eq!(row.domain, "example.com");
        assert_eq!(row.title.as_deref(), Some("Neural Networks"));
        assert_eq!(row.content_hash.as_deref(), Some("abc123"));
        assert_eq!(row.status, "discovered");
        assert!((row.quality - 0.9).abs() < 1e-9);

        let keywords = store.list_keywords(&id.0).await.unwrap();
        assert_eq!(
            keywords,
            vec![("neural networks".to_string(), 1.0), ("deep learning".to_string(), 0.8)]
        );

        let rels = store.list_relationships(&id.0).await.unwrap();
        assert_eq!(rels, page.relationships);
    }

    #[tokio::test]
    async fn resave_keeps_first_id_without_duplicates() {
        let store = test_store().await;
        let first = sample_page("https://example.com/nn");
        let first_id = store.save(&first).await.unwrap();

        // A new Page object for the same URL, with different keywords.
        let mut second = sample_page("https://example.com/nn");
        second.keywords.remove("deep learning");
        second.relationships.clear();
        let second_id = store.save(&second).await.unwrap();
        store.save(&second).await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(store.count_pages().await.unwrap(), 1);
        assert_eq!(store.list_keywords(&first_id.0).await.unwrap().len(), 1);
        assert!(store.list_relationships(&first_id.0).await.unwrap().is_empty());

        let row = store.get_page_by_url(first.url()).await.unwrap().unwrap();
        assert_eq!(row.save_count, 3);
    }

    #[tokio::test]
    async fn missing_url_is_none() {
        let store = test_store().await;
        assert!(
            store
                .get_page_by_url("https://nowhere.example/")
                .await
                .unwrap()
                .is_none()
        );
    }
}
