//! SQLite storage for annotations
//!
//! Persists the flat annotation collection, keeping its order in a
//! `position` column. Each update reads and rewrites the collection inside
//! one transaction, and updates from this process take turns.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{Executor, Transaction};
use tokio::sync::{broadcast, Mutex};

use super::store::{AnnotationStore, StoreChange, StoreEdit, StoreError};
use super::types::{Annotation, AnnotationKind, AnnotationTarget, TagRef};
use crate::page_url::normalize_url;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite-backed annotation store
pub struct SqliteStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
    writer: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url` and initialize the schema
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_error)?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // In-memory databases are per connection, so keep exactly one
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let store = Self::from_pool(pool);
        store.init().await.map_err(anyhow_error)?;
        Ok(store)
    }

    /// Wrap an existing pool; call [`init`](Self::init) before use
    pub fn from_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            changes,
            writer: Mutex::new(()),
        }
    }

    /// Initialize the annotations table
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_annotations (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                source_url TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                target_json TEXT NOT NULL,
                tags_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                notes TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_saved_annotations_source ON saved_annotations(source_url);
            CREATE INDEX IF NOT EXISTS idx_saved_annotations_position ON saved_annotations(position);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load<'e, E>(executor: E, page_url: Option<&str>) -> Result<Vec<Annotation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = match page_url {
            Some(url) => {
                sqlx::query_as::<_, AnnotationRow>(
                    r#"
                    SELECT id, source_url, title, target_json, tags_json,
                           metadata_json, notes, timestamp
                    FROM saved_annotations
                    WHERE source_url = ?
                    ORDER BY position ASC
                    "#,
                )
                .bind(normalize_url(url))
                .fetch_all(executor)
                .await?
            }
            None => {
                sqlx::query_as::<_, AnnotationRow>(
                    r#"
                    SELECT id, source_url, title, target_json, tags_json,
                           metadata_json, notes, timestamp
                    FROM saved_annotations
                    ORDER BY position ASC
                    "#,
                )
                .fetch_all(executor)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_annotation()).collect()
    }

    async fn replace_all(tx: &mut Transaction<'_, Sqlite>, annotations: &[Annotation]) -> Result<()> {
        sqlx::query("DELETE FROM saved_annotations")
            .execute(&mut **tx)
            .await?;

        for (position, annotation) in annotations.iter().enumerate() {
            let kind = match annotation.kind() {
                AnnotationKind::Text => "text",
                AnnotationKind::Image => "image",
            };
            let target_json = serde_json::to_string(&annotation.target)?;
            let tags_json = serde_json::to_string(&annotation.tags)?;
            let metadata_json = serde_json::to_string(&annotation.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO saved_annotations (
                    id, position, source_url, kind, title, target_json,
                    tags_json, metadata_json, notes, timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&annotation.id)
            .bind(position as i64)
            .bind(normalize_url(&annotation.source_url))
            .bind(kind)
            .bind(&annotation.title)
            .bind(&target_json)
            .bind(&tags_json)
            .bind(&metadata_json)
            .bind(&annotation.notes)
            .bind(annotation.timestamp.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn apply(&self, edit: StoreEdit<'_>) -> Result<Option<StoreChange>> {
        let mut tx = self.pool.begin().await?;
        let old = Self::load(&mut *tx, None).await?;
        let mut new = old.clone();
        if !edit(&mut new) {
            return Ok(None);
        }
        Self::replace_all(&mut tx, &new).await?;
        tx.commit().await?;
        Ok(Some(StoreChange { old, new }))
    }
}

#[async_trait]
impl AnnotationStore for SqliteStore {
    async fn get(&self, page_url: &str) -> Result<Vec<Annotation>, StoreError> {
        Self::load(&self.pool, Some(page_url)).await.map_err(anyhow_error)
    }

    async fn all(&self) -> Result<Vec<Annotation>, StoreError> {
        Self::load(&self.pool, None).await.map_err(anyhow_error)
    }

    async fn update(&self, edit: StoreEdit<'_>) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let Some(change) = self.apply(edit).await.map_err(anyhow_error)? else {
            return Ok(false);
        };
        tracing::debug!("Stored {} annotations", change.new.len());
        let _ = self.changes.send(change);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn anyhow_error(e: anyhow::Error) -> StoreError {
    match e.downcast::<serde_json::Error>() {
        Ok(json) => StoreError::Serialization(json),
        Err(other) => StoreError::Database(other.to_string()),
    }
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct AnnotationRow {
    id: String,
    source_url: String,
    title: String,
    target_json: String,
    tags_json: String,
    metadata_json: String,
    notes: Option<String>,
    timestamp: String,
}

impl AnnotationRow {
    fn into_annotation(self) -> Result<Annotation> {
        let target: AnnotationTarget = serde_json::from_str(&self.target_json)?;
        let tags: Vec<TagRef> = serde_json::from_str(&self.tags_json)?;
        let metadata: Vec<String> = serde_json::from_str(&self.metadata_json)?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)?.with_timezone(&Utc);

        Ok(Annotation {
            id: self.id,
            source_url: self.source_url,
            target,
            title: self.title,
            tags,
            metadata,
            notes: self.notes,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::TextAnchor;

    async fn setup_test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn text(url: &str, exact: &str) -> Annotation {
        Annotation::new_text(url, TextAnchor::from_text(exact))
    }

    #[tokio::test]
    async fn test_put_and_get_by_page() {
        let store = setup_test_store().await;

        let annotations = vec![
            text("https://ex.com/a#frag1", "first").with_title("annotation-1"),
            text("https://ex.com/b", "other"),
            text("https://ex.com/a#frag2", "second").with_tags(vec![TagRef::name("t")]),
        ];
        store.put(annotations.clone()).await.unwrap();

        let page = store.get("https://ex.com/a#whatever").await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content(), "first");
        assert_eq!(page[0].title, "annotation-1");
        assert_eq!(page[1].content(), "second");
        assert_eq!(page[1].tags, vec![TagRef::name("t")]);

        let all = store.all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        let expected: Vec<&str> = annotations.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_change_notification() {
        let store = setup_test_store().await;
        let mut changes = store.subscribe();

        let annotation = text("https://ex.com/a", "hello");
        store.append(annotation.clone()).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert!(change.old.is_empty());
        assert_eq!(change.new[0].id, annotation.id);
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("annotations.db").display());

        let annotation = text("https://ex.com/a", "kept");
        {
            let store = SqliteStore::connect(&url).await.unwrap();
            store.append(annotation.clone()).await.unwrap();
        }

        let reopened = SqliteStore::connect(&url).await.unwrap();
        let loaded = reopened.get("https://ex.com/a").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, annotation.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("annotations.db").display());
        let store = std::sync::Arc::new(SqliteStore::connect(&url).await.unwrap());

        let writers: Vec<_> = (0..16)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.append(text("https://ex.com/a", &format!("note {}", n))).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(store.get("https://ex.com/a").await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_unchanged_update_is_not_written() {
        let store = setup_test_store().await;
        let mut changes = store.subscribe();

        assert!(!store.remove("missing").await.unwrap());
        assert!(!store.update(Box::new(|_: &mut Vec<Annotation>| false)).await.unwrap());
        assert!(changes.try_recv().is_err());
    }
}
