use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Error as SqlxError, Postgres, Transaction};
use std::time::Duration;
use tracing::{error, info};

use crate::models::{HistoryEntry, StoredDocument, UNTITLED};
use crate::store::{HistoryStore, StoreError};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS collab_documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collab_history (
        document_id TEXT NOT NULL REFERENCES collab_documents(id),
        seq INTEGER NOT NULL,
        content JSONB NOT NULL,
        author_id TEXT NOT NULL,
        restored_from_index INTEGER,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (document_id, seq)
    )
    "#,
];

/// Document row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    content: Json<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// History row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    content: Json<Value>,
    author_id: String,
    restored_from_index: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            content: row.content.0,
            timestamp: row.created_at,
            author_id: row.author_id,
            restored_from_index: row.restored_from_index.map(|i| i as usize),
        }
    }
}

/// Postgres backed history store
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Create a new database connection pool and make sure the schema exists
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("History schema ready");

        Ok(Self { pool })
    }

    async fn begin(&self, document_id: &str) -> Result<Transaction<'static, Postgres>, SqlxError> {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "Writing document {}. Pool connections: {} idle, {} in use",
            document_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        match self.pool.begin().await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool for document {}: {}. Pool state: {} idle, {} total",
                    document_id,
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                Err(e)
            }
        }
    }

    /// Append one history entry at the next free sequence number.
    ///
    /// The caller must already hold the document row lock.
    async fn push_history(
        tx: &mut Transaction<'static, Postgres>,
        document_id: &str,
        entry: &HistoryEntry,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO collab_history (document_id, seq, content, author_id, restored_from_index, created_at)
            SELECT $1, COALESCE(MAX(seq) + 1, 0), $2, $3, $4, $5
            FROM collab_history
            WHERE document_id = $1
            "#,
        )
        .bind(document_id)
        .bind(Json(&entry.content))
        .bind(&entry.author_id)
        .bind(entry.restored_from_index.map(|i| i as i32))
        .bind(entry.timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn find_by_document_id(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let doc = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, title, content, created_at, updated_at
            FROM collab_documents
            WHERE id = $1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(doc) = doc else {
            return Ok(None);
        };

        let history = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT content, author_id, restored_from_index, created_at
            FROM collab_history
            WHERE document_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StoredDocument {
            id: doc.id,
            title: doc.title,
            content: doc.content.0,
            history: history.into_iter().map(HistoryEntry::from).collect(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }))
    }

    async fn upsert_content_and_push_history(
        &self,
        document_id: &str,
        content: &Value,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin(document_id).await?;
        let now = Utc::now();

        // ON CONFLICT DO UPDATE takes the row lock, which serializes seq allocation below
        sqlx::query(
            r#"
            INSERT INTO collab_documents (id, title, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (id) DO UPDATE
                SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(document_id)
        .bind(UNTITLED)
        .bind(Json(content))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::push_history(&mut tx, document_id, entry).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, document: &StoredDocument) -> Result<(), StoreError> {
        let mut tx = self.begin(&document.id).await?;

        sqlx::query(
            r#"
            INSERT INTO collab_documents (id, title, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET title = EXCLUDED.title, content = EXCLUDED.content, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(Json(&document.content))
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?;

        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collab_history WHERE document_id = $1")
            .bind(&document.id)
            .fetch_one(&mut *tx)
            .await?;

        for entry in document.history.iter().skip(known.max(0) as usize) {
            Self::push_history(&mut tx, &document.id, entry).await?;
        }

        tx.commit().await?;
        info!("Document '{}' saved with {} history entries", document.id, document.history.len());
        Ok(())
    }
}
