pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{HistoryEntry, StoredDocument};

pub use memory::MemoryHistoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable read/write of a document's content and its full history.
///
/// The session engine only ever talks to persistence through this trait.
/// History is append-only: `save` may replace content and title but never
/// drops entries that are already stored.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load a document together with its complete history.
    ///
    /// Returns `Ok(None)` if the document has never been persisted.
    async fn find_by_document_id(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Set the current content and append one history entry, creating the
    /// document if needed.
    async fn upsert_content_and_push_history(
        &self,
        document_id: &str,
        content: &Value,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Write back a whole document. Entries past the stored history length
    /// are appended.
    async fn save(&self, document: &StoredDocument) -> Result<(), StoreError>;
}
