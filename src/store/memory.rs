use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{HistoryStore, StoreError};
use crate::models::{HistoryEntry, StoredDocument};

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryHistoryStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history_len(&self, document_id: &str) -> usize {
        self.documents
            .read()
            .await
            .get(document_id)
            .map_or(0, |doc| doc.history.len())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn find_by_document_id(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.documents.read().await.get(document_id).cloned())
    }

    async fn upsert_content_and_push_history(
        &self,
        document_id: &str,
        content: &Value,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .entry(document_id.to_string())
            .or_insert_with(|| StoredDocument::new(document_id));
        doc.content = content.clone();
        doc.updated_at = Utc::now();
        doc.history.push(entry.clone());
        debug!("Stored history entry {} for document {}", doc.history.len() - 1, document_id);
        Ok(())
    }

    async fn save(&self, document: &StoredDocument) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let stored = documents
            .entry(document.id.clone())
            .or_insert_with(|| StoredDocument {
                history: Vec::new(),
                ..document.clone()
            });
        stored.title = document.title.clone();
        stored.content = document.content.clone();
        stored.updated_at = document.updated_at;
        let known = stored.history.len();
        stored
            .history
            .extend(document.history.iter().skip(known).cloned());
        Ok(())
    }
}
