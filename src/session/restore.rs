use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use super::broadcast::encode;
use super::engine::SessionEngine;
use super::error::EngineError;
use super::writer::PersistJob;
use crate::config::WriteAckMode;
use crate::models::{
    ContentUpdateMessage, FetchHistoryMessage, HistoryEntry, HistoryMessage, RestoreVersionMessage, SendMessage,
};
use crate::store::{HistoryStore, StoreError};

/// Persist a restore: read the full durable history, copy the snapshot at
/// `version_index` forward as a new entry and make it the current content.
/// Past entries are never rewritten.
///
/// The restored entry is appended with its own upsert rather than through
/// `save`, so a write landing between the read and the append still leaves
/// exactly one new restored entry at the end of the history.
pub async fn persist_restore(
    store: &dyn HistoryStore,
    document_id: &str,
    user_id: &str,
    version_index: usize,
    live_title: Option<String>,
) -> Result<HistoryEntry, EngineError> {
    let mut document = store
        .find_by_document_id(document_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;

    let len = document.history.len();
    let Some(source) = document.history.get(version_index) else {
        return Err(EngineError::OutOfRangeRestore { index: version_index, len });
    };
    let entry = HistoryEntry::restored(source.content.clone(), user_id, version_index);

    if let Some(title) = live_title {
        document.title = title;
        document.content = entry.content.clone();
        document.updated_at = Utc::now();
        store.save(&document).await?;
    }
    store
        .upsert_content_and_push_history(document_id, &entry.content, &entry)
        .await?;

    info!("Restored document {} to version {} for user {}", document_id, version_index, user_id);
    Ok(entry)
}

impl SessionEngine {
    pub(crate) async fn restore_version(&mut self, msg: RestoreVersionMessage) -> Result<(), EngineError> {
        let RestoreVersionMessage { document_id, user_id, version_index } = msg;
        let live_title = self.registry.get(&document_id).map(|s| s.title.clone());

        match self.write_ack {
            WriteAckMode::Acknowledged => {
                let entry =
                    persist_restore(self.store.as_ref(), &document_id, &user_id, version_index, live_title).await?;
                self.apply_restore(&document_id, &user_id, entry);
            }
            WriteAckMode::FireAndForget => {
                // queued behind earlier edits so the index matches what clients saw
                self.writer.enqueue(PersistJob::Restore {
                    document_id,
                    user_id,
                    version_index,
                    live_title,
                });
            }
        }
        Ok(())
    }

    /// Bring the live session in line with a persisted restore and announce
    /// it as an ordinary update to every participant.
    pub(crate) fn apply_restore(&mut self, document_id: &str, user_id: &str, entry: HistoryEntry) {
        let Some(session) = self.registry.get_mut(document_id) else {
            debug!("Restore of {} persisted with no live session", document_id);
            return;
        };
        let content = entry.content.clone();
        session.content = content.clone();
        session.push_history(entry);

        let update = SendMessage::Update(ContentUpdateMessage {
            sender: user_id.to_string(),
            content,
        });
        self.broadcast(document_id, &update, None);
    }

    /// Reply to the requesting connection only, from the durable store.
    pub(crate) fn fetch_history(&mut self, connection_id: &str, msg: FetchHistoryMessage) -> Result<(), EngineError> {
        let Some(outbound) = self.connections.outbound(connection_id) else {
            debug!("History requested by unknown connection {}", connection_id);
            return Ok(());
        };
        let store: Arc<dyn HistoryStore> = self.store.clone();
        let document_id = msg.document_id;
        tokio::spawn(async move {
            let history = match store.find_by_document_id(&document_id).await {
                Ok(Some(document)) => document.history,
                Ok(None) => Vec::new(),
                Err(e) => {
                    error!("Error fetching history for {}: {}", document_id, e);
                    return;
                }
            };
            let Some(text) = encode(&SendMessage::History(HistoryMessage { history })) else {
                return;
            };
            // a closed connection is reaped by the next broadcast
            if outbound.send(text).is_err() {
                debug!("History for {} not delivered, connection closed", document_id);
            }
        });
        Ok(())
    }
}
