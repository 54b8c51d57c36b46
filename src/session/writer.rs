use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::engine::EngineCommand;
use super::restore::persist_restore;
use crate::models::HistoryEntry;
use crate::store::HistoryStore;

/// A durable write queued by the dispatcher in fire-and-forget mode.
#[derive(Debug)]
pub enum PersistJob {
    Edit {
        document_id: String,
        content: Value,
        entry: HistoryEntry,
    },
    Restore {
        document_id: String,
        user_id: String,
        version_index: usize,
        live_title: Option<String>,
    },
}

/// Sending half of the persistence queue.
///
/// One worker task drains the queue and awaits each write before starting
/// the next, so durable history grows in the order the dispatcher issued it.
#[derive(Clone, Debug)]
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<PersistJob>,
}

impl PersistenceWriter {
    /// Start the worker. Completed restores are posted back through `loopback`.
    pub fn spawn(store: Arc<dyn HistoryStore>, loopback: mpsc::WeakSender<EngineCommand>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(store.as_ref(), &loopback, job).await;
            }
            debug!("Persistence writer stopped");
        });

        Self { tx }
    }

    /// Queue a write without waiting for it.
    pub fn enqueue(&self, job: PersistJob) {
        if let Err(e) = self.tx.send(job) {
            error!("Persistence writer is gone, dropping {:?}", e.0);
        }
    }
}

async fn run_job(store: &dyn HistoryStore, loopback: &mpsc::WeakSender<EngineCommand>, job: PersistJob) {
    match job {
        PersistJob::Edit { document_id, content, entry } => {
            if let Err(e) = store
                .upsert_content_and_push_history(&document_id, &content, &entry)
                .await
            {
                error!("Error saving document {}: {}", document_id, e);
            }
        }
        PersistJob::Restore { document_id, user_id, version_index, live_title } => {
            let entry = match persist_restore(store, &document_id, &user_id, version_index, live_title).await {
                Ok(entry) => entry,
                Err(e) => {
                    e.log(&format!("restore-version for document {}", document_id));
                    return;
                }
            };
            let Some(dispatcher) = loopback.upgrade() else {
                warn!("Dispatcher gone before restore of {} could be applied", document_id);
                return;
            };
            let applied = EngineCommand::RestoreApplied { document_id, user_id, entry };
            if dispatcher.send(applied).await.is_err() {
                error!("Dispatcher closed before restore could be applied");
            }
        }
    }
}
