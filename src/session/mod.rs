//! Real-time collaboration session engine.
//!
//! All session state lives in one [`SessionEngine`] driven by a single
//! dispatcher task. Transports talk to it through an [`EngineHandle`].

pub mod broadcast;
pub mod dispatcher;
pub mod edit;
pub mod engine;
pub mod error;
pub mod presence;
pub mod registry;
pub mod restore;
pub mod writer;

pub use dispatcher::{spawn_dispatcher, DispatcherClosed, EngineHandle};
pub use engine::{EngineCommand, EngineSettings, EngineStats, SessionEngine};
pub use error::EngineError;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::engine::{EngineCommand, EngineSettings, SessionEngine};
    use crate::config::WriteAckMode;
    use crate::models::*;
    use crate::store::{HistoryStore, MemoryHistoryStore, StoreError};

    /// Engine wired to an in-memory store, driven one command at a time.
    pub struct Harness {
        pub engine: SessionEngine,
        pub store: Arc<MemoryHistoryStore>,
        loopback_rx: mpsc::Receiver<EngineCommand>,
        _loopback_tx: mpsc::Sender<EngineCommand>,
    }

    impl Harness {
        pub fn new(mode: WriteAckMode) -> Self {
            let store = Arc::new(MemoryHistoryStore::new());
            Self::build(mode, store.clone(), store)
        }

        pub fn with_store(mode: WriteAckMode, store: Arc<dyn HistoryStore>) -> Self {
            Self::build(mode, store, Arc::new(MemoryHistoryStore::new()))
        }

        fn build(mode: WriteAckMode, store: Arc<dyn HistoryStore>, memory: Arc<MemoryHistoryStore>) -> Self {
            let (tx, rx) = mpsc::channel(64);
            let settings = EngineSettings {
                history_limit: 50,
                write_ack: mode,
            };
            Self {
                engine: SessionEngine::new(settings, store, tx.downgrade()),
                store: memory,
                loopback_rx: rx,
                _loopback_tx: tx,
            }
        }

        pub async fn connect(&mut self, id: &str) -> FakeClient {
            let (tx, rx) = mpsc::unbounded_channel();
            self.engine
                .handle_command(EngineCommand::Connect {
                    connection_id: id.to_string(),
                    outbound: tx,
                })
                .await;
            FakeClient { id: id.to_string(), rx }
        }

        pub async fn disconnect(&mut self, id: &str) {
            self.engine
                .handle_command(EngineCommand::Disconnect { connection_id: id.to_string() })
                .await;
        }

        pub async fn send(&mut self, id: &str, message: ReceivedMessage) {
            self.engine
                .handle_command(EngineCommand::Inbound {
                    connection_id: id.to_string(),
                    message,
                })
                .await;
        }

        /// Feed the next self-addressed command back into the engine.
        pub async fn pump_loopback(&mut self) {
            let command = self.loopback_rx.recv().await.expect("loopback closed");
            self.engine.handle_command(command).await;
        }

        /// Let spawned store writes run to completion.
        pub async fn settle(&self) {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
        }
    }

    pub struct FakeClient {
        pub id: String,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl FakeClient {
        pub fn drain(&mut self) -> Vec<SendMessage> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(serde_json::from_str(&frame).expect("server sent invalid json"));
            }
            out
        }

        pub async fn next_history(&mut self) -> Vec<HistoryEntry> {
            loop {
                let frame = self.rx.recv().await.expect("connection closed");
                if let SendMessage::History(m) = serde_json::from_str(&frame).unwrap() {
                    return m.history;
                }
            }
        }
    }

    pub struct FailingStore;

    #[async_trait]
    impl HistoryStore for FailingStore {
        async fn find_by_document_id(&self, _: &str) -> Result<Option<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn upsert_content_and_push_history(&self, _: &str, _: &Value, _: &HistoryEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn save(&self, _: &StoredDocument) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    /// Memory store whose first upsert stalls, so later writes could overtake it.
    pub struct SlowFirstWriteStore {
        inner: MemoryHistoryStore,
        delay: Duration,
        stalled: AtomicBool,
    }

    impl SlowFirstWriteStore {
        pub fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryHistoryStore::new(),
                delay,
                stalled: AtomicBool::new(false),
            }
        }

        /// Poll until `len` history entries are stored, then return the document.
        pub async fn wait_for_history(&self, document_id: &str, len: usize) -> StoredDocument {
            for _ in 0..100 {
                if self.inner.history_len(document_id).await >= len {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.inner
                .find_by_document_id(document_id)
                .await
                .unwrap()
                .expect("document never persisted")
        }
    }

    #[async_trait]
    impl HistoryStore for SlowFirstWriteStore {
        async fn find_by_document_id(&self, document_id: &str) -> Result<Option<StoredDocument>, StoreError> {
            self.inner.find_by_document_id(document_id).await
        }

        async fn upsert_content_and_push_history(
            &self,
            document_id: &str,
            content: &Value,
            entry: &HistoryEntry,
        ) -> Result<(), StoreError> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.upsert_content_and_push_history(document_id, content, entry).await
        }

        async fn save(&self, document: &StoredDocument) -> Result<(), StoreError> {
            self.inner.save(document).await
        }
    }

    pub fn join_msg(document_id: &str, user_id: &str) -> ReceivedMessage {
        ReceivedMessage::Join(JoinMessage {
            document_id: document_id.to_string(),
            user: UserInfo {
                id: user_id.to_string(),
                name: format!("User {user_id}"),
                color: "#3366ff".to_string(),
            },
        })
    }

    pub fn update_msg(document_id: &str, sender: &str, content: &str) -> ReceivedMessage {
        ReceivedMessage::Update(UpdateMessage {
            document_id: document_id.to_string(),
            sender: sender.to_string(),
            content: json!(content),
        })
    }

    pub fn title_msg(document_id: &str, title: &str) -> ReceivedMessage {
        ReceivedMessage::TitleUpdate(TitleUpdateMessage {
            document_id: document_id.to_string(),
            title: title.to_string(),
        })
    }

    pub fn cursor_msg(document_id: &str, user_id: &str, cursor: CursorPosition) -> ReceivedMessage {
        ReceivedMessage::CursorUpdate(CursorUpdateMessage {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            cursor,
        })
    }

    pub fn leave_msg(document_id: &str, user_id: &str) -> ReceivedMessage {
        ReceivedMessage::Leave(LeaveMessage {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn fetch_history_msg(document_id: &str) -> ReceivedMessage {
        ReceivedMessage::FetchHistory(FetchHistoryMessage {
            document_id: document_id.to_string(),
        })
    }

    pub fn restore_msg(document_id: &str, user_id: &str, version_index: usize) -> ReceivedMessage {
        ReceivedMessage::RestoreVersion(RestoreVersionMessage {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            version_index,
        })
    }
}
