use serde_json::Value;
use tracing::debug;

use super::engine::SessionEngine;
use super::error::EngineError;
use super::writer::PersistJob;
use crate::config::WriteAckMode;
use crate::models::{ContentUpdateMessage, HistoryEntry, SendMessage, TitleMessage, TitleUpdateMessage, UpdateMessage};
use crate::store::StoreError;

impl SessionEngine {
    /// Replace the session content, record a history entry, persist it and
    /// relay the edit to every other participant. Last write wins.
    pub(crate) async fn apply_edit(&mut self, msg: UpdateMessage) -> Result<(), EngineError> {
        let UpdateMessage { document_id, sender, content } = msg;
        let session = self
            .registry
            .get_mut(&document_id)
            .ok_or_else(|| EngineError::UnknownDocument(document_id.clone()))?;

        session.content = content.clone();
        let entry = HistoryEntry::edit(content.clone(), sender.clone());
        if session.push_history(entry.clone()).is_some() {
            debug!("Evicted oldest in-memory history entry of document {}", document_id);
        }

        let persisted = self.persist_edit(&document_id, &content, entry).await;

        let update = SendMessage::Update(ContentUpdateMessage { sender: sender.clone(), content });
        self.broadcast(&document_id, &update, Some(&sender));

        persisted.map_err(EngineError::from)
    }

    /// In fire-and-forget mode the write is queued on the persistence writer
    /// and this returns at once; in acknowledged mode it waits for the store.
    async fn persist_edit(&self, document_id: &str, content: &Value, entry: HistoryEntry) -> Result<(), StoreError> {
        match self.write_ack {
            WriteAckMode::Acknowledged => {
                self.store
                    .upsert_content_and_push_history(document_id, content, &entry)
                    .await
            }
            WriteAckMode::FireAndForget => {
                self.writer.enqueue(PersistJob::Edit {
                    document_id: document_id.to_string(),
                    content: content.clone(),
                    entry,
                });
                Ok(())
            }
        }
    }

    /// Set the title and echo it to everyone, author included.
    pub(crate) fn apply_title_update(&mut self, msg: TitleUpdateMessage) -> Result<(), EngineError> {
        let TitleUpdateMessage { document_id, title } = msg;
        let session = self
            .registry
            .get_mut(&document_id)
            .ok_or_else(|| EngineError::UnknownDocument(document_id.clone()))?;
        session.title = title.clone();

        self.broadcast(&document_id, &SendMessage::TitleUpdate(TitleMessage { title }), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::session::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn edit_updates_content_and_skips_author() {
        let mut h = Harness::new(WriteAckMode::Acknowledged);
        let mut a = h.connect("ca").await;
        let mut b = h.connect("cb").await;
        h.send(&a.id, join_msg("D1", "A")).await;
        h.send(&b.id, join_msg("D1", "B")).await;
        a.drain();
        b.drain();

        h.send(&a.id, update_msg("D1", "A", "hello")).await;

        assert!(a.drain().is_empty());
        assert_eq!(
            b.drain(),
            vec![SendMessage::Update(ContentUpdateMessage {
                sender: "A".to_string(),
                content: json!("hello"),
            })]
        );
        let session = h.engine.registry.get("D1").unwrap();
        assert_eq!(session.content, json!("hello"));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].author_id, "A");
        assert_eq!(h.store.history_len("D1").await, 1);
    }

    #[tokio::test]
    async fn late_joiner_bootstraps_from_latest_content() {
        let mut h = Harness::new(WriteAckMode::FireAndForget);
        let a = h.connect("ca").await;
        h.send(&a.id, join_msg("D1", "A")).await;
        h.send(&a.id, update_msg("D1", "A", "hello")).await;

        let mut b = h.connect("cb").await;
        h.send(&b.id, join_msg("D1", "B")).await;
        match &b.drain()[..] {
            [SendMessage::Document(doc)] => assert_eq!(doc.data.content, json!("hello")),
            other => panic!("expected document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn edit_to_unknown_document_is_dropped() {
        let mut h = Harness::new(WriteAckMode::Acknowledged);
        let a = h.connect("ca").await;
        h.send(&a.id, update_msg("nowhere", "A", "lost")).await;

        assert!(!h.engine.registry.contains("nowhere"));
        assert_eq!(h.store.history_len("nowhere").await, 0);
    }

    #[tokio::test]
    async fn in_memory_history_is_bounded_but_durable_history_is_not() {
        let mut h = Harness::new(WriteAckMode::Acknowledged);
        let mut a = h.connect("ca").await;
        h.send(&a.id, join_msg("D1", "A")).await;

        for i in 1..=51 {
            h.send(&a.id, update_msg("D1", "A", &format!("edit #{i}"))).await;
        }

        let session = h.engine.registry.get("D1").unwrap();
        assert_eq!(session.history().len(), 50);
        assert_eq!(session.history().front().unwrap().content, json!("edit #2"));

        a.drain();
        h.send(&a.id, fetch_history_msg("D1")).await;
        let history = a.next_history().await;
        assert_eq!(history.len(), 51);
        assert_eq!(history[0].content, json!("edit #1"));
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_broadcast() {
        for mode in [WriteAckMode::Acknowledged, WriteAckMode::FireAndForget] {
            let mut h = Harness::with_store(mode, Arc::new(FailingStore));
            let a = h.connect("ca").await;
            let mut b = h.connect("cb").await;
            h.send(&a.id, join_msg("D1", "A")).await;
            h.send(&b.id, join_msg("D1", "B")).await;
            b.drain();

            h.send(&a.id, update_msg("D1", "A", "still here")).await;

            assert_eq!(b.drain().len(), 1);
            let session = h.engine.registry.get("D1").unwrap();
            assert_eq!(session.content, json!("still here"));
            assert_eq!(session.history().len(), 1);
        }
    }

    #[tokio::test]
    async fn title_update_reaches_everyone_without_history() {
        let mut h = Harness::new(WriteAckMode::Acknowledged);
        let mut a = h.connect("ca").await;
        let mut b = h.connect("cb").await;
        h.send(&a.id, join_msg("D1", "A")).await;
        h.send(&b.id, join_msg("D1", "B")).await;
        a.drain();
        b.drain();

        h.send(&a.id, title_msg("D1", "Quarterly plan")).await;

        let expected = vec![SendMessage::TitleUpdate(TitleMessage {
            title: "Quarterly plan".to_string(),
        })];
        assert_eq!(a.drain(), expected);
        assert_eq!(b.drain(), expected);
        let session = h.engine.registry.get("D1").unwrap();
        assert_eq!(session.title, "Quarterly plan");
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn queued_edits_persist_in_dispatch_order() {
        let store = Arc::new(SlowFirstWriteStore::new(Duration::from_millis(20)));
        let mut h = Harness::with_store(WriteAckMode::FireAndForget, store.clone());
        let a = h.connect("ca").await;
        h.send(&a.id, join_msg("D1", "A")).await;

        h.send(&a.id, update_msg("D1", "A", "first")).await;
        h.send(&a.id, update_msg("D1", "A", "second")).await;
        assert_eq!(h.engine.registry.get("D1").unwrap().content, json!("second"));

        let doc = store.wait_for_history("D1", 2).await;
        assert_eq!(doc.content, json!("second"));
        let order: Vec<_> = doc.history.iter().map(|e| e.content.clone()).collect();
        assert_eq!(order, vec![json!("first"), json!("second")]);
    }
}
