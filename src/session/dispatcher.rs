use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::broadcast::Outbound;
use super::engine::{EngineCommand, EngineSettings, EngineStats, SessionEngine};
use super::registry::ConnectionId;
use crate::models::ReceivedMessage;
use crate::store::HistoryStore;

#[derive(Debug, thiserror::Error)]
#[error("session dispatcher is not running")]
pub struct DispatcherClosed;

/// Cloneable entry point into the dispatcher task.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn connect(&self, connection_id: ConnectionId, outbound: Outbound) -> Result<(), DispatcherClosed> {
        self.submit(EngineCommand::Connect { connection_id, outbound }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), DispatcherClosed> {
        self.submit(EngineCommand::Disconnect { connection_id }).await
    }

    pub async fn inbound(&self, connection_id: ConnectionId, message: ReceivedMessage) -> Result<(), DispatcherClosed> {
        self.submit(EngineCommand::Inbound { connection_id, message }).await
    }

    pub async fn stats(&self) -> Result<EngineStats, DispatcherClosed> {
        let (reply, rx) = oneshot::channel();
        self.submit(EngineCommand::Diagnostics { reply }).await?;
        rx.await.map_err(|_| DispatcherClosed)
    }

    async fn submit(&self, command: EngineCommand) -> Result<(), DispatcherClosed> {
        self.tx.send(command).await.map_err(|_| DispatcherClosed)
    }
}

/// Start the single dispatcher task that owns all session state.
pub fn spawn_dispatcher(
    settings: EngineSettings,
    store: Arc<dyn HistoryStore>,
    queue_capacity: usize,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineCommand>(queue_capacity.max(1));
    let mut engine = SessionEngine::new(settings, store, tx.downgrade());

    tokio::spawn(async move {
        info!(
            "Session dispatcher started (history limit {}, {:?} writes)",
            settings.history_limit, settings.write_ack
        );
        while let Some(command) = rx.recv().await {
            engine.handle_command(command).await;
        }
        warn!("Session dispatcher stopped");
    });

    EngineHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriteAckMode;
    use crate::models::SendMessage;
    use crate::session::test_support::join_msg;
    use crate::store::MemoryHistoryStore;

    #[tokio::test]
    async fn dispatcher_processes_commands_in_order() {
        let settings = EngineSettings {
            history_limit: 50,
            write_ack: WriteAckMode::FireAndForget,
        };
        let handle = spawn_dispatcher(settings, Arc::new(MemoryHistoryStore::new()), 8);

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.connect("c1".to_string(), tx).await.unwrap();
        handle.inbound("c1".to_string(), join_msg("D1", "A")).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.participants, 1);

        let frame = rx.recv().await.unwrap();
        let msg: SendMessage = serde_json::from_str(&frame).unwrap();
        assert!(matches!(msg, SendMessage::Document(_)));

        handle.disconnect("c1".to_string()).await.unwrap();
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats, EngineStats::default());
    }
}
