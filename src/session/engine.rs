use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::broadcast::{ConnectionTable, Outbound};
use super::presence::BindingTable;
use super::registry::{ConnectionId, SessionRegistry};
use super::writer::PersistenceWriter;
use crate::config::{Config, WriteAckMode};
use crate::models::{HistoryEntry, ReceivedMessage};
use crate::store::HistoryStore;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub history_limit: usize,
    pub write_ack: WriteAckMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            write_ack: WriteAckMode::FireAndForget,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_limit: config.history_limit,
            write_ack: config.write_ack_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub connections: usize,
    pub sessions: usize,
    pub participants: usize,
    pub bound_connections: usize,
    pub history_entries: usize,
}

/// Everything the dispatcher can be asked to do.
#[derive(Debug)]
pub enum EngineCommand {
    Connect {
        connection_id: ConnectionId,
        outbound: Outbound,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Inbound {
        connection_id: ConnectionId,
        message: ReceivedMessage,
    },
    /// A restore finished persisting and can now be applied in memory.
    RestoreApplied {
        document_id: String,
        user_id: String,
        entry: HistoryEntry,
    },
    Diagnostics {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Registry, presence and broadcast state for all documents.
///
/// Owned by exactly one task; every mutation happens inside
/// `handle_command`, one command at a time.
pub struct SessionEngine {
    pub(super) registry: SessionRegistry,
    pub(super) bindings: BindingTable,
    pub(super) connections: ConnectionTable,
    pub(super) store: Arc<dyn HistoryStore>,
    pub(super) write_ack: WriteAckMode,
    pub(super) writer: PersistenceWriter,
}

impl SessionEngine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn HistoryStore>,
        loopback: mpsc::WeakSender<EngineCommand>,
    ) -> Self {
        let writer = PersistenceWriter::spawn(store.clone(), loopback);
        Self {
            registry: SessionRegistry::new(settings.history_limit),
            bindings: BindingTable::default(),
            connections: ConnectionTable::default(),
            store,
            write_ack: settings.write_ack,
            writer,
        }
    }

    pub async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect { connection_id, outbound } => {
                info!("Connection {} registered", connection_id);
                self.connections.register(connection_id, outbound);
            }
            EngineCommand::Disconnect { connection_id } => {
                info!("Connection {} closed", connection_id);
                self.connections.unregister(&connection_id);
                self.leave_connection(&connection_id);
            }
            EngineCommand::Inbound { connection_id, message } => {
                let kind = message.kind();
                if let Err(e) = self.handle_message(&connection_id, message).await {
                    e.log(&format!("{} from connection {}", kind, connection_id));
                }
            }
            EngineCommand::RestoreApplied { document_id, user_id, entry } => {
                self.apply_restore(&document_id, &user_id, entry);
            }
            EngineCommand::Diagnostics { reply } => {
                let _ = reply.send(self.stats());
            }
        }
        self.reap_stale_connections();
    }

    async fn handle_message(
        &mut self,
        connection_id: &str,
        message: ReceivedMessage,
    ) -> Result<(), super::EngineError> {
        match message {
            ReceivedMessage::Join(msg) => self.join(connection_id, msg).map(|_| ()),
            ReceivedMessage::Update(msg) => self.apply_edit(msg).await,
            ReceivedMessage::TitleUpdate(msg) => self.apply_title_update(msg),
            ReceivedMessage::CursorUpdate(msg) => self.cursor_update(msg),
            ReceivedMessage::Leave(msg) => self.leave(connection_id, msg),
            ReceivedMessage::FetchHistory(msg) => self.fetch_history(connection_id, msg),
            ReceivedMessage::RestoreVersion(msg) => self.restore_version(msg).await,
            // answered by the transport
            ReceivedMessage::Ping => Ok(()),
        }
    }

    /// Connections whose channel failed during this command are treated as
    /// closed. Leaving may broadcast again, so loop until nothing new fails.
    fn reap_stale_connections(&mut self) {
        loop {
            let stale = self.connections.take_stale();
            if stale.is_empty() {
                break;
            }
            for connection_id in stale {
                debug!("Reaping stale connection {}", connection_id);
                self.connections.unregister(&connection_id);
                self.leave_connection(&connection_id);
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            connections: self.connections.len(),
            sessions: self.registry.len(),
            participants: self.registry.participant_count(),
            bound_connections: self.bindings.len(),
            history_entries: self.registry.history_entry_count(),
        }
    }
}
