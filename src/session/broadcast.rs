use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use super::engine::SessionEngine;
use super::registry::ConnectionId;
use crate::models::SendMessage;

/// Writer side of one connection. Frames are already serialized JSON.
pub type Outbound = UnboundedSender<String>;

/// Live connections and their outbound channels.
///
/// Delivery is fire-and-forget. A failed send does not tear anything down
/// here; the connection is parked in `stale` and the dispatcher runs the
/// leave procedure for it after the current command.
#[derive(Default)]
pub struct ConnectionTable {
    senders: HashMap<ConnectionId, Outbound>,
    stale: Vec<ConnectionId>,
}

impl ConnectionTable {
    pub fn register(&mut self, connection_id: ConnectionId, outbound: Outbound) {
        self.senders.insert(connection_id, outbound);
    }

    pub fn unregister(&mut self, connection_id: &str) -> Option<Outbound> {
        self.senders.remove(connection_id)
    }

    pub fn outbound(&self, connection_id: &str) -> Option<Outbound> {
        self.senders.get(connection_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn send_text(&mut self, connection_id: &str, text: String) -> bool {
        let Some(tx) = self.senders.get(connection_id) else {
            debug!("No outbound channel for connection {}", connection_id);
            return false;
        };
        if tx.send(text).is_err() {
            debug!("Connection {} is gone, scheduling leave", connection_id);
            if !self.stale.iter().any(|c| c == connection_id) {
                self.stale.push(connection_id.to_string());
            }
            return false;
        }
        true
    }

    pub fn take_stale(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.stale)
    }
}

pub fn encode(message: &SendMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to serialize outbound message: {}", e);
            None
        }
    }
}

impl SessionEngine {
    /// Send `message` to a single connection.
    pub(crate) fn send_to(&mut self, connection_id: &str, message: &SendMessage) -> bool {
        match encode(message) {
            Some(text) => self.connections.send_text(connection_id, text),
            None => false,
        }
    }

    /// Deliver `message` to every participant of `document_id`, optionally
    /// skipping `exclude_user_id`. Returns the number of connections reached.
    pub(crate) fn broadcast(
        &mut self,
        document_id: &str,
        message: &SendMessage,
        exclude_user_id: Option<&str>,
    ) -> usize {
        let Some(session) = self.registry.get(document_id) else {
            return 0;
        };
        let targets = session.connection_ids(exclude_user_id);
        if targets.is_empty() {
            return 0;
        }
        let Some(text) = encode(message) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in &targets {
            if self.connections.send_text(connection_id, text.clone()) {
                delivered += 1;
            }
        }
        debug!("Broadcast to {}/{} connections of document {}", delivered, targets.len(), document_id);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn failed_send_marks_connection_stale_once() {
        let mut table = ConnectionTable::default();
        let (tx, rx) = mpsc::unbounded_channel();
        table.register("c1".to_string(), tx);
        drop(rx);

        assert!(!table.send_text("c1", "a".to_string()));
        assert!(!table.send_text("c1", "b".to_string()));
        assert_eq!(table.take_stale(), vec!["c1".to_string()]);
        assert!(table.take_stale().is_empty());
    }

    #[test]
    fn delivers_to_registered_connection() {
        let mut table = ConnectionTable::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        table.register("c1".to_string(), tx);

        assert!(table.send_text("c1", "hello".to_string()));
        assert_eq!(rx.try_recv().unwrap(), "hello");
        assert!(!table.send_text("missing", "x".to_string()));
        assert!(table.take_stale().is_empty());
    }
}
