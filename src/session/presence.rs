use std::collections::HashMap;

use tracing::{debug, info};

use super::engine::SessionEngine;
use super::error::EngineError;
use super::registry::{ConnectionId, Participant};
use crate::models::{
    CursorMessage, CursorUpdateMessage, DocumentMessage, JoinMessage, LeaveMessage,
    MembershipMessage, ParticipantView, SendMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub document_id: String,
    pub user_id: String,
}

/// Which `(document, user)` each live connection speaks for. At most one
/// connection is bound to a given pair.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<ConnectionId, Binding>,
}

impl BindingTable {
    pub fn get(&self, connection_id: &str) -> Option<&Binding> {
        self.bindings.get(connection_id)
    }

    pub fn bind(&mut self, connection_id: &str, document_id: &str, user_id: &str) {
        self.bindings.insert(
            connection_id.to_string(),
            Binding {
                document_id: document_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    pub fn unbind(&mut self, connection_id: &str) -> Option<Binding> {
        self.bindings.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

impl SessionEngine {
    /// Add the connection's user to a document session, or move an existing
    /// participant with the same user id onto this connection.
    pub(crate) fn join(&mut self, connection_id: &str, msg: JoinMessage) -> Result<ParticipantView, EngineError> {
        let JoinMessage { document_id, user } = msg;
        if document_id.trim().is_empty() || user.id.trim().is_empty() {
            return Err(EngineError::MalformedMessage(
                "join requires a documentId and a user id".to_string(),
            ));
        }

        // rejoining elsewhere without a clean leave
        let rebinding = self
            .bindings
            .get(connection_id)
            .is_some_and(|b| b.document_id != document_id || b.user_id != user.id);
        if rebinding {
            self.leave_connection(connection_id);
        }
        self.bindings.bind(connection_id, &document_id, &user.id);

        let session = self.registry.get_or_create(&document_id);
        let (view, is_new) = match session.participant_mut(&user.id) {
            Some(existing) => {
                let previous = std::mem::replace(&mut existing.connection_id, connection_id.to_string());
                if previous != connection_id {
                    info!(
                        "User {} reconnected to document {} on connection {} (was {})",
                        user.id, document_id, connection_id, previous
                    );
                    self.bindings.unbind(&previous);
                }
                (existing.view(), false)
            }
            None => {
                let participant = Participant {
                    user_id: user.id.clone(),
                    display_name: user.name,
                    color: user.color,
                    connection_id: connection_id.to_string(),
                    cursor: None,
                };
                let view = participant.view();
                session.add_participant(participant);
                info!("User {} joined document {}", user.id, document_id);
                (view, true)
            }
        };

        let snapshot = SendMessage::Document(DocumentMessage { data: session.snapshot() });
        let users = session.users();

        if is_new {
            let joined = SendMessage::UserJoined(MembershipMessage {
                user_id: user.id.clone(),
                users,
            });
            self.broadcast(&document_id, &joined, Some(&user.id));
        }
        self.send_to(connection_id, &snapshot);

        Ok(view)
    }

    /// Explicit `leave` message. The connection binding is authoritative; the
    /// message fields only have to agree with it.
    pub(crate) fn leave(&mut self, connection_id: &str, msg: LeaveMessage) -> Result<(), EngineError> {
        if let Some(binding) = self.bindings.get(connection_id) {
            if binding.document_id != msg.document_id || binding.user_id != msg.user_id {
                return Err(EngineError::UnknownParticipant {
                    document_id: msg.document_id,
                    user_id: msg.user_id,
                });
            }
        }
        if !self.leave_connection(connection_id) {
            return Err(EngineError::UnknownParticipant {
                document_id: msg.document_id,
                user_id: msg.user_id,
            });
        }
        Ok(())
    }

    /// Remove whatever participant `connection_id` carries. Used for explicit
    /// leaves, rebinding, and connection loss. Returns whether anyone left.
    pub(crate) fn leave_connection(&mut self, connection_id: &str) -> bool {
        let resolved = match self.bindings.unbind(connection_id) {
            Some(binding) => Some((binding.document_id, binding.user_id)),
            None => self.registry.find_by_connection(connection_id),
        };
        let Some((document_id, user_id)) = resolved else {
            debug!("Connection {} is not part of any session", connection_id);
            return false;
        };

        let Some(session) = self.registry.get_mut(&document_id) else {
            debug!("Session {} already closed for connection {}", document_id, connection_id);
            return false;
        };
        if session.remove_participant(&user_id, connection_id).is_none() {
            debug!(
                "User {} in document {} is no longer carried by connection {}",
                user_id, document_id, connection_id
            );
            return false;
        }
        info!("User {} left document {}", user_id, document_id);

        if session.is_empty() {
            self.registry.remove(&document_id);
        } else {
            let left = SendMessage::UserLeft(MembershipMessage {
                user_id,
                users: session.users(),
            });
            self.broadcast(&document_id, &left, None);
        }
        true
    }

    /// Overwrite a participant's cursor and relay it to everyone else.
    pub(crate) fn cursor_update(&mut self, msg: CursorUpdateMessage) -> Result<(), EngineError> {
        let CursorUpdateMessage { document_id, user_id, cursor } = msg;
        let session = self
            .registry
            .get_mut(&document_id)
            .ok_or_else(|| EngineError::UnknownDocument(document_id.clone()))?;
        let participant = session
            .participant_mut(&user_id)
            .ok_or_else(|| EngineError::UnknownParticipant {
                document_id: document_id.clone(),
                user_id: user_id.clone(),
            })?;
        participant.cursor = Some(cursor);

        let relay = SendMessage::CursorUpdate(CursorMessage {
            sender: user_id.clone(),
            cursor,
        });
        self.broadcast(&document_id, &relay, Some(&user_id));
        Ok(())
    }
}
