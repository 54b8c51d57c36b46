use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::info;

use crate::models::{CursorPosition, DocumentSnapshot, HistoryEntry, ParticipantView, UNTITLED};

pub type ConnectionId = String;

/// One user's live membership in a session.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub connection_id: ConnectionId,
    pub cursor: Option<CursorPosition>,
}

impl Participant {
    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.user_id.clone(),
            name: self.display_name.clone(),
            color: self.color.clone(),
            cursor: self.cursor,
        }
    }
}

/// In-memory state for one actively edited document.
#[derive(Debug)]
pub struct DocumentSession {
    pub document_id: String,
    pub title: String,
    pub content: Value,
    participants: Vec<Participant>,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
}

impl DocumentSession {
    fn new(document_id: &str, history_limit: usize) -> Self {
        Self {
            document_id: document_id.to_string(),
            title: UNTITLED.to_string(),
            content: Value::String(String::new()),
            participants: Vec::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Insert a participant. Callers check for an existing `user_id` first.
    pub fn add_participant(&mut self, participant: Participant) {
        debug_assert!(self.participant(&participant.user_id).is_none());
        self.participants.push(participant);
    }

    /// Remove `user_id` only if it is still carried by `connection_id`.
    pub fn remove_participant(&mut self, user_id: &str, connection_id: &str) -> Option<Participant> {
        let pos = self
            .participants
            .iter()
            .position(|p| p.user_id == user_id && p.connection_id == connection_id)?;
        Some(self.participants.remove(pos))
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn users(&self) -> Vec<ParticipantView> {
        self.participants.iter().map(Participant::view).collect()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.document_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            users: self.users(),
        }
    }

    /// Append to the bounded in-memory history, returning the evicted
    /// oldest entry when the bound is exceeded.
    pub fn push_history(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.history.push_back(entry);
        if self.history.len() > self.history_limit {
            self.history.pop_front()
        } else {
            None
        }
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Connections of every participant except `exclude_user_id`.
    pub fn connection_ids(&self, exclude_user_id: Option<&str>) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| Some(p.user_id.as_str()) != exclude_user_id)
            .map(|p| p.connection_id.clone())
            .collect()
    }
}

/// Map from document id to live session. A session exists only while it
/// has at least one participant.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<String, DocumentSession>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn get(&self, document_id: &str) -> Option<&DocumentSession> {
        self.sessions.get(document_id)
    }

    pub fn get_mut(&mut self, document_id: &str) -> Option<&mut DocumentSession> {
        self.sessions.get_mut(document_id)
    }

    pub fn get_or_create(&mut self, document_id: &str) -> &mut DocumentSession {
        let limit = self.history_limit;
        self.sessions.entry(document_id.to_string()).or_insert_with(|| {
            info!("Created session for document {}", document_id);
            DocumentSession::new(document_id, limit)
        })
    }

    pub fn remove(&mut self, document_id: &str) -> Option<DocumentSession> {
        let removed = self.sessions.remove(document_id);
        if removed.is_some() {
            info!("Closed session for document {}", document_id);
        }
        removed
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.sessions.contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn participant_count(&self) -> usize {
        self.sessions.values().map(|s| s.participants.len()).sum()
    }

    pub fn history_entry_count(&self) -> usize {
        self.sessions.values().map(|s| s.history.len()).sum()
    }

    /// Full scan for the participant carried by `connection_id`. Only used
    /// when the binding table has no record of the connection.
    pub fn find_by_connection(&self, connection_id: &str) -> Option<(String, String)> {
        self.sessions.values().find_map(|session| {
            session
                .participants
                .iter()
                .find(|p| p.connection_id == connection_id)
                .map(|p| (session.document_id.clone(), p.user_id.clone()))
        })
    }
}
