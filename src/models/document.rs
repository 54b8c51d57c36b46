use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNTITLED: &str = "Untitled Document";

/// Logical caret position inside the document.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

/// A participant as seen by other clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParticipantView {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

/// Full content snapshot recorded for every edit and restore.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_from_index: Option<usize>,
}

impl HistoryEntry {
    pub fn edit(content: Value, author_id: impl Into<String>) -> Self {
        Self {
            content,
            timestamp: Utc::now(),
            author_id: author_id.into(),
            restored_from_index: None,
        }
    }

    pub fn restored(content: Value, author_id: impl Into<String>, from_index: usize) -> Self {
        Self {
            restored_from_index: Some(from_index),
            ..Self::edit(content, author_id)
        }
    }
}

/// Durable form of a document, with its unbounded history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub title: String,
    pub content: Value,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: UNTITLED.to_string(),
            content: Value::String(String::new()),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn restored_entry_keeps_source_index() {
        let entry = HistoryEntry::restored(json!({"blocks": []}), "u1", 2);
        assert_eq!(entry.restored_from_index, Some(2));
        assert_eq!(entry.author_id, "u1");

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["restoredFromIndex"], 2);
        assert_eq!(value["authorId"], "u1");
    }

    #[test]
    fn plain_edit_omits_restore_marker() {
        let value = serde_json::to_value(HistoryEntry::edit(json!("x"), "u1")).unwrap();
        assert!(value.get("restoredFromIndex").is_none());
    }
}
