use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CursorPosition, HistoryEntry, ParticipantView};

/// Identity and presentation metadata a client sends when joining.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub document_id: String,
    pub user: UserInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub document_id: String,
    pub sender: String,
    pub content: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TitleUpdateMessage {
    pub document_id: String,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdateMessage {
    pub document_id: String,
    pub user_id: String,
    pub cursor: CursorPosition,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMessage {
    pub document_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FetchHistoryMessage {
    pub document_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RestoreVersionMessage {
    pub document_id: String,
    pub user_id: String,
    pub version_index: usize,
}

/// Envelopes accepted from clients. Anything that does not match one of
/// these shapes is rejected at decode time.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReceivedMessage {
    Join(JoinMessage),
    Update(UpdateMessage),
    TitleUpdate(TitleUpdateMessage),
    CursorUpdate(CursorUpdateMessage),
    Leave(LeaveMessage),
    FetchHistory(FetchHistoryMessage),
    RestoreVersion(RestoreVersionMessage),
    Ping,
}

impl ReceivedMessage {
    /// The document the envelope refers to, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            ReceivedMessage::Join(m) => Some(&m.document_id),
            ReceivedMessage::Update(m) => Some(&m.document_id),
            ReceivedMessage::TitleUpdate(m) => Some(&m.document_id),
            ReceivedMessage::CursorUpdate(m) => Some(&m.document_id),
            ReceivedMessage::Leave(m) => Some(&m.document_id),
            ReceivedMessage::FetchHistory(m) => Some(&m.document_id),
            ReceivedMessage::RestoreVersion(m) => Some(&m.document_id),
            ReceivedMessage::Ping => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReceivedMessage::Join(_) => "join",
            ReceivedMessage::Update(_) => "update",
            ReceivedMessage::TitleUpdate(_) => "title-update",
            ReceivedMessage::CursorUpdate(_) => "cursor-update",
            ReceivedMessage::Leave(_) => "leave",
            ReceivedMessage::FetchHistory(_) => "fetch-history",
            ReceivedMessage::RestoreVersion(_) => "restore-version",
            ReceivedMessage::Ping => "ping",
        }
    }
}

/// Full session state handed to a connection when it joins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub title: String,
    pub content: Value,
    pub users: Vec<ParticipantView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentMessage {
    pub data: DocumentSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipMessage {
    pub user_id: String,
    pub users: Vec<ParticipantView>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContentUpdateMessage {
    pub sender: String,
    pub content: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TitleMessage {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CursorMessage {
    pub sender: String,
    pub cursor: CursorPosition,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub history: Vec<HistoryEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PongMessage {
    pub date: String,
}

/// Envelopes sent to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SendMessage {
    Document(DocumentMessage),
    UserJoined(MembershipMessage),
    UserLeft(MembershipMessage),
    Update(ContentUpdateMessage),
    TitleUpdate(TitleMessage),
    CursorUpdate(CursorMessage),
    History(HistoryMessage),
    Pong(PongMessage),
}
