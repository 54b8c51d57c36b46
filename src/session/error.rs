use tracing::{debug, error, warn};

use crate::store::StoreError;

/// Per-message failures. None of these ever stop the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("unknown participant {user_id} in document {document_id}")]
    UnknownParticipant { document_id: String, user_id: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("version index {index} out of range for {len} stored entries")]
    OutOfRangeRestore { index: usize, len: usize },
}

impl EngineError {
    /// Log at the level this kind of failure warrants.
    pub fn log(&self, context: &str) {
        match self {
            EngineError::MalformedMessage(_) => warn!("Dropping {}: {}", context, self),
            // a leave racing a late in-flight message is expected
            EngineError::UnknownDocument(_) | EngineError::UnknownParticipant { .. } => {
                debug!("Ignoring {}: {}", context, self)
            }
            EngineError::Persistence(_) => error!("Failed to handle {}: {}", context, self),
            EngineError::OutOfRangeRestore { .. } => warn!("Rejecting {}: {}", context, self),
        }
    }
}
