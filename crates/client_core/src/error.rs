use shared::{domain::CollectionKind, error::ErrorCode};
use thiserror::Error;

/// Failure reported by a [`PersistenceGateway`](crate::gateway::PersistenceGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    /// The server answered and refused the payload.
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },
    /// Network failure, timeout or an unreadable response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome taxonomy of the collection editor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("{kind} holds at most {max} items")]
    LimitReached { kind: CollectionKind, max: usize },
    /// Server (or the local pre-check) refused the items; message is shown verbatim.
    #[error("{0}")]
    ValidationRejected(String),
    /// The stored collection changed since it was loaded.
    #[error("{0}")]
    Conflict(String),
    #[error("save failed: {0}")]
    PersistFailed(String),
    #[error("a save is already in flight")]
    SaveInFlight,
    #[error("collection is not being edited")]
    NotEditing,
}

impl EditorError {
    pub fn code(&self) -> &'static str {
        match self {
            EditorError::LimitReached { .. } => "LIMIT_REACHED",
            EditorError::ValidationRejected(_) => "VALIDATION_REJECTED",
            EditorError::Conflict(_) => "CONFLICT",
            EditorError::PersistFailed(_) => "PERSIST_FAILED",
            EditorError::SaveInFlight => "SAVE_IN_FLIGHT",
            EditorError::NotEditing => "NOT_EDITING",
        }
    }

    /// Whether retrying the same save without changes may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EditorError::PersistFailed(_))
    }
}

impl From<PersistError> for EditorError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Rejected {
                code: ErrorCode::Validation,
                message,
            } => EditorError::ValidationRejected(message),
            PersistError::Rejected {
                code: ErrorCode::Conflict,
                message,
            } => EditorError::Conflict(message),
            PersistError::Rejected { message, .. } => EditorError::PersistFailed(message),
            PersistError::Transport(message) => EditorError::PersistFailed(message),
        }
    }
}
