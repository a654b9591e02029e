use thiserror::Error;

/// Errors surfaced by the game engine and its services.
///
/// `Validation`, `NotFound` and `Conflict` are caller errors and never
/// leave partial state behind. `Infrastructure` covers store/publish
/// failures that happen after a valid mutation; callers log these and
/// keep the committed state. `CorruptLog` is terminal for a replay
/// request: a snapshot is refused rather than built from a gapped log.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("corrupt action log for session {session_id}: {detail}")]
    CorruptLog { session_id: String, detail: String },
}

impl ArenaError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ArenaError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ArenaError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ArenaError::Conflict(msg.into())
    }

    /// Whether the error is a caller mistake (as opposed to a server-side
    /// failure). Used by the websocket layer to pick the response shape.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ArenaError::Validation(_) | ArenaError::NotFound(_) | ArenaError::Conflict(_)
        )
    }
}
