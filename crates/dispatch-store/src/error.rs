use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("object not found")]
    NotFound,

    #[error("status patch conflict: expected version {expected}, store has {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("object store returned malformed payload: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}
