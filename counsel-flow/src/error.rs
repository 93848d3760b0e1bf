use thiserror::Error;

/// Infrastructure-level failures of the pipeline core.
///
/// Stage-level analysis failures are not represented here; those are carried
/// inside [`crate::stage::StageResult`] so that a broken stage degrades the
/// report instead of aborting the run.
#[derive(Debug, Error)]
pub enum CounselError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no stage registered for kind: {0}")]
    StageNotRegistered(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CounselError>;
