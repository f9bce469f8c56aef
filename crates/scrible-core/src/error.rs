use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Index and metadata disagree, or an ID collided. Writes halt after this.
    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Writes are halted after an index inconsistency; call resume_writes() after inspection")]
    WritesHalted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Document already indexed: {0}")]
    DuplicateDocument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_inconsistency(&self) -> bool { matches!(self, Error::IndexInconsistency(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;
