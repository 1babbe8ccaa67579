use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures surfaced by the engine to the UI layer
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session cannot start
    #[error("reference text {0} not found")]
    ReferenceNotFound(String),
    /// The session cannot start
    #[error("failed to load progress: {0}")]
    ProgressLoad(#[source] StoreError),
    /// Recoverable; typing continues and the next checkpoint retries
    #[error("failed to save progress: {0}")]
    Persistence(#[source] StoreError),
}

impl EngineError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Persistence(_))
    }
}
