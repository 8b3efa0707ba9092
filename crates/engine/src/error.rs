use reviewsync_core::CoreError;
use reviewsync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("fetch failed for {page}: {message}")]
    Fetch { page: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("quota exceeded on {operation} after {attempts} attempt(s)")]
    QuotaExceeded { operation: String, attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
