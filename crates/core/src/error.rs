use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
