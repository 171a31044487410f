//! Errors raised by native block storage

/// Failure reported by the host's native block storage
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    #[error("block state is incompatible: {0}")]
    IncompatibleState(String),
    #[error("persistent data rejected: {0}")]
    Rejected(String),
    #[error("failed to commit block state: {0}")]
    CommitFailed(String),
}
