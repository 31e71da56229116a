use temposhare_connection::ConnectionError;
use temposhare_transfer::TransferError;

/// Errors reported by the sender and receiver flows.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("unknown file: {0}")]
    UnknownFile(String),

    #[error("file not downloaded yet: {0}")]
    NotCompleted(String),

    #[error("session has stopped")]
    Stopped,
}

impl SessionError {
    /// Returns `true` for failures that move the flow to `FAILED`.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_fatal(),
            _ => false,
        }
    }
}
