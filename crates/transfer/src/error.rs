use temposhare_data_channel::TransportError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("channel busy")]
    ChannelBusy,

    #[error("no active connection")]
    NoConnection,

    #[error("connection lost during transfer")]
    ConnectionLost,

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TransportError> for TransferError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Json(e) => Self::Json(e),
            TransportError::Io(e) => Self::Io(e),
            _ => Self::ConnectionLost,
        }
    }
}
