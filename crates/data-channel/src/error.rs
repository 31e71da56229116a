//! Error types for the data channel.

use tokio_tungstenite::tungstenite;

/// Errors produced by a transport or channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed")]
    Closed,

    #[error("peer not found: {0}")]
    UnknownPeer(String),

    #[error("id already in use: {0}")]
    IdTaken(String),

    #[error("invalid endpoint id: {0}")]
    InvalidId(String),
}
