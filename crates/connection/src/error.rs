use temposhare_data_channel::TransportError;

/// Errors from the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("peer initialization timed out")]
    InitTimeout,

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("host unavailable or connection timed out")]
    HostUnavailable,

    #[error("peer not initialized")]
    NotInitialized,

    #[error("no active connection")]
    NoConnection,

    #[error("connection lost during transfer")]
    ConnectionLost,

    #[error("endpoint stopped accepting connections")]
    EndpointClosed,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ConnectionError {
    /// Returns `true` for failures that end the whole flow.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InitTimeout | Self::HostUnavailable | Self::NotInitialized | Self::Transport(_)
        )
    }
}
