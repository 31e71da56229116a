//! Public types for the connection manager.

use std::time::Duration;

use bytes::Bytes;

use temposhare_protocol::ControlMessage;
use temposhare_protocol::constants::{
    CONNECT_MAX_RETRIES, CONNECT_RETRY_DELAY, CONNECT_TIMEOUT, INIT_TIMEOUT,
};

use crate::ConnectionError;

/// Events emitted by the connection manager, in arrival order.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The local endpoint is registered and dialable.
    Ready { id: String },
    /// A channel to `peer_id` became the active channel.
    Connected { peer_id: String },
    /// A control message arrived on the active channel.
    Control(ControlMessage),
    /// A binary chunk arrived on the active channel.
    Binary(Bytes),
    /// The active channel closed.
    Disconnected { peer_id: String },
    /// A failure not tied to a specific call.
    Error(ConnectionError),
}

/// Timeouts and retry bounds for establishing connections.
#[derive(Debug, Clone)]
pub struct ConnectPolicy {
    /// Time allowed for the transport to become ready.
    pub init_timeout: Duration,
    /// Time allowed for each connection attempt.
    pub attempt_timeout: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            init_timeout: INIT_TIMEOUT,
            attempt_timeout: CONNECT_TIMEOUT,
            max_retries: CONNECT_MAX_RETRIES,
            retry_delay: CONNECT_RETRY_DELAY,
        }
    }
}

impl ConnectPolicy {
    /// Total number of attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_policy_defaults() {
        let policy = ConnectPolicy::default();
        assert_eq!(policy.init_timeout, Duration::from_secs(10));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.attempts(), 4);
    }
}
