use std::time::Duration;

use temposhare_protocol::constants::{BACKPRESSURE_POLL_INTERVAL, BUFFERED_AMOUNT_HIGH, CHUNK_SIZE};

/// Pacing policy for outbound chunks.
///
/// After each frame the sender reads the channel's buffered amount; above
/// `high_water` it waits `poll_interval` before queuing the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowControl {
    pub chunk_size: usize,
    pub high_water: usize,
    pub poll_interval: Duration,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            high_water: BUFFERED_AMOUNT_HIGH,
            poll_interval: BACKPRESSURE_POLL_INTERVAL,
        }
    }
}

impl FlowControl {
    /// Delay to apply before the next frame, given the current buffer level.
    pub fn delay_for(&self, buffered: usize) -> Option<Duration> {
        (buffered > self.high_water).then_some(self.poll_interval)
    }
}
