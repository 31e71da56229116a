use std::time::Duration;

/// Size of each binary chunk frame (16 KiB).
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Outbound buffered bytes above which the sender pauses between frames.
pub const BUFFERED_AMOUNT_HIGH: usize = 512 * 1024;

/// Pause applied while the outbound buffer sits above the high-water mark.
pub const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time allowed for the transport to reach a ready state.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a single connection attempt to a host.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection retries after the first failed attempt.
pub const CONNECT_MAX_RETRIES: u32 = 3;

/// Delay between connection attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Interval at which the receiver repeats `REQUEST_MANIFEST`.
pub const MANIFEST_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Receiver speed sampling period.
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum elapsed time between two speed samples.
pub const SPEED_MIN_ELAPSED: Duration = Duration::from_millis(500);

/// Default lifetime of a share session (10 minutes).
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// MIME type used when none is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_water_mark_holds_many_chunks() {
        assert_eq!(BUFFERED_AMOUNT_HIGH / CHUNK_SIZE, 32);
    }

    #[test]
    fn retry_interval_exceeds_sample_interval() {
        assert!(MANIFEST_RETRY_INTERVAL > SPEED_SAMPLE_INTERVAL);
    }
}
