//! Manifest handshake.
//!
//! The receiver asks for the manifest as soon as its channel opens and
//! repeats the request on a fixed interval until the manifest arrives. The
//! sender answers every request with the same pre-encoded manifest frame.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use temposhare_data_channel::ChannelSender;
use temposhare_protocol::constants::MANIFEST_RETRY_INTERVAL;
use temposhare_protocol::{ControlMessage, Frame, Manifest};
use temposhare_transfer::TransferError;

/// Retry timing for the manifest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePolicy {
    pub interval: Duration,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            interval: MANIFEST_RETRY_INTERVAL,
        }
    }
}

/// Background task repeating `REQUEST_MANIFEST` until stopped.
///
/// Dropping it stops the requests.
#[derive(Debug)]
pub struct ManifestRetry {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ManifestRetry {
    /// Sends the first request now and then once per `policy.interval`.
    pub fn start(channel: ChannelSender, policy: &HandshakePolicy) -> Self {
        let stop = CancellationToken::new();
        let interval = policy.interval;
        let task = tokio::spawn({
            let stop = stop.clone();
            async move {
                let mut attempt = 0u32;
                loop {
                    attempt += 1;
                    trace!(attempt, "requesting manifest");
                    if let Err(e) = channel.send_control(&ControlMessage::RequestManifest) {
                        debug!("manifest request not sent: {e}");
                        break;
                    }
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = channel.closed() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        });
        Self { stop, task }
    }

    /// Cancels further requests.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for ManifestRetry {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Answers `REQUEST_MANIFEST` with a frame encoded once per session.
#[derive(Debug, Clone)]
pub struct ManifestResponder {
    frame: Frame,
}

impl ManifestResponder {
    pub fn new(manifest: &Manifest) -> Result<Self, TransferError> {
        let frame = Frame::control(&ControlMessage::Manifest(manifest.clone()))?;
        Ok(Self { frame })
    }

    /// Sends the manifest. Safe to call any number of times.
    pub fn respond(&self, channel: &ChannelSender) -> Result<(), TransferError> {
        channel.send(self.frame.clone())?;
        debug!(peer = %channel.peer_id(), "manifest sent");
        Ok(())
    }
}
