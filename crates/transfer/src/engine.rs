//! Sender-side streaming of one file at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use temposhare_data_channel::ChannelSender;
use temposhare_protocol::{ControlMessage, FileDescriptor, FileStart, Frame};

use crate::{ChunkReader, FlowControl, TransferError};

/// Streams files over a channel, at most one at a time.
///
/// Clones share the same busy flag.
#[derive(Debug, Clone, Default)]
pub struct TransferEngine {
    busy: Arc<AtomicBool>,
    flow: FlowControl,
}

impl TransferEngine {
    pub fn new(flow: FlowControl) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            flow,
        }
    }

    pub fn flow(&self) -> &FlowControl {
        &self.flow
    }

    /// Returns `true` while a transfer holds the channel.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claims the channel for one file.
    ///
    /// Fails with [`TransferError::NoConnection`] if the channel is not
    /// open, or [`TransferError::ChannelBusy`] if a transfer is already in
    /// flight. The busy flag is held until the returned transfer finishes or
    /// is dropped.
    pub fn begin(
        &self,
        channel: &ChannelSender,
        file: &FileDescriptor,
    ) -> Result<OutgoingTransfer, TransferError> {
        if !channel.is_open() {
            return Err(TransferError::NoConnection);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(file_id = %file.id, "transfer rejected, channel busy");
            return Err(TransferError::ChannelBusy);
        }
        Ok(OutgoingTransfer {
            _busy: BusyGuard(Arc::clone(&self.busy)),
            channel: channel.clone(),
            file: file.clone(),
            flow: self.flow.clone(),
        })
    }

    /// Claims the channel and streams `reader` as `file`.
    pub async fn send_file<R, F>(
        &self,
        channel: &ChannelSender,
        file: &FileDescriptor,
        reader: R,
        on_progress: F,
    ) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
        F: FnMut(u64, u64),
    {
        self.begin(channel, file)?.run(reader, on_progress).await
    }
}

/// Clears the busy flag on drop, including on error and cancellation.
#[derive(Debug)]
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A transfer that holds the channel's busy flag.
#[derive(Debug)]
pub struct OutgoingTransfer {
    _busy: BusyGuard,
    channel: ChannelSender,
    file: FileDescriptor,
    flow: FlowControl,
}

impl OutgoingTransfer {
    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Sends `FILE_START`, the file's chunks and `FILE_END`.
    ///
    /// At most `file.size` bytes are read from `reader`. `on_progress` is
    /// called after each chunk with `(sent, total)`. Returns the number of
    /// payload bytes sent.
    pub async fn run<R, F>(self, reader: R, mut on_progress: F) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
        F: FnMut(u64, u64),
    {
        let file_id = self.file.id.as_str();
        let total = self.file.size;
        info!(file_id = %file_id, name = %self.file.name, size = total, "sending file");

        self.channel
            .send_control(&ControlMessage::FileStart(FileStart::from(&self.file)))?;

        let mut chunks = ChunkReader::new(reader.take(total), self.flow.chunk_size);
        let mut sent = 0u64;
        while let Some(chunk) = chunks.next_chunk().await? {
            if !self.channel.is_open() {
                warn!(file_id = %file_id, sent, total, "channel closed mid-transfer");
                return Err(TransferError::ConnectionLost);
            }
            sent += chunk.len() as u64;
            self.channel.send(Frame::chunk(chunk))?;
            on_progress(sent, total);

            if sent < total {
                if let Some(delay) = self.flow.delay_for(self.channel.buffered_amount()) {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        if sent < total {
            warn!(file_id = %file_id, sent, total, "source ended early");
        }
        self.channel.send_control(&ControlMessage::FileEnd {
            file_id: file_id.to_string(),
        })?;
        debug!(file_id = %file_id, sent, "file sent");
        Ok(sent)
    }
}
