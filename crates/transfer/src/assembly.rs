//! Receiver-side reassembly of the active file.

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use temposhare_protocol::{FileProgress, FileStart, FileStatus, Manifest};

use crate::{ProgressBook, SpeedSampler};

/// A file whose bytes have all arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub file_id: String,
    pub data: Bytes,
}

/// Result of feeding one binary frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// No file is active; the frame was discarded.
    Dropped,
    /// Bytes were added to the active file.
    Progress { file_id: String },
    /// The active file reached its declared size.
    Finalized(Finalized),
}

#[derive(Debug)]
struct ActiveFile {
    file_id: String,
    total: u64,
    received: u64,
    chunks: Vec<Bytes>,
}

/// Tracks progress for every manifest file and reassembles the one file
/// currently being received.
#[derive(Debug, Default)]
pub struct Assembly {
    book: ProgressBook,
    active: Option<ActiveFile>,
    sampler: SpeedSampler,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sampler(sampler: SpeedSampler) -> Self {
        Self {
            sampler,
            ..Self::default()
        }
    }

    /// Replaces all progress records with fresh `Idle` ones.
    pub fn load_manifest(&mut self, manifest: &Manifest) {
        self.book = ProgressBook::from_manifest(manifest);
        self.active = None;
    }

    pub fn book(&self) -> &ProgressBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut ProgressBook {
        &mut self.book
    }

    pub fn progress(&self, file_id: &str) -> Option<&FileProgress> {
        self.book.get(file_id)
    }

    /// Id of the file whose frames are arriving, if any.
    pub fn active_file(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.file_id.as_str())
    }

    /// Opens `start.file_id` as the active file.
    ///
    /// Returns `false` for a file not in the manifest; its frames will be
    /// dropped.
    pub fn file_start(&mut self, start: &FileStart) -> bool {
        if let Some(previous) = self.active.take() {
            warn!(file_id = %previous.file_id, received = previous.received, "abandoning unfinished file");
        }
        let Some(progress) = self.book.get(&start.file_id) else {
            warn!(file_id = %start.file_id, "FILE_START for unknown file");
            return false;
        };
        let total = progress.total;
        if total != start.size {
            warn!(file_id = %start.file_id, manifest = total, header = start.size, "size differs from manifest");
        }

        debug!(file_id = %start.file_id, size = total, "receiving file");
        if self.book.set_status(&start.file_id, FileStatus::Downloading) {
            self.book.record_bytes(&start.file_id, 0);
        }
        self.sampler.reset();
        self.active = Some(ActiveFile {
            file_id: start.file_id.clone(),
            total,
            received: 0,
            chunks: Vec::new(),
        });
        true
    }

    /// Appends a binary frame to the active file.
    ///
    /// Finalizes as soon as the received count reaches the declared size.
    pub fn chunk(&mut self, data: Bytes) -> ChunkOutcome {
        let Some(active) = self.active.as_mut() else {
            debug!(len = data.len(), "binary frame with no active file");
            return ChunkOutcome::Dropped;
        };
        active.received += data.len() as u64;
        active.chunks.push(data);
        let file_id = active.file_id.clone();
        let done = active.received >= active.total;
        self.book.record_bytes(&file_id, active.received);

        if done {
            if let Some(finalized) = self.finalize(&file_id) {
                return ChunkOutcome::Finalized(finalized);
            }
        }
        ChunkOutcome::Progress { file_id }
    }

    /// Handles `FILE_END`. Finalizes the active file unless that already
    /// happened; otherwise a no-op.
    pub fn file_end(&mut self, file_id: &str) -> Option<Finalized> {
        if self.active_file() != Some(file_id) {
            debug!(file_id = %file_id, "FILE_END confirms finished file");
            return None;
        }
        self.finalize(file_id)
    }

    /// Drops the active file without finalizing it. Its record keeps the
    /// last reported values.
    pub fn abort_active(&mut self) -> Option<String> {
        let active = self.active.take()?;
        warn!(file_id = %active.file_id, received = active.received, total = active.total, "transfer aborted");
        Some(active.file_id)
    }

    /// Samples the active file's throughput and stores the formatted speed.
    pub fn sample_speed(&mut self) -> Option<(String, FileProgress)> {
        let active = self.active.as_ref()?;
        let speed = self.sampler.sample_formatted(active.received)?;
        let file_id = active.file_id.clone();
        let progress = self.book.set_speed(&file_id, speed)?.clone();
        Some((file_id, progress))
    }

    fn finalize(&mut self, file_id: &str) -> Option<Finalized> {
        let active = self.active.take()?;
        if self.book.status(file_id).is_some_and(FileStatus::is_finished) {
            debug!(file_id = %file_id, "already finalized");
            return None;
        }

        let mut buf = BytesMut::with_capacity(active.received as usize);
        for chunk in &active.chunks {
            buf.extend_from_slice(chunk);
        }
        let data = buf.freeze();
        self.book.complete(file_id, data.clone());
        info!(file_id = %file_id, bytes = data.len(), "file reassembled");
        Some(Finalized {
            file_id: file_id.to_string(),
            data,
        })
    }
}
