use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::warn;

use temposhare_protocol::constants::SPEED_MIN_ELAPSED;
use temposhare_protocol::{FileProgress, FileStatus, Manifest, format_speed};

/// Per-file progress records for one manifest, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct ProgressBook {
    order: Vec<String>,
    records: HashMap<String, FileProgress>,
}

impl ProgressBook {
    /// One `Idle` record per manifest file.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let order = manifest.files.iter().map(|f| f.id.clone()).collect();
        let records = manifest
            .files
            .iter()
            .map(|f| (f.id.clone(), FileProgress::idle(f.size)))
            .collect();
        Self { order, records }
    }

    pub fn get(&self, file_id: &str) -> Option<&FileProgress> {
        self.records.get(file_id)
    }

    pub fn status(&self, file_id: &str) -> Option<FileStatus> {
        self.records.get(file_id).map(|p| p.status)
    }

    /// Records in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileProgress)> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).map(|p| (id.as_str(), p)))
    }

    /// Ids of `Idle` files in manifest order.
    pub fn idle_files(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, p)| p.status == FileStatus::Idle)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Moves a file to `status`. Backward moves are refused and logged.
    pub fn set_status(&mut self, file_id: &str, status: FileStatus) -> bool {
        let Some(p) = self.records.get_mut(file_id) else {
            return false;
        };
        if !p.status.can_transition_to(status) {
            warn!(file_id = %file_id, from = ?p.status, to = ?status, "refusing status regression");
            return false;
        }
        p.status = status;
        true
    }

    /// Records `received` bytes. `transferred` is clamped to the total.
    pub fn record_bytes(&mut self, file_id: &str, received: u64) -> Option<&FileProgress> {
        let p = self.records.get_mut(file_id)?;
        p.transferred = received.min(p.total);
        p.percentage = percentage(received, p.total);
        Some(p)
    }

    pub fn set_speed(&mut self, file_id: &str, speed: String) -> Option<&FileProgress> {
        let p = self.records.get_mut(file_id)?;
        p.speed = speed;
        Some(p)
    }

    /// Marks a file completed with its reassembled contents.
    pub fn complete(&mut self, file_id: &str, data: Bytes) -> Option<&FileProgress> {
        let p = self.records.get_mut(file_id)?;
        p.status = FileStatus::Completed;
        p.percentage = 100.0;
        p.data = Some(data);
        Some(p)
    }
}

fn percentage(received: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (received as f64 / total as f64 * 100.0).min(100.0)
}

/// Computes throughput from periodic byte-count samples.
///
/// A sample only produces a speed once at least `min_elapsed` has passed
/// since the previous one. A counter that went backwards yields nothing.
#[derive(Debug, Clone)]
pub struct SpeedSampler {
    min_elapsed: Duration,
    last_bytes: u64,
    last_time: Instant,
}

impl Default for SpeedSampler {
    fn default() -> Self {
        Self::new(SPEED_MIN_ELAPSED)
    }
}

impl SpeedSampler {
    pub fn new(min_elapsed: Duration) -> Self {
        Self {
            min_elapsed,
            last_bytes: 0,
            last_time: Instant::now(),
        }
    }

    /// Restarts sampling from zero bytes at the current instant.
    pub fn reset(&mut self) {
        self.last_bytes = 0;
        self.last_time = Instant::now();
    }

    /// Takes a sample of the running byte counter, returning bytes/second.
    pub fn sample(&mut self, bytes_now: u64) -> Option<f64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_time);
        if elapsed < self.min_elapsed {
            return None;
        }
        let speed = bytes_now
            .checked_sub(self.last_bytes)
            .map(|diff| diff as f64 / elapsed.as_secs_f64());
        self.last_bytes = bytes_now;
        self.last_time = now;
        speed
    }

    /// Like [`sample`](Self::sample), formatted for display.
    pub fn sample_formatted(&mut self, bytes_now: u64) -> Option<String> {
        self.sample(bytes_now).map(format_speed)
    }
}
