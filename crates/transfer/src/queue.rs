use std::collections::VecDeque;

use tracing::debug;

/// FIFO of file ids awaiting a `REQUEST_DOWNLOAD`, with at most one request
/// outstanding.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    pending: VecDeque<String>,
    outstanding: Option<String>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `file_id`. Ids already pending or outstanding are skipped.
    pub fn enqueue(&mut self, file_id: &str) -> bool {
        let known = self.outstanding.as_deref() == Some(file_id)
            || self.pending.iter().any(|id| id == file_id);
        if known {
            return false;
        }
        self.pending.push_back(file_id.to_string());
        true
    }

    /// Pops the next id to request, unless a request is outstanding.
    pub fn advance(&mut self) -> Option<String> {
        if self.outstanding.is_some() {
            return None;
        }
        let next = self.pending.pop_front()?;
        debug!(file_id = %next, remaining = self.pending.len(), "dispatching download request");
        self.outstanding = Some(next.clone());
        Some(next)
    }

    /// Clears the outstanding request once `file_id` has finalized.
    pub fn complete(&mut self, file_id: &str) -> bool {
        if self.outstanding.as_deref() == Some(file_id) {
            self.outstanding = None;
            true
        } else {
            false
        }
    }

    /// The id whose request is in flight.
    pub fn outstanding(&self) -> Option<&str> {
        self.outstanding.as_deref()
    }

    /// Ids not yet requested, in order.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_none() && self.pending.is_empty()
    }

    /// Empties the queue, returning the ids that were never requested.
    /// The outstanding request, if any, is forgotten.
    pub fn clear(&mut self) -> Vec<String> {
        self.outstanding = None;
        self.pending.drain(..).collect()
    }
}
