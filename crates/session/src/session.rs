use std::time::Duration;

use chrono::{DateTime, Utc};

use temposhare_protocol::{FileDescriptor, Manifest};
use temposhare_transfer::LocalFile;

/// One file offered by a session, with its download bookkeeping.
#[derive(Debug, Clone)]
pub struct SharedFile {
    pub descriptor: FileDescriptor,
    pub local: LocalFile,
    pub download_count: u32,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

/// A sender's share: an ordered, immutable file list with an expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    files: Vec<SharedFile>,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub share_url: String,
    ttl: Duration,
}

impl Session {
    /// Creates a session created now.
    pub fn new(session_id: &str, files: Vec<LocalFile>, ttl: Duration, share_base_url: &str) -> Self {
        Self::created_at(session_id, files, ttl, share_base_url, Utc::now())
    }

    /// Creates a session with an explicit creation time.
    ///
    /// File ids are `{session_id}-{index}-{created_at_millis}`.
    pub fn created_at(
        session_id: &str,
        files: Vec<LocalFile>,
        ttl: Duration,
        share_base_url: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let stamp = created_at.timestamp_millis();
        let files: Vec<SharedFile> = files
            .into_iter()
            .enumerate()
            .map(|(index, local)| SharedFile {
                descriptor: FileDescriptor {
                    id: format!("{session_id}-{index}-{stamp}"),
                    name: local.name.clone(),
                    size: local.size,
                    mime_type: local.mime_type.clone(),
                },
                local,
                download_count: 0,
                last_downloaded_at: None,
            })
            .collect();
        let total_size = files.iter().map(|f| f.descriptor.size).sum();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            session_id: session_id.to_string(),
            files,
            total_size,
            created_at,
            expires_at,
            share_url: format!("{share_base_url}{session_id}"),
            ttl,
        }
    }

    pub fn files(&self) -> &[SharedFile] {
        &self.files
    }

    pub fn file(&self, file_id: &str) -> Option<&SharedFile> {
        self.files.iter().find(|f| f.descriptor.id == file_id)
    }

    /// Lifetime of the session from creation.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The file list as sent to receivers.
    pub fn manifest(&self) -> Manifest {
        Manifest {
            files: self.files.iter().map(|f| f.descriptor.clone()).collect(),
            total_size: self.total_size,
        }
    }

    /// Counts a completed download of `file_id`. Returns the file's new
    /// count.
    pub fn record_download(&mut self, file_id: &str, at: DateTime<Utc>) -> Option<u32> {
        let file = self.files.iter_mut().find(|f| f.descriptor.id == file_id)?;
        file.download_count += 1;
        file.last_downloaded_at = Some(at);
        Some(file.download_count)
    }

    /// Completed downloads across all files.
    pub fn download_count(&self) -> u32 {
        self.files.iter().map(|f| f.download_count).sum()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
