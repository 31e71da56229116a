use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MIME_TYPE;

/// Metadata for one shared file.
///
/// The MIME type travels under the `type` key inside a manifest; the
/// `mimeType` spelling is accepted on input as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type", alias = "mimeType", default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

/// The receiver-visible file list of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub files: Vec<FileDescriptor>,
    pub total_size: u64,
}

impl Manifest {
    /// Builds a manifest, computing `total_size` from the files.
    pub fn new(files: Vec<FileDescriptor>) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self { files, total_size }
    }

    /// Looks up a file by ID.
    pub fn file(&self, file_id: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.id == file_id)
    }
}

/// Download status of a single file on the receiver.
///
/// Variants are declared in lifecycle order so that `Ord` follows the
/// only permitted direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Idle,
    Queued,
    Downloading,
    Completed,
    Saved,
}

impl FileStatus {
    /// Returns `true` if moving from `self` to `next` is allowed.
    ///
    /// Status only moves forward, except that a queued file may fall back
    /// to `Idle` when its request was never dispatched.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        next >= self || (self == FileStatus::Queued && next == FileStatus::Idle)
    }

    /// `Completed` or `Saved`.
    pub fn is_finished(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Saved)
    }
}

/// Receiver-side progress record for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub transferred: u64,
    pub total: u64,
    /// Always within `[0, 100]`.
    pub percentage: f64,
    pub speed: String,
    pub status: FileStatus,
    /// Reassembled file contents, present once the file has completed.
    #[serde(skip)]
    pub data: Option<Bytes>,
}

impl FileProgress {
    /// A fresh `Idle` record for a file of `total` bytes.
    pub fn idle(total: u64) -> Self {
        Self {
            transferred: 0,
            total,
            percentage: 0.0,
            speed: crate::format::format_speed(0.0),
            status: FileStatus::Idle,
            data: None,
        }
    }
}

/// Session-level state shared by the sender and receiver flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Idle,
    Initializing,
    /// Sender: ready, no transfer active.
    Waiting,
    /// Receiver: dialing the host.
    Connecting,
    /// Receiver: manifest received.
    Connected,
    /// Sender: servicing a download request.
    Transferring,
    /// Terminal.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            id: id.into(),
            name: format!("{id}.bin"),
            size,
            mime_type: "application/pdf".into(),
        }
    }

    #[test]
    fn descriptor_uses_type_key() {
        let json = serde_json::to_value(descriptor("a", 3)).unwrap();
        assert_eq!(json["type"], "application/pdf");
        assert!(json.get("mimeType").is_none());
    }

    #[test]
    fn descriptor_accepts_mime_type_alias() {
        let f: FileDescriptor =
            serde_json::from_str(r#"{"id":"x","name":"x.txt","size":1,"mimeType":"text/plain"}"#)
                .unwrap();
        assert_eq!(f.mime_type, "text/plain");
    }

    #[test]
    fn descriptor_missing_type_defaults() {
        let f: FileDescriptor =
            serde_json::from_str(r#"{"id":"x","name":"x","size":0}"#).unwrap();
        assert_eq!(f.mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn manifest_total_size() {
        let m = Manifest::new(vec![descriptor("a", 100), descriptor("b", 250)]);
        assert_eq!(m.total_size, 350);
        assert_eq!(m.file("b").unwrap().size, 250);
        assert!(m.file("c").is_none());
    }

    #[test]
    fn status_moves_forward_only() {
        use FileStatus::*;
        assert!(Idle.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Saved));
        assert!(Saved.can_transition_to(Saved));

        assert!(!Completed.can_transition_to(Downloading));
        assert!(!Downloading.can_transition_to(Idle));
        assert!(!Saved.can_transition_to(Completed));
    }

    #[test]
    fn queued_may_reset_to_idle() {
        assert!(FileStatus::Queued.can_transition_to(FileStatus::Idle));
    }

    #[test]
    fn idle_progress_defaults() {
        let p = FileProgress::idle(42);
        assert_eq!(p.total, 42);
        assert_eq!(p.transferred, 0);
        assert_eq!(p.status, FileStatus::Idle);
        assert_eq!(p.speed, "0 MB/s");
        assert!(p.data.is_none());
    }

    #[test]
    fn progress_serializes_without_data() {
        let mut p = FileProgress::idle(1);
        p.data = Some(Bytes::from_static(b"x"));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["status"], "idle");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn transfer_state_wire_names() {
        let json = serde_json::to_string(&TransferState::Transferring).unwrap();
        assert_eq!(json, r#""TRANSFERRING""#);
    }
}
