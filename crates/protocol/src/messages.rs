use serde::{Deserialize, Serialize};

use crate::types::{FileDescriptor, Manifest};

/// Header announcing the file whose chunks follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStart {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl From<&FileDescriptor> for FileStart {
    fn from(f: &FileDescriptor) -> Self {
        Self {
            file_id: f.id.clone(),
            name: f.name.clone(),
            size: f.size,
            mime_type: f.mime_type.clone(),
        }
    }
}

/// A control message carried in a text frame.
///
/// The `type` key selects the variant; payload fields sit beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ControlMessage {
    /// Receiver → sender: ask for the file list.
    RequestManifest,
    /// Sender → receiver: the full file list.
    Manifest(Manifest),
    /// Receiver → sender: stream one file.
    RequestDownload { file_id: String },
    /// Sender → receiver: chunks for `file_id` follow.
    FileStart(FileStart),
    /// Sender → receiver: last chunk of `file_id` has been sent.
    FileEnd { file_id: String },
    /// Receiver → sender: `file_id` was reassembled.
    DownloadComplete { file_id: String },
}

impl ControlMessage {
    /// Encodes the message as JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a message from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The wire name of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestManifest => "REQUEST_MANIFEST",
            Self::Manifest(_) => "MANIFEST",
            Self::RequestDownload { .. } => "REQUEST_DOWNLOAD",
            Self::FileStart(_) => "FILE_START",
            Self::FileEnd { .. } => "FILE_END",
            Self::DownloadComplete { .. } => "DOWNLOAD_COMPLETE",
        }
    }
}
