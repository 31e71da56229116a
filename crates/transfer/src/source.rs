//! Local file sources offered by a sender.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncRead;

use temposhare_protocol::constants::DEFAULT_MIME_TYPE;

/// Boxed reader over a file's contents.
pub type SourceReader = Pin<Box<dyn AsyncRead + Send>>;

/// Where a shared file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Read lazily from disk each time the file is requested.
    Path(PathBuf),
    /// Held in memory.
    Memory(Bytes),
}

/// A file the sender offers, before it is assigned an id.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub source: FileSource,
}

impl LocalFile {
    /// Describes a file on disk. The name is the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            mime_type: mime_from_name(&name).to_string(),
            name,
            size: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Describes an in-memory file.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            mime_type: mime_from_name(&name).to_string(),
            name,
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Opens a fresh reader positioned at the start of the file.
    pub async fn open(&self) -> std::io::Result<SourceReader> {
        match &self.source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::pin(file))
            }
            FileSource::Memory(data) => Ok(Box::pin(std::io::Cursor::new(data.clone()))),
        }
    }
}

/// Infers a MIME type from a file name's extension.
pub fn mime_from_name(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_MIME_TYPE,
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => DEFAULT_MIME_TYPE,
    }
}
