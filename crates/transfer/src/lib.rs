//! File streaming and reassembly for TempoShare.
//!
//! The sender side is the [`TransferEngine`], which streams one file at a
//! time under a [`FlowControl`] policy. The receiver side is the
//! [`Assembly`] tracker, which rebuilds files from binary frames, together
//! with the [`DownloadQueue`] that keeps one request outstanding.

mod assembly;
mod chunked;
mod engine;
mod error;
mod flow;
mod progress;
mod queue;
mod save;
mod source;

pub use assembly::{Assembly, ChunkOutcome, Finalized};
pub use chunked::ChunkReader;
pub use engine::{OutgoingTransfer, TransferEngine};
pub use error::TransferError;
pub use flow::FlowControl;
pub use progress::{ProgressBook, SpeedSampler};
pub use queue::DownloadQueue;
pub use save::{sanitize_file_name, save_to_dir};
pub use source::{FileSource, LocalFile, SourceReader, mime_from_name};
