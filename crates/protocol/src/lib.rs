//! Wire protocol for TempoShare.
//!
//! A single ordered channel carries two planes: JSON control messages in
//! text frames and raw file chunks in binary frames. Binary frames carry no
//! header; they belong to whichever file the most recent `FILE_START`
//! opened.

pub mod constants;
pub mod envelope;
pub mod format;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use envelope::{Frame, MalformedFrame, Payload};
pub use format::{format_bytes, format_speed};
pub use messages::{ControlMessage, FileStart};
pub use types::{FileDescriptor, FileProgress, FileStatus, Manifest, TransferState};
