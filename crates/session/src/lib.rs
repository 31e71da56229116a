//! Sender and receiver flows for TempoShare.
//!
//! [`Sender::start`] shares a set of local files under a room id and serves
//! one receiver at a time. [`Receiver::start`] dials a room, fetches its
//! manifest and downloads files one by one. Both run as a background task
//! driven by a handle and report through an event channel.

pub mod error;
pub mod handshake;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod state;

pub use error::SessionError;
pub use handshake::{HandshakePolicy, ManifestResponder, ManifestRetry};
pub use receiver::{Receiver, ReceiverEvent, ReceiverHandle, ReceiverOptions, ReceiverSnapshot};
pub use sender::{DEFAULT_SHARE_BASE_URL, Sender, SenderEvent, SenderHandle, SenderOptions};
pub use session::{Session, SharedFile};
pub use state::{Role, StateMachine};
