//! Peer transports for TempoShare.
//!
//! The protocol layers above only need an ordered, reliable channel that
//! keeps message boundaries, tells text from binary, and reports how many
//! outbound bytes are still queued. [`DataChannel`] is that channel;
//! [`Transport`] is how endpoints get one.
//!
//! Two transports are provided:
//! - [`MemoryTransport`]: in-process, for tests and embedding.
//! - [`WsTransport`]: WebSocket over TCP.

pub mod channel;
pub mod error;
pub mod memory;
pub mod room;
pub mod ws;

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

pub use channel::{BufferGauge, ChannelReceiver, ChannelSender, DataChannel};
pub use error::TransportError;
pub use memory::MemoryTransport;
pub use room::generate_room_id;
pub use ws::WsTransport;

/// Capacity of an endpoint's queue of not-yet-accepted inbound channels.
pub const INCOMING_QUEUE: usize = 8;

/// A registered local identity that peers can dial.
///
/// Dropping the endpoint unregisters it and stops accepting.
pub struct Endpoint {
    /// Identity other peers use to reach this endpoint.
    pub id: String,
    /// Channels opened by remote peers.
    pub incoming: mpsc::Receiver<DataChannel>,
    _guard: DropGuard,
}

impl Endpoint {
    pub(crate) fn new(
        id: String,
        incoming: mpsc::Receiver<DataChannel>,
        guard: DropGuard,
    ) -> Self {
        Self {
            id,
            incoming,
            _guard: guard,
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("id", &self.id).finish()
    }
}

/// Establishes peer channels.
///
/// `open` resolves once the transport is ready to be dialed under the
/// returned endpoint's id. `dial` resolves once a channel to `host_id` is
/// open.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        id: Option<&str>,
    ) -> impl Future<Output = Result<Endpoint, TransportError>> + Send;

    fn dial(
        &self,
        local_id: &str,
        host_id: &str,
    ) -> impl Future<Output = Result<DataChannel, TransportError>> + Send;
}
