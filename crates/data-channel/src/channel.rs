//! The channel handle shared by all transports.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use temposhare_protocol::{ControlMessage, Frame};

use crate::TransportError;

/// Counts outbound bytes that have been queued but not yet delivered.
#[derive(Debug, Clone, Default)]
pub struct BufferGauge(Arc<AtomicUsize>);

impl BufferGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }

    /// Subtracts `n`, saturating at zero.
    pub fn release(&self, n: usize) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(n))
            });
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// An open, ordered channel to one peer.
///
/// Split it into a cloneable [`ChannelSender`] and a single
/// [`ChannelReceiver`] to use it.
#[derive(Debug)]
pub struct DataChannel {
    sender: ChannelSender,
    receiver: ChannelReceiver,
}

impl DataChannel {
    pub(crate) fn from_parts(
        peer_id: &str,
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<Frame>,
        buffered: BufferGauge,
        drained: Option<BufferGauge>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            sender: ChannelSender {
                peer_id: Arc::from(peer_id),
                tx: outbound,
                buffered,
                closed: closed.clone(),
            },
            receiver: ChannelReceiver {
                rx: inbound,
                drained,
                closed,
            },
        }
    }

    /// Creates two linked in-process channels.
    ///
    /// The first half talks to a peer named `b`, the second to `a`. Bytes
    /// sent on one half stay in its buffered amount until the other half
    /// receives them. Closing either half closes both.
    pub fn pair(a: &str, b: &str) -> (DataChannel, DataChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a_gauge = BufferGauge::new();
        let b_gauge = BufferGauge::new();
        let closed = CancellationToken::new();

        let to_b = DataChannel::from_parts(
            b,
            a_tx,
            a_rx,
            a_gauge.clone(),
            Some(b_gauge.clone()),
            closed.clone(),
        );
        let to_a = DataChannel::from_parts(a, b_tx, b_rx, b_gauge, Some(a_gauge), closed);
        (to_b, to_a)
    }

    /// Identity of the remote peer.
    pub fn peer_id(&self) -> &str {
        self.sender.peer_id()
    }

    pub fn sender(&self) -> &ChannelSender {
        &self.sender
    }

    pub fn split(self) -> (ChannelSender, ChannelReceiver) {
        (self.sender, self.receiver)
    }
}

/// Outbound half of a [`DataChannel`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    peer_id: Arc<str>,
    tx: mpsc::UnboundedSender<Frame>,
    buffered: BufferGauge,
    closed: CancellationToken,
}

impl ChannelSender {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Queues a frame for delivery.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let len = frame.len();
        self.buffered.add(len);
        self.tx.send(frame).map_err(|_| {
            self.buffered.release(len);
            TransportError::Closed
        })
    }

    /// Encodes and queues a control message.
    pub fn send_control(&self, msg: &ControlMessage) -> Result<(), TransportError> {
        self.send(Frame::control(msg)?)
    }

    /// Bytes queued on this side that the transport has not delivered yet.
    pub fn buffered_amount(&self) -> usize {
        self.buffered.get()
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Closes the channel in both directions. Undelivered frames are dropped.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once the channel has closed.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.closed.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}

/// Inbound half of a [`DataChannel`].
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
    drained: Option<BufferGauge>,
    closed: CancellationToken,
}

impl ChannelReceiver {
    /// Next frame in send order, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            frame = self.rx.recv() => match frame {
                Some(frame) => {
                    if let Some(gauge) = &self.drained {
                        gauge.release(frame.len());
                    }
                    Some(frame)
                }
                None => {
                    self.closed.cancel();
                    None
                }
            },
        }
    }
}
