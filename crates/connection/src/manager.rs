//! Connection manager owning the endpoint and the single active channel.
//!
//! Inbound channels accepted by the endpoint and outbound channels opened
//! by [`connect_to_host`](ConnectionManager::connect_to_host) go through the
//! same attach path: any previous channel is closed first, so at most one
//! channel is ever live. Frames from a replaced channel are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use temposhare_data_channel::{ChannelReceiver, ChannelSender, DataChannel, Endpoint, Transport};
use temposhare_protocol::{ControlMessage, Payload};

use crate::types::{ConnectPolicy, ConnectionEvent};
use crate::ConnectionError;

type EventSender = mpsc::UnboundedSender<ConnectionEvent>;

struct ActiveChannel {
    sender: ChannelSender,
    generation: u64,
}

#[derive(Default)]
struct Inner {
    local_id: Option<String>,
    endpoint_stop: Option<CancellationToken>,
    active: Option<ActiveChannel>,
    generation: u64,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }
}

/// Owns one endpoint and at most one active channel.
pub struct ConnectionManager<T: Transport> {
    transport: Arc<T>,
    policy: ConnectPolicy,
    inner: Arc<Mutex<Inner>>,
    events_tx: EventSender,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    malformed: Arc<AtomicU64>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a manager using the default [`ConnectPolicy`].
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_policy(transport, ConnectPolicy::default())
    }

    pub fn with_policy(transport: Arc<T>, policy: ConnectPolicy) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            policy,
            inner: Arc::new(Mutex::new(Inner::default())),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        lock(&self.events_rx).take()
    }

    pub fn policy(&self) -> &ConnectPolicy {
        &self.policy
    }

    /// Registers the local endpoint and returns its id.
    ///
    /// Calling again with the id already in use is a no-op. Any other call
    /// tears down the existing endpoint and channel first.
    pub async fn initialize(&self, id: Option<&str>) -> Result<String, ConnectionError> {
        {
            let mut inner = lock(&self.inner);
            let alive = inner
                .endpoint_stop
                .as_ref()
                .is_some_and(|stop| !stop.is_cancelled());
            if alive && id.is_some() && inner.local_id.as_deref() == id {
                if let Some(existing) = inner.local_id.clone() {
                    debug!(id = %existing, "endpoint already initialized");
                    return Ok(existing);
                }
            }
            teardown(&mut inner);
        }

        info!(id = id.unwrap_or("auto"), "initializing endpoint");
        let endpoint = match tokio::time::timeout(self.policy.init_timeout, self.transport.open(id))
            .await
        {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                warn!("endpoint initialization failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout = ?self.policy.init_timeout, "endpoint initialization timed out");
                return Err(ConnectionError::InitTimeout);
            }
        };

        let local_id = endpoint.id.clone();
        let stop = CancellationToken::new();
        {
            let mut inner = lock(&self.inner);
            inner.local_id = Some(local_id.clone());
            inner.endpoint_stop = Some(stop.clone());
        }

        tokio::spawn(accept_loop(
            endpoint,
            Arc::clone(&self.inner),
            self.events_tx.clone(),
            Arc::clone(&self.malformed),
            stop,
        ));

        info!(id = %local_id, "endpoint ready");
        let _ = self.events_tx.send(ConnectionEvent::Ready {
            id: local_id.clone(),
        });
        Ok(local_id)
    }

    /// Opens a channel to `host_id`, retrying per the [`ConnectPolicy`].
    pub async fn connect_to_host(&self, host_id: &str) -> Result<(), ConnectionError> {
        let local_id = lock(&self.inner)
            .local_id
            .clone()
            .ok_or(ConnectionError::NotInitialized)?;

        let attempts = self.policy.attempts();
        for attempt in 1..=attempts {
            match self.try_connect(&local_id, host_id).await {
                Ok(channel) => {
                    attach(
                        channel,
                        &self.inner,
                        &self.events_tx,
                        &self.malformed,
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(host = %host_id, attempt, attempts, "connection attempt failed: {e}");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
        Err(ConnectionError::HostUnavailable)
    }

    async fn try_connect(
        &self,
        local_id: &str,
        host_id: &str,
    ) -> Result<DataChannel, ConnectionError> {
        match tokio::time::timeout(
            self.policy.attempt_timeout,
            self.transport.dial(local_id, host_id),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConnectionError::ConnectTimeout),
        }
    }

    /// Sends a control message on the active channel.
    pub fn send(&self, msg: &ControlMessage) -> Result<(), ConnectionError> {
        let sender = self.channel().ok_or(ConnectionError::NoConnection)?;
        trace!(kind = msg.kind(), "sending control message");
        sender.send_control(msg)?;
        Ok(())
    }

    /// Outbound half of the active channel, if it is open.
    pub fn channel(&self) -> Option<ChannelSender> {
        lock(&self.inner)
            .active
            .as_ref()
            .map(|a| a.sender.clone())
            .filter(ChannelSender::is_open)
    }

    pub fn is_connected(&self) -> bool {
        self.channel().is_some()
    }

    pub fn local_id(&self) -> Option<String> {
        lock(&self.inner).local_id.clone()
    }

    pub fn peer_id(&self) -> Option<String> {
        self.channel().map(|s| s.peer_id().to_string())
    }

    /// Number of text frames dropped because they did not decode.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Closes the active channel without emitting `Disconnected`.
    pub fn disconnect(&self) {
        let mut inner = lock(&self.inner);
        if let Some(active) = inner.active.take() {
            info!(peer = %active.sender.peer_id(), "closing channel");
            active.sender.close();
        }
    }

    /// Closes the channel and the endpoint immediately.
    pub fn destroy(&self) {
        teardown(&mut lock(&self.inner));
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        teardown(&mut lock(&self.inner));
    }
}

fn lock<V>(m: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn teardown(inner: &mut Inner) {
    if let Some(active) = inner.active.take() {
        active.sender.close();
    }
    if let Some(stop) = inner.endpoint_stop.take() {
        stop.cancel();
    }
    if let Some(id) = inner.local_id.take() {
        debug!(id = %id, "endpoint torn down");
    }
}

/// Makes `channel` the active channel, closing any previous one.
fn attach(
    channel: DataChannel,
    inner: &Arc<Mutex<Inner>>,
    events: &EventSender,
    malformed: &Arc<AtomicU64>,
) {
    let (sender, receiver) = channel.split();
    let peer_id = sender.peer_id().to_string();

    let generation = {
        let mut guard = lock(inner);
        if let Some(old) = guard.active.take() {
            info!(old = %old.sender.peer_id(), new = %peer_id, "replacing active channel");
            old.sender.close();
        }
        guard.generation += 1;
        let generation = guard.generation;
        guard.active = Some(ActiveChannel { sender, generation });
        generation
    };

    info!(peer = %peer_id, "channel connected");
    let _ = events.send(ConnectionEvent::Connected {
        peer_id: peer_id.clone(),
    });

    tokio::spawn(read_loop(
        receiver,
        peer_id,
        generation,
        Arc::clone(inner),
        events.clone(),
        Arc::clone(malformed),
    ));
}

async fn accept_loop(
    mut endpoint: Endpoint,
    inner: Arc<Mutex<Inner>>,
    events: EventSender,
    malformed: Arc<AtomicU64>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            channel = endpoint.incoming.recv() => {
                match channel {
                    Some(channel) => attach(channel, &inner, &events, &malformed),
                    None => {
                        if !stop.is_cancelled() {
                            warn!(id = %endpoint.id, "endpoint closed unexpectedly");
                            let _ = events.send(ConnectionEvent::Error(ConnectionError::EndpointClosed));
                        }
                        break;
                    }
                }
            }
        }
    }
    debug!(id = %endpoint.id, "accept loop stopped");
}

/// Forwards frames from one channel until it closes or is replaced.
async fn read_loop(
    mut receiver: ChannelReceiver,
    peer_id: String,
    generation: u64,
    inner: Arc<Mutex<Inner>>,
    events: EventSender,
    malformed: Arc<AtomicU64>,
) {
    while let Some(frame) = receiver.recv().await {
        if !lock(&inner).is_current(generation) {
            return;
        }
        let event = match frame.decode() {
            Ok(Payload::Control(msg)) => {
                trace!(kind = msg.kind(), "control message received");
                ConnectionEvent::Control(msg)
            }
            Ok(Payload::Chunk(data)) => ConnectionEvent::Binary(data),
            Err(e) => {
                let total = malformed.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(peer = %peer_id, total, "dropping {e}");
                continue;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }

    let still_current = {
        let mut guard = lock(&inner);
        if guard.is_current(generation) {
            guard.active = None;
            true
        } else {
            false
        }
    };
    if still_current {
        info!(peer = %peer_id, "channel disconnected");
        let _ = events.send(ConnectionEvent::Disconnected { peer_id });
    }
}
