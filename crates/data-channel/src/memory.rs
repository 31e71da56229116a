//! In-process transport.
//!
//! Endpoints register in a shared registry; dialing hands the host one half
//! of a linked [`DataChannel::pair`]. Endpoints opened without an id get a
//! generated room id. Clones of a `MemoryTransport` share the same registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::room::generate_room_id;
use crate::{DataChannel, Endpoint, INCOMING_QUEUE, Transport, TransportError};

type Registry = Arc<Mutex<HashMap<String, mpsc::Sender<DataChannel>>>>;

/// Transport connecting endpoints within one process.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    registry: Registry,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, id: &str) -> Option<mpsc::Sender<DataChannel>> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.get(id).filter(|tx| !tx.is_closed()).cloned()
    }
}

impl Transport for MemoryTransport {
    async fn open(&self, id: Option<&str>) -> Result<Endpoint, TransportError> {
        if id == Some("") {
            return Err(TransportError::InvalidId(String::new()));
        }

        let (tx, rx) = mpsc::channel(INCOMING_QUEUE);
        let id = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let taken = |registry: &HashMap<String, mpsc::Sender<DataChannel>>, id: &str| {
                registry.get(id).is_some_and(|existing| !existing.is_closed())
            };
            let id = match id {
                Some(id) if taken(&registry, id) => {
                    return Err(TransportError::IdTaken(id.to_string()));
                }
                Some(id) => id.to_string(),
                None => loop {
                    let candidate = generate_room_id();
                    if !taken(&registry, &candidate) {
                        break candidate;
                    }
                },
            };
            registry.insert(id.clone(), tx.clone());
            id
        };

        let shutdown = CancellationToken::new();
        {
            let registry = Arc::clone(&self.registry);
            let shutdown = shutdown.clone();
            let id = id.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
                if registry.get(&id).is_some_and(|current| current.same_channel(&tx)) {
                    registry.remove(&id);
                }
                debug!(endpoint = %id, "memory endpoint closed");
            });
        }

        debug!(endpoint = %id, "memory endpoint open");
        Ok(Endpoint::new(id, rx, shutdown.drop_guard()))
    }

    async fn dial(&self, local_id: &str, host_id: &str) -> Result<DataChannel, TransportError> {
        let host = self
            .lookup(host_id)
            .ok_or_else(|| TransportError::UnknownPeer(host_id.to_string()))?;

        let (to_host, to_dialer) = DataChannel::pair(local_id, host_id);
        host.send(to_dialer)
            .await
            .map_err(|_| TransportError::UnknownPeer(host_id.to_string()))?;

        debug!(local = %local_id, host = %host_id, "memory channel open");
        Ok(to_host)
    }
}
