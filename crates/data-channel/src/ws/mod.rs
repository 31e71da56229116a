//! WebSocket transport.
//!
//! An endpoint is a TCP listener; its id is the bound `host:port`, with a
//! wildcard bind IP replaced by a local interface address so the id can be
//! dialed from other machines. Dialing opens `ws://{host_id}/`. Text messages carry control JSON and binary
//! messages carry chunks, so message boundaries survive end to end.

mod pumps;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use temposhare_protocol::constants::CHUNK_SIZE;

use crate::{BufferGauge, DataChannel, Endpoint, INCOMING_QUEUE, Transport, TransportError};

/// Address bound when the caller does not supply one.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:0";

/// Largest message accepted from a peer.
///
/// Chunks are 16 KiB; the headroom covers a large manifest.
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * CHUNK_SIZE;

fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    config
}

/// Transport over WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    async fn open(&self, id: Option<&str>) -> Result<Endpoint, TransportError> {
        let bind = id.unwrap_or(DEFAULT_BIND_ADDR);
        let addr: SocketAddr = bind
            .parse()
            .map_err(|_| TransportError::InvalidId(bind.to_string()))?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let advertised = advertised_addr(local_addr, &local_ips());
        info!(%local_addr, %advertised, "WebSocket endpoint listening");

        let (tx, rx) = mpsc::channel(INCOMING_QUEUE);
        let shutdown = CancellationToken::new();
        tokio::spawn(accept_loop(listener, tx, shutdown.clone()));

        Ok(Endpoint::new(
            advertised.to_string(),
            rx,
            shutdown.drop_guard(),
        ))
    }

    async fn dial(&self, local_id: &str, host_id: &str) -> Result<DataChannel, TransportError> {
        let url = format!("ws://{host_id}/");
        let (stream, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config()), false).await?;
        debug!(local = %local_id, %url, "WebSocket channel open");
        Ok(spawn_channel(stream, host_id))
    }
}

/// Returns local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
fn local_ips() -> Vec<IpAddr> {
    if_addrs::get_if_addrs()
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_link_local() => Some(IpAddr::V4(ip)),
            _ => None,
        })
        .collect()
}

/// The address peers should dial for a listener bound to `local`.
///
/// A wildcard bind IP becomes the first interface address, or loopback when
/// the host has none.
fn advertised_addr(local: SocketAddr, interfaces: &[IpAddr]) -> SocketAddr {
    if !local.ip().is_unspecified() {
        return local;
    }
    let ip = interfaces
        .first()
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    SocketAddr::new(ip, local.port())
}

async fn accept_loop(
    listener: TcpListener,
    incoming: mpsc::Sender<DataChannel>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                };
                let incoming = incoming.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async_with_config(stream, Some(ws_config())).await {
                        Ok(ws) => {
                            info!(%peer_addr, "WebSocket peer connected");
                            let channel = spawn_channel(ws, &peer_addr.to_string());
                            if incoming.send(channel).await.is_err() {
                                debug!(%peer_addr, "endpoint closed before channel was accepted");
                            }
                        }
                        Err(e) => warn!(%peer_addr, "WebSocket handshake failed: {e}"),
                    }
                });
            }
        }
    }
    debug!("WebSocket endpoint stopped");
}

/// Wraps an established WebSocket in a [`DataChannel`] driven by a read
/// and a write pump.
fn spawn_channel<S>(ws: WebSocketStream<S>, peer_id: &str) -> DataChannel
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    use futures_util::StreamExt;

    let (write, read) = ws.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let gauge = BufferGauge::new();
    let closed = CancellationToken::new();

    tokio::spawn(pumps::write_pump(write, out_rx, gauge.clone(), closed.clone()));
    tokio::spawn(pumps::read_pump(read, in_tx, closed.clone()));

    DataChannel::from_parts(peer_id, out_tx, in_rx, gauge, None, closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use temposhare_protocol::{ControlMessage, Frame};

    #[tokio::test]
    async fn open_rejects_non_address_id() {
        let err = WsTransport::new().open(Some("not-an-addr")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidId(_)));
    }

    #[tokio::test]
    async fn open_reports_bound_port() {
        let endpoint = WsTransport::new().open(None).await.unwrap();
        assert!(endpoint.id.starts_with("127.0.0.1:"));
        assert!(!endpoint.id.ends_with(":0"));
    }

    #[test]
    fn specific_bind_is_advertised_as_is() {
        let local: SocketAddr = "192.168.1.20:4000".parse().unwrap();
        let lan: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(advertised_addr(local, &[lan]), local);
    }

    #[test]
    fn wildcard_bind_advertises_interface_address() {
        let local: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        let lan: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            advertised_addr(local, &[lan]),
            "10.0.0.5:4000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn wildcard_bind_without_interfaces_falls_back_to_loopback() {
        let local: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        assert_eq!(
            advertised_addr(local, &[]),
            "127.0.0.1:4000".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn wildcard_endpoint_id_is_dialable() {
        let transport = WsTransport::new();
        let mut host = transport.open(Some("0.0.0.0:0")).await.unwrap();
        let addr: SocketAddr = host.id.parse().unwrap();
        assert!(!addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);

        let _guest = transport.dial("guest", &host.id).await.unwrap();
        let accepted = tokio::time::timeout(Duration::from_secs(5), host.incoming.recv())
            .await
            .expect("accepted in time");
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn dial_unreachable_fails() {
        let endpoint = WsTransport::new().open(None).await.unwrap();
        let addr = endpoint.id.clone();
        drop(endpoint);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(WsTransport::new().dial("me", &addr).await.is_err());
    }

    #[tokio::test]
    async fn loopback_exchange_preserves_planes() {
        let transport = WsTransport::new();
        let mut host = transport.open(None).await.unwrap();

        let guest = transport.dial("guest", &host.id).await.unwrap();
        let host_side = tokio::time::timeout(Duration::from_secs(5), host.incoming.recv())
            .await
            .expect("accepted in time")
            .expect("channel");

        let (guest_tx, mut guest_rx) = guest.split();
        let (host_tx, mut host_rx) = host_side.split();

        guest_tx.send_control(&ControlMessage::RequestManifest).unwrap();
        match host_rx.recv().await {
            Some(Frame::Text(t)) => assert_eq!(
                ControlMessage::from_json(&t).unwrap(),
                ControlMessage::RequestManifest
            ),
            other => panic!("expected text frame, got {other:?}"),
        }

        host_tx.send(Frame::chunk(vec![7u8; 1000])).unwrap();
        assert_eq!(guest_rx.recv().await, Some(Frame::chunk(vec![7u8; 1000])));

        host_tx.close();
        let end = tokio::time::timeout(Duration::from_secs(5), guest_rx.recv())
            .await
            .expect("close propagates");
        assert!(end.is_none());
    }
}
