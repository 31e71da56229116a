//! WebSocket pumps bridging a socket to a [`DataChannel`](crate::DataChannel).

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use temposhare_protocol::Frame;

use crate::BufferGauge;

/// Writes queued frames to the socket, releasing the gauge as each frame
/// is flushed.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    gauge: BufferGauge,
    closed: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let len = frame.len();
                let msg = match frame {
                    Frame::Text(text) => tungstenite::Message::Text(text.into()),
                    Frame::Binary(data) => tungstenite::Message::Binary(data),
                };
                if let Err(e) = write.send(msg).await {
                    warn!("WebSocket write error: {e}");
                    break;
                }
                gauge.release(len);
            }
        }
    }

    closed.cancel();
    let _ = write.send(tungstenite::Message::Close(None)).await;
}

/// Reads socket messages into the inbound queue until the socket or the
/// channel closes.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound: mpsc::UnboundedSender<Frame>,
    closed: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = read.next() => {
                let frame = match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
                    Some(Ok(tungstenite::Message::Binary(data))) => Frame::Binary(data),
                    Some(Ok(tungstenite::Message::Close(_))) => {
                        debug!("received close frame");
                        break;
                    }
                    Some(Ok(other)) => {
                        trace!(?other, "ignoring control message");
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                };
                if inbound.send(frame).is_err() {
                    break;
                }
            }
        }
    }

    closed.cancel();
}
