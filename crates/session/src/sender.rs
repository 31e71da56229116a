//! Sender flow: share a session and serve download requests.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use temposhare_connection::{ConnectPolicy, ConnectionError, ConnectionEvent, ConnectionManager};
use temposhare_data_channel::Transport;
use temposhare_protocol::constants::SESSION_TTL;
use temposhare_protocol::{ControlMessage, TransferState};
use temposhare_transfer::{FlowControl, LocalFile, TransferEngine, TransferError};

use crate::handshake::ManifestResponder;
use crate::session::Session;
use crate::state::{Role, StateMachine};
use crate::SessionError;

/// Prefix for share URLs when none is configured.
pub const DEFAULT_SHARE_BASE_URL: &str = "temposhare://";

/// Settings for a share.
#[derive(Debug, Clone)]
pub struct SenderOptions {
    /// Endpoint id to register; the transport picks one when `None`.
    pub room_id: Option<String>,
    pub ttl: Duration,
    pub share_base_url: String,
    pub connect: ConnectPolicy,
    pub flow: FlowControl,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            room_id: None,
            ttl: SESSION_TTL,
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
            connect: ConnectPolicy::default(),
            flow: FlowControl::default(),
        }
    }
}

/// Events reported by a running share.
#[derive(Debug)]
pub enum SenderEvent {
    StateChanged(TransferState),
    PeerConnected { peer_id: String },
    PeerDisconnected { peer_id: String },
    /// Sent after each chunk of the file being streamed.
    TransferProgress { file_id: String, transferred: u64, total: u64 },
    /// The last chunk and `FILE_END` have been queued.
    TransferComplete { file_id: String },
    /// The receiver confirmed it reassembled the file.
    DownloadAcknowledged { file_id: String, download_count: u32 },
    Error(SessionError),
    /// The session reached its expiry and was torn down.
    Expired,
}

enum Command {
    Stop,
}

/// Entry point for sharing files.
pub struct Sender;

impl Sender {
    /// Registers the endpoint, builds the [`Session`] under the endpoint's
    /// id and starts serving it.
    ///
    /// Fails if the endpoint cannot be registered; the share is then over.
    pub async fn start<T: Transport>(
        transport: Arc<T>,
        files: Vec<LocalFile>,
        options: SenderOptions,
    ) -> Result<(SenderHandle, mpsc::UnboundedReceiver<SenderEvent>), SessionError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = StateMachine::new(Role::Sender);
        let emit_state = |s: TransferState| {
            if state.advance(s) {
                let _ = events_tx.send(SenderEvent::StateChanged(s));
            }
        };

        emit_state(TransferState::Initializing);
        let conn = ConnectionManager::with_policy(transport, options.connect.clone());
        let conn_events = conn.take_events().ok_or(SessionError::Stopped)?;

        let id = match conn.initialize(options.room_id.as_deref()).await {
            Ok(id) => id,
            Err(e) => {
                error!("share failed to start: {e}");
                emit_state(TransferState::Failed);
                return Err(e.into());
            }
        };

        let session = Session::new(&id, files, options.ttl, &options.share_base_url);
        info!(
            session = %session.session_id,
            files = session.files().len(),
            total = session.total_size,
            url = %session.share_url,
            "sharing started"
        );
        let responder = ManifestResponder::new(&session.manifest())?;
        emit_state(TransferState::Waiting);

        let session = Arc::new(RwLock::new(session));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let state_rx = state.subscribe();

        let controller = SenderController {
            conn,
            session: Arc::clone(&session),
            responder,
            engine: TransferEngine::new(options.flow),
            state,
            events: events_tx,
            done_tx,
            in_flight: None,
            deferred: None,
        };
        tokio::spawn(controller.run(conn_events, commands_rx, done_rx, options.ttl));

        Ok((
            SenderHandle {
                commands: commands_tx,
                session,
                state: state_rx,
            },
            events_rx,
        ))
    }
}

/// Controls a running share. Dropping every handle stops sharing.
#[derive(Clone)]
pub struct SenderHandle {
    commands: mpsc::UnboundedSender<Command>,
    session: Arc<RwLock<Session>>,
    state: watch::Receiver<TransferState>,
}

impl SenderHandle {
    /// Snapshot of the session, including download counters.
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransferState> {
        self.state.clone()
    }

    /// Tears the connection down immediately. In-flight transfers are
    /// abandoned.
    pub fn stop_sharing(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Stop)
            .map_err(|_| SessionError::Stopped)
    }

    /// Resolves once the share has stopped.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }
}

struct TransferDone {
    file_id: String,
    result: Result<u64, TransferError>,
}

/// The transfer currently holding the engine.
struct InFlight {
    file_id: String,
    cancel: CancellationToken,
}

struct SenderController<T: Transport> {
    conn: ConnectionManager<T>,
    session: Arc<RwLock<Session>>,
    responder: ManifestResponder,
    engine: TransferEngine,
    state: StateMachine,
    events: mpsc::UnboundedSender<SenderEvent>,
    done_tx: mpsc::UnboundedSender<TransferDone>,
    in_flight: Option<InFlight>,
    /// Request from a new peer that arrived while a cancelled transfer was
    /// still releasing the engine.
    deferred: Option<String>,
}

impl<T: Transport> SenderController<T> {
    async fn run(
        mut self,
        mut conn_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut done: mpsc::UnboundedReceiver<TransferDone>,
        ttl: Duration,
    ) {
        let expiry = tokio::time::sleep(ttl);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Stop) | None => {
                        info!("sharing stopped");
                        break;
                    }
                },
                event = conn_events.recv() => match event {
                    Some(event) => {
                        if !self.handle_connection_event(event) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(finished) = done.recv() => self.handle_transfer_done(finished),
                _ = &mut expiry => {
                    info!("session expired");
                    let _ = self.events.send(SenderEvent::Expired);
                    break;
                }
            }
        }

        self.conn.destroy();
    }

    /// Returns `false` when the share can no longer continue.
    fn handle_connection_event(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Ready { .. } => {}
            ConnectionEvent::Connected { peer_id } => {
                // A new channel replaced the one the transfer was writing to.
                self.cancel_in_flight();
                let _ = self.events.send(SenderEvent::PeerConnected { peer_id });
            }
            ConnectionEvent::Disconnected { peer_id } => {
                self.cancel_in_flight();
                let _ = self.events.send(SenderEvent::PeerDisconnected { peer_id });
            }
            ConnectionEvent::Control(msg) => self.handle_control(msg),
            ConnectionEvent::Binary(data) => {
                debug!(len = data.len(), "ignoring binary frame from receiver");
            }
            ConnectionEvent::Error(e) => {
                let fatal = e.is_fatal() || matches!(e, ConnectionError::EndpointClosed);
                warn!("connection error: {e}");
                if fatal {
                    self.set_state(TransferState::Failed);
                }
                let _ = self.events.send(SenderEvent::Error(e.into()));
                return !fatal;
            }
        }
        true
    }

    fn handle_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::RequestManifest => {
                let Some(channel) = self.conn.channel() else {
                    return;
                };
                if let Err(e) = self.responder.respond(&channel) {
                    warn!("failed to send manifest: {e}");
                }
            }
            ControlMessage::RequestDownload { file_id } => self.start_transfer(&file_id),
            ControlMessage::DownloadComplete { file_id } => {
                let count = self
                    .session
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_download(&file_id, Utc::now());
                match count {
                    Some(download_count) => {
                        info!(file_id = %file_id, download_count, "download acknowledged");
                        let _ = self.events.send(SenderEvent::DownloadAcknowledged {
                            file_id,
                            download_count,
                        });
                        if !self.engine.is_busy() {
                            self.set_state(TransferState::Waiting);
                        }
                    }
                    None => warn!(file_id = %file_id, "acknowledgement for unknown file"),
                }
            }
            other => debug!(kind = other.kind(), "ignoring message not meant for sender"),
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = &self.in_flight {
            if !in_flight.cancel.is_cancelled() {
                info!(file_id = %in_flight.file_id, "abandoning transfer to previous peer");
                in_flight.cancel.cancel();
            }
        }
        self.deferred = None;
    }

    fn start_transfer(&mut self, file_id: &str) {
        let Some(file) = self
            .session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .file(file_id)
            .cloned()
        else {
            warn!(file_id = %file_id, "download requested for unknown file");
            return;
        };

        let transfer = match self.conn.channel() {
            Some(channel) => self.engine.begin(&channel, &file.descriptor),
            None => Err(TransferError::NoConnection),
        };
        let transfer = match transfer {
            Ok(t) => t,
            Err(TransferError::ChannelBusy)
                if self.in_flight.as_ref().is_some_and(|f| f.cancel.is_cancelled()) =>
            {
                debug!(file_id = %file_id, "deferring request until the abandoned transfer stops");
                self.deferred = Some(file_id.to_string());
                return;
            }
            Err(e) => {
                warn!(file_id = %file_id, "cannot start transfer: {e}");
                let _ = self.events.send(SenderEvent::Error(e.into()));
                return;
            }
        };

        self.set_state(TransferState::Transferring);
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            file_id: file_id.to_string(),
            cancel: cancel.clone(),
        });

        let events = self.events.clone();
        let done = self.done_tx.clone();
        let file_id = file_id.to_string();
        tokio::spawn(async move {
            let stream = async {
                match file.local.open().await {
                    Ok(reader) => {
                        transfer
                            .run(reader, |transferred, total| {
                                let _ = events.send(SenderEvent::TransferProgress {
                                    file_id: file_id.clone(),
                                    transferred,
                                    total,
                                });
                            })
                            .await
                    }
                    Err(e) => Err(TransferError::from(e)),
                }
            };
            // Dropping the stream releases the engine.
            let result = tokio::select! {
                result = stream => result,
                _ = cancel.cancelled() => Err(TransferError::ConnectionLost),
            };
            let _ = done.send(TransferDone { file_id, result });
        });
    }

    fn handle_transfer_done(&mut self, done: TransferDone) {
        match done.result {
            Ok(sent) => {
                info!(file_id = %done.file_id, bytes = sent, "transfer complete");
                let _ = self.events.send(SenderEvent::TransferComplete {
                    file_id: done.file_id,
                });
            }
            Err(e) => {
                warn!(file_id = %done.file_id, "transfer failed: {e}");
                let _ = self.events.send(SenderEvent::Error(e.into()));
            }
        }
        self.in_flight = None;
        self.set_state(TransferState::Waiting);
        if let Some(file_id) = self.deferred.take() {
            self.start_transfer(&file_id);
        }
    }

    fn set_state(&self, next: TransferState) {
        if self.state.advance(next) {
            let _ = self.events.send(SenderEvent::StateChanged(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temposhare_data_channel::{
        ChannelReceiver, ChannelSender, MemoryTransport, Transport, TransportError,
    };
    use temposhare_protocol::{Frame, Payload};

    fn options(room: &str) -> SenderOptions {
        SenderOptions {
            room_id: Some(room.to_string()),
            ..SenderOptions::default()
        }
    }

    fn files() -> Vec<LocalFile> {
        vec![
            LocalFile::from_bytes("small.txt", vec![b's'; 100]),
            LocalFile::from_bytes("big.bin", vec![b'b'; 2 * 1024 * 1024]),
        ]
    }

    async fn join(transport: &MemoryTransport, room: &str) -> (ChannelSender, ChannelReceiver) {
        transport.dial("guest", room).await.unwrap().split()
    }

    async fn next_frame(rx: &mut ChannelReceiver) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open")
    }

    async fn next_control(rx: &mut ChannelReceiver) -> ControlMessage {
        loop {
            match next_frame(rx).await.decode().unwrap() {
                Payload::Control(msg) => return msg,
                Payload::Chunk(_) => continue,
            }
        }
    }

    async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SenderEvent>, mut pred: F) -> SenderEvent
    where
        F: FnMut(&SenderEvent) -> bool,
    {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
                .await
                .expect("event in time")
                .expect("events open");
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn start_creates_session_under_room_id() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), options("ROOM123"))
            .await
            .unwrap();

        let session = handle.session();
        assert_eq!(session.session_id, "ROOM123");
        assert_eq!(session.share_url, "temposhare://ROOM123");
        assert!(session.files()[0].descriptor.id.starts_with("ROOM123-0-"));
        assert_eq!(handle.state(), TransferState::Waiting);

        assert!(matches!(
            events.recv().await,
            Some(SenderEvent::StateChanged(TransferState::Initializing))
        ));
        assert!(matches!(
            events.recv().await,
            Some(SenderEvent::StateChanged(TransferState::Waiting))
        ));
    }

    #[tokio::test]
    async fn start_fails_when_room_is_taken() {
        let transport = Arc::new(MemoryTransport::new());
        let _squatter = transport.open(Some("taken")).await.unwrap();
        let err = Sender::start(transport, files(), options("taken"))
            .await
            .err()
            .expect("start fails");
        assert!(matches!(
            err,
            SessionError::Connection(ConnectionError::Transport(TransportError::IdTaken(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_manifest_requests_get_identical_answers() {
        let transport = Arc::new(MemoryTransport::new());
        let (_handle, _events) = Sender::start(Arc::clone(&transport), files(), options("dup"))
            .await
            .unwrap();
        let (tx, mut rx) = join(&transport, "dup").await;

        tx.send_control(&ControlMessage::RequestManifest).unwrap();
        let first = next_frame(&mut rx).await;
        tx.send_control(&ControlMessage::RequestManifest).unwrap();
        let second = next_frame(&mut rx).await;
        assert_eq!(first, second);

        match first.decode().unwrap() {
            Payload::Control(ControlMessage::Manifest(m)) => {
                assert_eq!(m.files.len(), 2);
                assert_eq!(m.total_size, 100 + 2 * 1024 * 1024);
            }
            other => panic!("expected manifest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streams_requested_file_and_counts_acknowledgement() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), options("send"))
            .await
            .unwrap();
        let file_id = handle.session().files()[0].descriptor.id.clone();
        let (tx, mut rx) = join(&transport, "send").await;

        tx.send_control(&ControlMessage::RequestDownload {
            file_id: file_id.clone(),
        })
        .unwrap();

        match next_control(&mut rx).await {
            ControlMessage::FileStart(start) => {
                assert_eq!(start.file_id, file_id);
                assert_eq!(start.name, "small.txt");
                assert_eq!(start.size, 100);
                assert_eq!(start.mime_type, "text/plain");
            }
            other => panic!("expected FILE_START, got {other:?}"),
        }
        match next_frame(&mut rx).await {
            Frame::Binary(data) => assert_eq!(data.len(), 100),
            other => panic!("expected chunk, got {other:?}"),
        }
        assert_eq!(
            next_control(&mut rx).await,
            ControlMessage::FileEnd { file_id: file_id.clone() }
        );

        wait_for(&mut events, |e| {
            matches!(e, SenderEvent::StateChanged(TransferState::Transferring))
        })
        .await;
        let progress = wait_for(&mut events, |e| matches!(e, SenderEvent::TransferProgress { .. })).await;
        assert!(matches!(
            progress,
            SenderEvent::TransferProgress { transferred: 100, total: 100, .. }
        ));
        wait_for(&mut events, |e| matches!(e, SenderEvent::TransferComplete { .. })).await;
        wait_for(&mut events, |e| {
            matches!(e, SenderEvent::StateChanged(TransferState::Waiting))
        })
        .await;

        tx.send_control(&ControlMessage::DownloadComplete {
            file_id: file_id.clone(),
        })
        .unwrap();
        let ack = wait_for(&mut events, |e| matches!(e, SenderEvent::DownloadAcknowledged { .. })).await;
        assert!(matches!(ack, SenderEvent::DownloadAcknowledged { download_count: 1, .. }));

        let session = handle.session();
        assert_eq!(session.download_count(), 1);
        assert!(session.file(&file_id).unwrap().last_downloaded_at.is_some());
    }

    #[tokio::test]
    async fn unknown_file_request_is_ignored() {
        let transport = Arc::new(MemoryTransport::new());
        let (_handle, _events) = Sender::start(Arc::clone(&transport), files(), options("unk"))
            .await
            .unwrap();
        let (tx, mut rx) = join(&transport, "unk").await;

        tx.send_control(&ControlMessage::RequestDownload {
            file_id: "missing".into(),
        })
        .unwrap();
        tx.send_control(&ControlMessage::RequestManifest).unwrap();

        // The only answer is the manifest.
        assert!(matches!(
            next_control(&mut rx).await,
            ControlMessage::Manifest(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_while_streaming_is_busy() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), options("busy"))
            .await
            .unwrap();
        let session = handle.session();
        let big = session.files()[1].descriptor.id.clone();
        let small = session.files()[0].descriptor.id.clone();
        let (tx, _rx) = join(&transport, "busy").await;

        tx.send_control(&ControlMessage::RequestDownload { file_id: big }).unwrap();
        wait_for(&mut events, |e| matches!(e, SenderEvent::TransferProgress { .. })).await;
        tx.send_control(&ControlMessage::RequestDownload { file_id: small }).unwrap();

        let err = wait_for(&mut events, |e| matches!(e, SenderEvent::Error(_))).await;
        assert!(matches!(
            err,
            SenderEvent::Error(SessionError::Transfer(TransferError::ChannelBusy))
        ));
        assert_eq!(handle.state(), TransferState::Transferring);
    }

    #[tokio::test]
    async fn replacing_peer_mid_stream_serves_the_new_peer() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), options("swap"))
            .await
            .unwrap();
        let session = handle.session();
        let big = session.files()[1].descriptor.id.clone();
        let small = session.files()[0].descriptor.id.clone();

        let (first_tx, _first_rx) = join(&transport, "swap").await;
        first_tx
            .send_control(&ControlMessage::RequestDownload { file_id: big })
            .unwrap();
        wait_for(&mut events, |e| matches!(e, SenderEvent::TransferProgress { .. })).await;

        let (second_tx, mut second_rx) = transport.dial("second", "swap").await.unwrap().split();
        second_tx
            .send_control(&ControlMessage::RequestDownload {
                file_id: small.clone(),
            })
            .unwrap();

        match next_control(&mut second_rx).await {
            ControlMessage::FileStart(start) => assert_eq!(start.file_id, small),
            other => panic!("expected FILE_START, got {}", other.kind()),
        }
        assert_eq!(
            next_control(&mut second_rx).await,
            ControlMessage::FileEnd {
                file_id: small.clone()
            }
        );

        loop {
            match wait_for(&mut events, |_| true).await {
                SenderEvent::Error(SessionError::Transfer(TransferError::ChannelBusy)) => {
                    panic!("new peer was refused as busy")
                }
                SenderEvent::TransferComplete { file_id } if file_id == small => break,
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn peer_leaving_mid_stream_reports_connection_lost() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), options("lost"))
            .await
            .unwrap();
        let big = handle.session().files()[1].descriptor.id.clone();
        let (tx, _rx) = join(&transport, "lost").await;

        tx.send_control(&ControlMessage::RequestDownload { file_id: big }).unwrap();
        wait_for(&mut events, |e| matches!(e, SenderEvent::TransferProgress { .. })).await;
        tx.close();

        let err = wait_for(&mut events, |e| matches!(e, SenderEvent::Error(_))).await;
        assert!(matches!(
            err,
            SenderEvent::Error(SessionError::Transfer(TransferError::ConnectionLost))
        ));
        wait_for(&mut events, |e| {
            matches!(e, SenderEvent::StateChanged(TransferState::Waiting))
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_tears_down_share() {
        let transport = Arc::new(MemoryTransport::new());
        let opts = SenderOptions {
            ttl: Duration::from_secs(5),
            ..options("exp")
        };
        let (handle, mut events) = Sender::start(Arc::clone(&transport), files(), opts)
            .await
            .unwrap();

        wait_for(&mut events, |e| matches!(e, SenderEvent::Expired)).await;
        handle.stopped().await;
        assert!(handle.stop_sharing().is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(transport.dial("late", "exp").await.is_err());
    }

    #[tokio::test]
    async fn stop_sharing_closes_channel() {
        let transport = Arc::new(MemoryTransport::new());
        let (handle, _events) = Sender::start(Arc::clone(&transport), files(), options("stop"))
            .await
            .unwrap();
        let (_tx, mut rx) = join(&transport, "stop").await;

        handle.stop_sharing().unwrap();
        let end = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(end.is_none());
        handle.stopped().await;
    }
}
