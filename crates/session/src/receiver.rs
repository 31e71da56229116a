//! Receiver flow: join a room, fetch the manifest and download files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use temposhare_connection::{ConnectPolicy, ConnectionError, ConnectionEvent, ConnectionManager};
use temposhare_data_channel::Transport;
use temposhare_protocol::constants::SPEED_SAMPLE_INTERVAL;
use temposhare_protocol::{ControlMessage, FileProgress, FileStatus, Manifest, TransferState};
use temposhare_transfer::{Assembly, ChunkOutcome, DownloadQueue, Finalized, save_to_dir};

use crate::handshake::{HandshakePolicy, ManifestRetry};
use crate::state::{Role, StateMachine};
use crate::SessionError;

/// Settings for joining a room.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    pub connect: ConnectPolicy,
    pub handshake: HandshakePolicy,
    /// How often the active file's speed is recomputed.
    pub speed_interval: Duration,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            connect: ConnectPolicy::default(),
            handshake: HandshakePolicy::default(),
            speed_interval: SPEED_SAMPLE_INTERVAL,
        }
    }
}

/// Events reported by a receiver.
#[derive(Debug)]
pub enum ReceiverEvent {
    StateChanged(TransferState),
    ManifestReceived(Manifest),
    /// A file's progress record changed.
    Progress { file_id: String, progress: FileProgress },
    /// A file was fully reassembled and acknowledged.
    FileCompleted { file_id: String, size: u64 },
    /// The channel to the sender closed.
    Disconnected,
    Error(SessionError),
}

/// Point-in-time view of a receiver.
#[derive(Debug, Clone)]
pub struct ReceiverSnapshot {
    pub state: TransferState,
    pub manifest: Option<Manifest>,
    /// Progress records in manifest order.
    pub files: Vec<(String, FileProgress)>,
}

impl ReceiverSnapshot {
    pub fn progress(&self, file_id: &str) -> Option<&FileProgress> {
        self.files
            .iter()
            .find(|(id, _)| id == file_id)
            .map(|(_, p)| p)
    }
}

enum Command {
    Queue(String),
    DownloadAll,
    Save {
        file_id: String,
        dir: PathBuf,
        reply: oneshot::Sender<Result<PathBuf, SessionError>>,
    },
    Snapshot(oneshot::Sender<ReceiverSnapshot>),
    Close,
}

/// Entry point for joining a room.
pub struct Receiver;

impl Receiver {
    /// Starts joining `host_id` in the background.
    ///
    /// Progress through `INITIALIZING`, `CONNECTING` and `CONNECTED` is
    /// reported as [`ReceiverEvent::StateChanged`]; failing to reach the
    /// host ends in `FAILED`.
    pub fn start<T: Transport>(
        transport: Arc<T>,
        host_id: &str,
        options: ReceiverOptions,
    ) -> (ReceiverHandle, mpsc::UnboundedReceiver<ReceiverEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let state = StateMachine::new(Role::Receiver);
        let state_rx = state.subscribe();

        let controller = ReceiverController {
            conn: ConnectionManager::with_policy(transport, options.connect.clone()),
            state,
            events: events_tx,
            assembly: Assembly::new(),
            queue: DownloadQueue::new(),
            manifest: None,
            retry: None,
        };
        tokio::spawn(controller.run(host_id.to_string(), options, commands_rx));

        (
            ReceiverHandle {
                commands: commands_tx,
                state: state_rx,
            },
            events_rx,
        )
    }
}

/// Controls a receiver. Dropping every handle disconnects.
#[derive(Clone)]
pub struct ReceiverHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TransferState>,
}

impl ReceiverHandle {
    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransferState> {
        self.state.clone()
    }

    /// Queues one file. Ignored unless the file is `idle`.
    pub fn queue_download(&self, file_id: &str) -> Result<(), SessionError> {
        self.send(Command::Queue(file_id.to_string()))
    }

    /// Queues every `idle` file in manifest order.
    pub fn download_all(&self) -> Result<(), SessionError> {
        self.send(Command::DownloadAll)
    }

    /// Writes a downloaded file into `dir` and marks it `saved`.
    pub async fn save_file(
        &self,
        file_id: &str,
        dir: impl Into<PathBuf>,
    ) -> Result<PathBuf, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Save {
            file_id: file_id.to_string(),
            dir: dir.into(),
            reply,
        })?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn snapshot(&self) -> Result<ReceiverSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Closes the connection. In-flight downloads are abandoned.
    pub fn close(&self) -> Result<(), SessionError> {
        self.send(Command::Close)
    }

    /// Resolves once the receiver has shut down.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }

    fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.commands.send(cmd).map_err(|_| SessionError::Stopped)
    }
}

struct ReceiverController<T: Transport> {
    conn: ConnectionManager<T>,
    state: StateMachine,
    events: mpsc::UnboundedSender<ReceiverEvent>,
    assembly: Assembly,
    queue: DownloadQueue,
    manifest: Option<Manifest>,
    retry: Option<ManifestRetry>,
}

impl<T: Transport> ReceiverController<T> {
    async fn run(
        mut self,
        host_id: String,
        options: ReceiverOptions,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let Some(mut conn_events) = self.conn.take_events() else {
            return;
        };

        if let Err(e) = self.join(&host_id, &options.handshake).await {
            error!(host = %host_id, "could not join: {e}");
            self.set_state(TransferState::Failed);
            self.emit(ReceiverEvent::Error(e));
            return;
        }

        let mut ticker = tokio::time::interval(options.speed_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Close) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                event = conn_events.recv() => match event {
                    Some(event) => {
                        if !self.handle_connection_event(event) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some((file_id, progress)) = self.assembly.sample_speed() {
                        self.emit(ReceiverEvent::Progress { file_id, progress });
                    }
                }
            }
        }

        info!(host = %host_id, "receiver closed");
        self.retry = None;
        self.conn.destroy();
    }

    async fn join(&mut self, host_id: &str, handshake: &HandshakePolicy) -> Result<(), SessionError> {
        self.set_state(TransferState::Initializing);
        self.conn.initialize(None).await?;
        self.set_state(TransferState::Connecting);
        self.conn.connect_to_host(host_id).await?;

        let channel = self.conn.channel().ok_or(ConnectionError::NoConnection)?;
        info!(host = %host_id, "connected, requesting manifest");
        self.retry = Some(ManifestRetry::start(channel, handshake));
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Queue(file_id) => {
                self.enqueue(&file_id);
                self.advance_queue();
            }
            Command::DownloadAll => {
                for file_id in self.assembly.book().idle_files() {
                    self.enqueue(&file_id);
                }
                self.advance_queue();
            }
            Command::Save { file_id, dir, reply } => {
                let result = self.save(&file_id, dir).await;
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Close => {}
        }
    }

    /// Returns `false` when the receiver cannot continue.
    fn handle_connection_event(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Ready { .. } | ConnectionEvent::Connected { .. } => {}
            ConnectionEvent::Control(msg) => self.handle_control(msg),
            ConnectionEvent::Binary(data) => match self.assembly.chunk(data) {
                ChunkOutcome::Dropped => {}
                ChunkOutcome::Progress { file_id } => self.emit_progress(&file_id),
                ChunkOutcome::Finalized(done) => self.on_finalized(done),
            },
            ConnectionEvent::Disconnected { peer_id } => {
                info!(peer = %peer_id, "sender disconnected");
                self.retry = None;
                if self.assembly.abort_active().is_some() {
                    self.emit(ReceiverEvent::Error(ConnectionError::ConnectionLost.into()));
                }
                self.reset_queue();
                self.emit(ReceiverEvent::Disconnected);
            }
            ConnectionEvent::Error(e) => {
                warn!("connection error: {e}");
                let fatal = e.is_fatal() || matches!(e, ConnectionError::EndpointClosed);
                if fatal {
                    self.set_state(TransferState::Failed);
                }
                self.emit(ReceiverEvent::Error(e.into()));
                return !fatal;
            }
        }
        true
    }

    fn handle_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Manifest(manifest) => {
                if let Some(retry) = self.retry.take() {
                    retry.stop();
                }
                if self.manifest.is_some() {
                    debug!("duplicate manifest ignored");
                    return;
                }
                info!(files = manifest.files.len(), total = manifest.total_size, "manifest received");
                self.assembly.load_manifest(&manifest);
                self.manifest = Some(manifest.clone());
                self.emit(ReceiverEvent::ManifestReceived(manifest));
                self.set_state(TransferState::Connected);
            }
            ControlMessage::FileStart(start) => {
                if self.assembly.file_start(&start) {
                    self.emit_progress(&start.file_id);
                }
            }
            ControlMessage::FileEnd { file_id } => {
                if let Some(done) = self.assembly.file_end(&file_id) {
                    self.on_finalized(done);
                }
            }
            other => debug!(kind = other.kind(), "ignoring message not meant for receiver"),
        }
    }

    fn on_finalized(&mut self, done: Finalized) {
        let Finalized { file_id, data } = done;
        if let Err(e) = self.conn.send(&ControlMessage::DownloadComplete {
            file_id: file_id.clone(),
        }) {
            warn!(file_id = %file_id, "could not acknowledge download: {e}");
        }
        self.queue.complete(&file_id);
        self.emit_progress(&file_id);
        self.emit(ReceiverEvent::FileCompleted {
            file_id,
            size: data.len() as u64,
        });
        self.advance_queue();
    }

    fn enqueue(&mut self, file_id: &str) {
        match self.assembly.book().status(file_id) {
            Some(FileStatus::Idle) => {}
            Some(status) => {
                debug!(file_id = %file_id, ?status, "not queueing, file is not idle");
                return;
            }
            None => {
                warn!(file_id = %file_id, "not queueing unknown file");
                self.emit(ReceiverEvent::Error(SessionError::UnknownFile(file_id.to_string())));
                return;
            }
        }
        if self.queue.enqueue(file_id) {
            self.assembly.book_mut().set_status(file_id, FileStatus::Queued);
            self.emit_progress(file_id);
        }
    }

    fn advance_queue(&mut self) {
        let Some(file_id) = self.queue.advance() else {
            return;
        };
        if let Err(e) = self.conn.send(&ControlMessage::RequestDownload {
            file_id: file_id.clone(),
        }) {
            warn!(file_id = %file_id, "download request not sent: {e}");
            self.emit(ReceiverEvent::Error(e.into()));
            // Nothing was dispatched, so every queued file goes back to idle.
            self.reset_queue();
        }
    }

    /// Returns files that were queued but never started to `idle`.
    fn reset_queue(&mut self) {
        let mut reset = self.queue.clear();
        reset.extend(
            self.assembly
                .book()
                .iter()
                .filter(|(_, p)| p.status == FileStatus::Queued)
                .map(|(id, _)| id.to_string()),
        );
        reset.sort();
        reset.dedup();
        for file_id in reset {
            if self.assembly.book_mut().set_status(&file_id, FileStatus::Idle) {
                self.emit_progress(&file_id);
            }
        }
    }

    async fn save(&mut self, file_id: &str, dir: PathBuf) -> Result<PathBuf, SessionError> {
        let name = self
            .manifest
            .as_ref()
            .and_then(|m| m.file(file_id))
            .map(|f| f.name.clone())
            .ok_or_else(|| SessionError::UnknownFile(file_id.to_string()))?;
        let data = self
            .assembly
            .progress(file_id)
            .filter(|p| p.status.is_finished())
            .and_then(|p| p.data.clone())
            .ok_or_else(|| SessionError::NotCompleted(file_id.to_string()))?;

        let path = save_to_dir(&dir, &name, &data).await?;
        self.assembly.book_mut().set_status(file_id, FileStatus::Saved);
        self.emit_progress(file_id);
        Ok(path)
    }

    fn snapshot(&self) -> ReceiverSnapshot {
        ReceiverSnapshot {
            state: self.state.current(),
            manifest: self.manifest.clone(),
            files: self
                .assembly
                .book()
                .iter()
                .map(|(id, p)| (id.to_string(), p.clone()))
                .collect(),
        }
    }

    fn emit_progress(&self, file_id: &str) {
        if let Some(progress) = self.assembly.progress(file_id) {
            self.emit(ReceiverEvent::Progress {
                file_id: file_id.to_string(),
                progress: progress.clone(),
            });
        }
    }

    fn emit(&self, event: ReceiverEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: TransferState) {
        if self.state.advance(next) {
            self.emit(ReceiverEvent::StateChanged(next));
        }
    }
}
