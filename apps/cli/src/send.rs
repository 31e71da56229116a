//! `temposhare send`: share local files until stopped or expired.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use temposhare_data_channel::WsTransport;
use temposhare_protocol::{TransferState, format_bytes};
use temposhare_session::{Sender, SenderEvent, SenderOptions};
use temposhare_transfer::LocalFile;

use crate::config::CliConfig;

pub async fn run(config: &CliConfig, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = LocalFile::from_path(path)
            .await
            .with_context(|| format!("cannot share {}", path.display()))?;
        files.push(file);
    }

    let options = SenderOptions {
        room_id: Some(config.listen_addr.clone()),
        ttl: config.session_ttl(),
        share_base_url: config.share_base_url.clone(),
        ..SenderOptions::default()
    };
    let (handle, mut events) = Sender::start(Arc::new(WsTransport::new()), files, options)
        .await
        .context("failed to start sharing")?;

    let session = handle.session();
    println!("Sharing {} file(s), {}", session.files().len(), format_bytes(session.total_size));
    for file in session.files() {
        println!("  {}  {}", file.descriptor.name, format_bytes(file.descriptor.size));
    }
    println!("Share URL: {}", session.share_url);
    println!("Expires at: {}", session.expires_at.to_rfc3339());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("stopping share");
                // The controller may already be gone.
                let _ = handle.stop_sharing();
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SenderEvent::StateChanged(TransferState::Failed) => {
                        anyhow::bail!("share failed");
                    }
                    SenderEvent::StateChanged(state) => info!(?state, "state changed"),
                    SenderEvent::PeerConnected { peer_id } => info!(peer = %peer_id, "receiver connected"),
                    SenderEvent::PeerDisconnected { peer_id } => info!(peer = %peer_id, "receiver disconnected"),
                    SenderEvent::TransferProgress { file_id, transferred, total } => {
                        tracing::debug!(file_id = %file_id, transferred, total, "sending");
                    }
                    SenderEvent::TransferComplete { file_id } => info!(file_id = %file_id, "file sent"),
                    SenderEvent::DownloadAcknowledged { file_id, download_count } => {
                        let name = handle
                            .session()
                            .file(&file_id)
                            .map(|f| f.descriptor.name.clone())
                            .unwrap_or(file_id);
                        println!("Downloaded: {name} ({download_count} time(s))");
                    }
                    SenderEvent::Error(e) => warn!(error = %e, "share error"),
                    SenderEvent::Expired => {
                        println!("Share expired");
                        break;
                    }
                }
            }
        }
    }

    handle.stopped().await;
    let session = handle.session();
    info!(downloads = session.download_count(), "share ended");
    Ok(())
}
