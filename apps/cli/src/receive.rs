//! `temposhare receive`: download files from a sharing peer.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use temposhare_data_channel::WsTransport;
use temposhare_protocol::{Manifest, TransferState, format_bytes};
use temposhare_session::{Receiver, ReceiverEvent, ReceiverOptions};

use crate::config::CliConfig;

/// Accepts either a bare host id or a share URL built with `base_url`.
fn host_from_arg<'a>(arg: &'a str, base_url: &str) -> &'a str {
    let host = arg.strip_prefix(base_url).unwrap_or(arg);
    host.trim_end_matches('/')
}

/// Ids of the manifest files matching `wanted` by id or name; every file
/// when `wanted` is empty.
fn select_files(manifest: &Manifest, wanted: &[String]) -> Vec<String> {
    manifest
        .files
        .iter()
        .filter(|f| wanted.is_empty() || wanted.iter().any(|w| *w == f.id || *w == f.name))
        .map(|f| f.id.clone())
        .collect()
}

pub async fn run(config: &CliConfig, host: &str, wanted: Vec<String>) -> anyhow::Result<()> {
    let host = host_from_arg(host, &config.share_base_url);
    info!(%host, dir = %config.download_dir.display(), "joining share");

    let (handle, mut events) = Receiver::start(
        Arc::new(WsTransport::new()),
        host,
        ReceiverOptions::default(),
    );
    let mut pending: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("cancelled");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ReceiverEvent::StateChanged(TransferState::Failed) => {
                        anyhow::bail!("could not reach {host}");
                    }
                    ReceiverEvent::StateChanged(state) => debug!(?state, "state changed"),
                    ReceiverEvent::ManifestReceived(manifest) => {
                        println!("{} file(s), {}", manifest.files.len(), format_bytes(manifest.total_size));
                        for file in &manifest.files {
                            println!("  {}  {}", file.name, format_bytes(file.size));
                        }

                        let selected = select_files(&manifest, &wanted);
                        if selected.is_empty() {
                            warn!("nothing to download");
                            break;
                        }
                        if selected.len() == manifest.files.len() {
                            handle.download_all()?;
                        } else {
                            for id in &selected {
                                handle.queue_download(id)?;
                            }
                        }
                        pending.extend(selected);
                    }
                    ReceiverEvent::Progress { file_id, progress } => {
                        debug!(
                            file_id = %file_id,
                            percentage = progress.percentage,
                            speed = %progress.speed,
                            "receiving"
                        );
                    }
                    ReceiverEvent::FileCompleted { file_id, size } => {
                        let path = handle
                            .save_file(&file_id, config.download_dir.clone())
                            .await
                            .with_context(|| format!("failed to save {file_id}"))?;
                        println!("Saved {} ({})", path.display(), format_bytes(size));

                        pending.remove(&file_id);
                        if pending.is_empty() {
                            break;
                        }
                    }
                    ReceiverEvent::Disconnected => {
                        if !pending.is_empty() {
                            warn!(remaining = pending.len(), "sender disconnected");
                        }
                        break;
                    }
                    ReceiverEvent::Error(e) => warn!(error = %e, "receive error"),
                }
            }
        }
    }

    // The controller may already be gone.
    let _ = handle.close();
    handle.closed().await;

    if pending.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} file(s) not downloaded", pending.len())
    }
}
