use std::path::{Component, Path, PathBuf};

use tracing::info;

use crate::TransferError;

/// Reduces a peer-supplied file name to a single safe path component.
///
/// Directory parts are stripped; names that reduce to nothing, `.` or `..`
/// are rejected.
pub fn sanitize_file_name(name: &str) -> Result<String, TransferError> {
    let normalized = name.replace('\\', "/");
    let last = normalized.rsplit('/').next().unwrap_or_default().trim();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();

    let mut components = Path::new(&cleaned).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(part.to_string_lossy().into_owned()),
        _ => Err(TransferError::InvalidName(name.to_string())),
    }
}

/// Writes `data` to `dir/<sanitized name>`, creating `dir` if needed.
pub async fn save_to_dir(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, TransferError> {
    let file_name = sanitize_file_name(name)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, data).await?;
    info!(path = %path.display(), bytes = data.len(), "file saved");
    Ok(path)
}
