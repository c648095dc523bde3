use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::compositor::CompositionResult;
use super::{data_uri, GridError};

/// Name every download is saved under
pub const DOWNLOAD_FILENAME: &str = "九宫格图片.png";

/// The composed PNG as a data URI, the same artifact used for preview and download
pub fn to_data_uri(result: &CompositionResult) -> String {
    data_uri::encode("image/png", &result.png)
}

/// Save a data URI into `dir` the way a browser download would:
/// an existing file is never overwritten, a numbered name is picked instead
pub async fn download(uri: &str, dir: &Path, filename: &str) -> Result<PathBuf, GridError> {
    let (_, bytes) = data_uri::decode(uri)?;

    let export_err = |path: &Path, e: std::io::Error| GridError::ExportFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| export_err(dir, e))?;

    let (path, mut file) = create_unique(dir, filename)
        .await
        .map_err(|e| export_err(&dir.join(filename), e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| export_err(&path, e))?;
    file.flush().await.map_err(|e| export_err(&path, e))?;

    tracing::info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

/// Create `name.png`, then `name (1).png`, `name (2).png`, ...
/// The existence check and the create are one step, so a name taken by a
/// concurrent save is skipped rather than truncated.
async fn create_unique(dir: &Path, filename: &str) -> std::io::Result<(PathBuf, File)> {
    let as_path = Path::new(filename);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let ext = as_path.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 0u32;
    loop {
        let name = match (n, &ext) {
            (0, _) => filename.to_string(),
            (_, Some(ext)) => format!("{} ({}).{}", stem, n, ext),
            (_, None) => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}
