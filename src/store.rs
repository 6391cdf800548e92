//! # store — whole-document JSON blobs on disk
//!
//! Config, equity curve, trade counters and the latest signal each live in
//! one pretty-printed JSON file under `DATA_DIR`. Writes go to a sibling
//! `.tmp` file first and are renamed over the target, so a crash mid-write
//! leaves the previous document intact.
//!
//! There is no cross-process locking: one writer per file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

/// Reads and parses `path`. `Ok(None)` when the file does not exist.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON for this document", path.display()))?;
    Ok(Some(value))
}

/// Serializes `value` and atomically replaces `path`.
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let body = serde_json::to_vec_pretty(value).context("failed to serialize document")?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
