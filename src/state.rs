use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::Result;

/// Progress of a resumable upload, written after each acknowledged chunk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadCheckpoint {
    pub upload_id: String,
    pub filename: String,
    pub file_size: u64,
    pub chunk_size: u64,
    pub chunks_confirmed: u64,
}

impl UploadCheckpoint {
    /// A checkpoint only applies to the same file sliced the same way.
    pub fn matches(&self, filename: &str, file_size: u64, chunk_size: u64) -> bool {
        self.filename == filename && self.file_size == file_size && self.chunk_size == chunk_size
    }
}

/// Progress of a resumable download, stored next to the `.part` file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadCheckpoint {
    pub url: String,
    pub total_size: u64,
    pub content_type: String,
    pub chunk_size: u64,
    pub next_offset: u64,
}

impl DownloadCheckpoint {
    pub fn matches(&self, url: &str, total_size: u64, chunk_size: u64) -> bool {
        self.url == url
            && self.total_size == total_size
            && self.chunk_size == chunk_size
            && self.next_offset <= total_size
    }
}

/// Reads a checkpoint. A missing or unparsable file yields `None` so the
/// transfer starts over.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }
    let content = fs::read_to_string(path).await?;
    match serde_json::from_str(&content) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable checkpoint");
            Ok(None)
        }
    }
}

pub async fn save<T: Serialize>(path: &Path, state: &T) -> Result<()> {
    let content = serde_json::to_string(state)?;
    fs::write(path, content).await?;
    Ok(())
}

pub async fn remove(path: &Path) -> Result<()> {
    if fs::try_exists(path).await? {
        fs::remove_file(path).await?;
    }
    Ok(())
}
