use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{Result, TransferError};

/// Upload chunk size expected by the `/upload/*` endpoints (512 KiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 512 * 1024;
/// Byte-range size used by downloads (1 MiB).
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: u64 = 1024 * 1024;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Settings shared by both pipelines and the HTTP transport.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransferConfig {
    pub base_url: String,
    pub upload_chunk_size: u64,
    pub download_chunk_size: u64,
    /// Timeout for a single `/upload/chunk` request.
    pub chunk_timeout_secs: u64,
    /// Timeout for a single ranged GET.
    pub range_timeout_secs: u64,
    /// Timeout for every other request (init, progress, probe).
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
    pub token: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
            chunk_timeout_secs: 60,
            range_timeout_secs: 60,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            retry_delay_ms: 1000,
            user_agent: concat!("rxfer/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
        }
    }
}

impl TransferConfig {
    /// Read a JSON config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| TransferError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Apply `RXFER_API_URL` and `RXFER_TOKEN` when set.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("RXFER_API_URL") {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("RXFER_TOKEN") {
            if !token.trim().is_empty() {
                self.token = Some(token);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_chunk_size == 0 {
            return Err(TransferError::Config("upload_chunk_size must be greater than 0".into()));
        }
        if self.download_chunk_size == 0 {
            return Err(TransferError::Config("download_chunk_size must be greater than 0".into()));
        }
        for (name, secs) in [
            ("chunk_timeout_secs", self.chunk_timeout_secs),
            ("range_timeout_secs", self.range_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if secs == 0 {
                return Err(TransferError::Config(format!("{} must be greater than 0", name)));
            }
        }
        Url::parse(&self.base_url)
            .map_err(|e| TransferError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        Ok(())
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn range_timeout(&self) -> Duration {
        Duration::from_secs(self.range_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
