//! Sequential ranged download: HEAD probe, then `Range: bytes=` GETs.

use bytes::{Bytes, BytesMut};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::sync::CancellationToken;

use crate::chunk::{ByteRange, ChunkPlan, DownloadProgress};
use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::hashing;
use crate::state::{self, DownloadCheckpoint};
use crate::transport::Transport;
use crate::utils::part_paths;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The assembled resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: String,
}

impl Blob {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One in-flight download. Ranges are appended in request order, which is
/// also byte order.
#[derive(Debug, Clone)]
pub struct DownloadDescriptor {
    pub source_url: String,
    pub total_size: u64,
    pub content_type: String,
    pub chunk_size: u64,
    ranges_fetched: Vec<Bytes>,
    bytes_downloaded: u64,
}

impl DownloadDescriptor {
    pub fn plan(&self) -> ChunkPlan {
        ChunkPlan::new(self.total_size, self.chunk_size)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    pub fn ranges_fetched(&self) -> usize {
        self.ranges_fetched.len()
    }

    fn push(&mut self, data: Bytes) -> DownloadProgress {
        self.bytes_downloaded += data.len() as u64;
        self.ranges_fetched.push(data);
        DownloadProgress::new(self.bytes_downloaded, self.total_size)
    }

    /// Concatenates every fetched range, in fetch order.
    pub fn into_blob(self) -> Blob {
        let mut data = BytesMut::with_capacity(self.bytes_downloaded as usize);
        for range in &self.ranges_fetched {
            data.extend_from_slice(range);
        }
        Blob {
            data: data.freeze(),
            content_type: self.content_type,
        }
    }
}

pub struct ChunkedDownloadClient<T: Transport + ?Sized> {
    transport: Arc<T>,
    config: TransferConfig,
}

impl<T: Transport + ?Sized> ChunkedDownloadClient<T> {
    pub fn new(transport: Arc<T>, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn chunk_size(&self) -> u64 {
        self.config.download_chunk_size
    }

    /// Learns the size and type of `url`. A missing or zero `Content-Length`
    /// is fatal: ranges cannot be planned without it.
    pub async fn probe(&self, url: &str) -> Result<DownloadDescriptor> {
        let info = self
            .transport
            .head(url)
            .await
            .map_err(|e| TransferError::Probe(e.to_string()))?;
        let total_size = match info.content_length {
            Some(len) if len > 0 => len,
            _ => return Err(TransferError::Probe(format!("no content length for {}", url))),
        };
        let content_type = info
            .content_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        tracing::debug!(url, total_size, %content_type, "probed resource");
        Ok(DownloadDescriptor {
            source_url: url.to_string(),
            total_size,
            content_type,
            chunk_size: self.config.download_chunk_size,
            ranges_fetched: Vec::new(),
            bytes_downloaded: 0,
        })
    }

    /// Downloads `url` range by range into memory.
    ///
    /// Any failed range aborts the download and the partial data is dropped.
    pub async fn download_file<F>(
        &self,
        url: &str,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<Blob>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let mut descriptor = self.probe(url).await?;
        let plan = descriptor.plan();
        for range in plan.ranges() {
            let data = self.fetch_range(url, range, cancel).await?;
            let progress = descriptor.push(data);
            on_progress(progress);
        }

        tracing::info!(
            url,
            bytes = descriptor.bytes_downloaded(),
            ranges = descriptor.ranges_fetched(),
            "download complete"
        );
        Ok(descriptor.into_blob())
    }

    /// Downloads `url` and writes it to `filepath`, going through a `.part`
    /// file so a failed write never leaves a truncated destination.
    pub async fn download_and_save<F>(
        &self,
        url: &str,
        filepath: &Path,
        expected_sha256: Option<&str>,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<Blob>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let blob = self.download_file(url, on_progress, cancel).await?;
        if let Some(expected) = expected_sha256 {
            hashing::verify(expected, &hashing::digest_bytes(&blob.data))?;
        }

        let (part_filepath, _) = part_paths(filepath);
        if let Err(e) = stage_and_rename(&part_filepath, filepath, &blob.data).await {
            if let Err(cleanup) = fs::remove_file(&part_filepath).await {
                tracing::warn!(path = %part_filepath.display(), error = %cleanup, "failed to remove partial file");
            }
            return Err(e.into());
        }
        tracing::info!(url, path = %filepath.display(), "saved download");
        Ok(blob)
    }

    /// Streams ranges straight into `<filepath>.part`, recording the next
    /// offset in `<filepath>.part.json` after every range. A later call with
    /// the same url and chunk size picks up from that offset.
    pub async fn download_to_file_resumable<F>(
        &self,
        url: &str,
        filepath: &Path,
        expected_sha256: Option<&str>,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let descriptor = self.probe(url).await?;
        let plan = descriptor.plan();
        let total_size = plan.total_size();
        let (part_filepath, state_filepath) = part_paths(filepath);

        let part_len = match fs::metadata(&part_filepath).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };
        let resumed = state::load::<DownloadCheckpoint>(&state_filepath)
            .await?
            .filter(|c| {
                c.matches(url, total_size, plan.chunk_size())
                    && (c.next_offset % plan.chunk_size() == 0 || c.next_offset == total_size)
                    && part_len >= c.next_offset
            });
        let mut checkpoint = match resumed {
            Some(checkpoint) => {
                tracing::info!(url, offset = checkpoint.next_offset, total_size, "resuming download");
                checkpoint
            }
            None => DownloadCheckpoint {
                url: url.to_string(),
                total_size,
                content_type: descriptor.content_type.clone(),
                chunk_size: plan.chunk_size(),
                next_offset: 0,
            },
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&part_filepath)
            .await?;
        // Anything past the checkpoint was never confirmed.
        file.set_len(checkpoint.next_offset).await?;
        file.seek(SeekFrom::Start(checkpoint.next_offset)).await?;
        state::save(&state_filepath, &checkpoint).await?;

        if checkpoint.next_offset > 0 {
            on_progress(DownloadProgress::new(checkpoint.next_offset, total_size));
        }

        let first = checkpoint.next_offset.div_ceil(plan.chunk_size());
        for range in plan.ranges_from(first) {
            let data = self.fetch_range(url, range, cancel).await?;
            file.write_all(&data).await?;
            file.flush().await?;

            checkpoint.next_offset = range.end;
            state::save(&state_filepath, &checkpoint).await?;
            on_progress(DownloadProgress::new(checkpoint.next_offset, total_size));
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = expected_sha256 {
            let hash = hashing::calculate_hash(&part_filepath).await?;
            if let Err(e) = hashing::verify(expected, &hash) {
                // Corrupt data must not be resumed from.
                fs::remove_file(&part_filepath).await?;
                state::remove(&state_filepath).await?;
                return Err(e);
            }
        }

        fs::rename(&part_filepath, filepath).await?;
        state::remove(&state_filepath).await?;
        tracing::info!(url, path = %filepath.display(), bytes = total_size, "saved download");
        Ok(total_size)
    }

    async fn fetch_range(&self, url: &str, range: ByteRange, cancel: &CancellationToken) -> Result<Bytes> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let fetch = self
            .transport
            .get_range(url, range, self.config.range_timeout());
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            fetched = fetch => fetched,
        };
        let data = fetched.map_err(|source| TransferError::Range {
            start: range.start,
            end: range.last_byte(),
            source,
        })?;
        if data.len() as u64 != range.len() {
            return Err(TransferError::UnexpectedRangeLength {
                start: range.start,
                end: range.last_byte(),
                actual: data.len() as u64,
            });
        }
        tracing::debug!(url, range = %range.header_value(), "range fetched");
        Ok(data)
    }
}

async fn stage_and_rename(part_filepath: &Path, filepath: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(part_filepath, data).await?;
    fs::rename(part_filepath, filepath).await
}
