//! Sequential chunked upload against the `/upload/*` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::chunk::{ChunkPlan, UploadProgress};
use crate::config::TransferConfig;
use crate::error::{Result, TransferError, TransportError};
use crate::source::ChunkSource;
use crate::state::{self, UploadCheckpoint};
use crate::transport::{payload, ChunkPart, Transport};

const INIT_PATH: &str = "/upload/init";
const CHUNK_PATH: &str = "/upload/chunk";
const FINALIZE_PATH: &str = "/books/from-chunks";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    filename: &'a str,
    total_chunks: u64,
    file_size: u64,
    mime_type: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InitResponse {
    upload_id: String,
}

/// An upload session as issued by `/upload/init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_id: String,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

/// Server-side view of an upload, from `/upload/progress/:uploadId`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerUploadProgress {
    pub uploaded: u64,
    pub total: u64,
    pub percentage: u8,
}

pub struct ChunkedUploadClient<T: Transport + ?Sized> {
    transport: Arc<T>,
    config: TransferConfig,
}

impl<T: Transport + ?Sized> ChunkedUploadClient<T> {
    pub fn new(transport: Arc<T>, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn chunk_size(&self) -> u64 {
        self.config.upload_chunk_size
    }

    /// Uploads `source` chunk by chunk and returns the server's upload id.
    ///
    /// Chunks are sent strictly in index order, each one only after the
    /// previous was acknowledged. The first failure aborts the upload; chunks
    /// already accepted stay orphaned on the server. Finalizing the session is
    /// left to the caller (see [`finalize_from_chunks`]).
    pub async fn upload_file<S, F>(
        &self,
        source: &S,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        S: ChunkSource + ?Sized,
        F: FnMut(UploadProgress) + Send,
    {
        let plan = ChunkPlan::new(source.len(), self.config.upload_chunk_size);
        let session = self.init(source, &plan, cancel).await?;
        self.send_chunks(source, &plan, &session.upload_id, 0, &mut on_progress, cancel, None)
            .await?;

        tracing::info!(
            upload_id = %session.upload_id,
            filename = %session.filename,
            chunks = session.total_chunks,
            "upload complete"
        );
        Ok(session.upload_id)
    }

    /// Like [`upload_file`](Self::upload_file), but records progress in
    /// `checkpoint_path` so an interrupted upload continues where the server
    /// left off instead of starting a new session.
    pub async fn upload_file_resumable<S, F>(
        &self,
        source: &S,
        checkpoint_path: &Path,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        S: ChunkSource + ?Sized,
        F: FnMut(UploadProgress) + Send,
    {
        let plan = ChunkPlan::new(source.len(), self.config.upload_chunk_size);
        let mut checkpoint = match self.resume_point(source, &plan, checkpoint_path).await? {
            Some(checkpoint) => checkpoint,
            None => {
                let session = self.init(source, &plan, cancel).await?;
                let checkpoint = UploadCheckpoint {
                    upload_id: session.upload_id,
                    filename: session.filename,
                    file_size: session.file_size,
                    chunk_size: session.chunk_size,
                    chunks_confirmed: 0,
                };
                state::save(checkpoint_path, &checkpoint).await?;
                checkpoint
            }
        };

        if checkpoint.chunks_confirmed > 0 {
            on_progress(UploadProgress::new(checkpoint.chunks_confirmed, plan.total_chunks()));
        }

        let upload_id = checkpoint.upload_id.clone();
        let first = checkpoint.chunks_confirmed;
        self.send_chunks(
            source,
            &plan,
            &upload_id,
            first,
            &mut on_progress,
            cancel,
            Some((checkpoint_path, &mut checkpoint)),
        )
        .await?;

        state::remove(checkpoint_path).await?;
        tracing::info!(%upload_id, chunks = plan.total_chunks(), "resumable upload complete");
        Ok(upload_id)
    }

    /// Queries the server-authoritative progress of an upload session.
    pub async fn server_progress(&self, upload_id: &str) -> Result<ServerUploadProgress> {
        let value = self
            .transport
            .get_json(&format!("/upload/progress/{}", upload_id))
            .await?;
        parse_progress(value)
    }

    async fn init<S>(&self, source: &S, plan: &ChunkPlan, cancel: &CancellationToken) -> Result<UploadSession>
    where
        S: ChunkSource + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let request = InitRequest {
            filename: source.filename(),
            total_chunks: plan.total_chunks(),
            file_size: plan.total_size(),
            mime_type: source.mime_type(),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| TransferError::Init(TransportError::Decode(e.to_string())))?;
        let response = self
            .transport
            .post_json(INIT_PATH, &body)
            .await
            .map_err(TransferError::Init)?;
        let InitResponse { upload_id } = serde_json::from_value(payload(response))
            .map_err(|e| TransferError::Init(TransportError::Decode(e.to_string())))?;

        tracing::info!(
            %upload_id,
            filename = %request.filename,
            file_size = request.file_size,
            total_chunks = request.total_chunks,
            "upload session created"
        );

        Ok(UploadSession {
            upload_id,
            filename: source.filename().to_string(),
            file_size: plan.total_size(),
            mime_type: source.mime_type().to_string(),
            total_chunks: plan.total_chunks(),
            chunk_size: plan.chunk_size(),
        })
    }

    /// Loads a matching checkpoint and asks the server how many chunks it
    /// holds. `None` means a fresh session is needed.
    async fn resume_point<S>(
        &self,
        source: &S,
        plan: &ChunkPlan,
        checkpoint_path: &Path,
    ) -> Result<Option<UploadCheckpoint>>
    where
        S: ChunkSource + ?Sized,
    {
        let Some(mut checkpoint) = state::load::<UploadCheckpoint>(checkpoint_path).await? else {
            return Ok(None);
        };
        if !checkpoint.matches(source.filename(), plan.total_size(), plan.chunk_size()) {
            tracing::info!(path = %checkpoint_path.display(), "checkpoint belongs to another file, starting over");
            return Ok(None);
        }

        match self.server_progress(&checkpoint.upload_id).await {
            Ok(progress) => {
                checkpoint.chunks_confirmed = progress.uploaded.min(plan.total_chunks());
                tracing::info!(
                    upload_id = %checkpoint.upload_id,
                    confirmed = checkpoint.chunks_confirmed,
                    total = plan.total_chunks(),
                    "resuming upload"
                );
                Ok(Some(checkpoint))
            }
            Err(TransferError::Transport(TransportError::Status { status: 404 | 410, .. })) => {
                tracing::info!(upload_id = %checkpoint.upload_id, "upload session expired, starting over");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_chunks<S, F>(
        &self,
        source: &S,
        plan: &ChunkPlan,
        upload_id: &str,
        first: u64,
        on_progress: &mut F,
        cancel: &CancellationToken,
        mut checkpoint: Option<(&Path, &mut UploadCheckpoint)>,
    ) -> Result<()>
    where
        S: ChunkSource + ?Sized,
        F: FnMut(UploadProgress) + Send,
    {
        let total_chunks = plan.total_chunks();
        for range in plan.ranges_from(first) {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let data = source.read_range(range).await?;
            let part = ChunkPart {
                upload_id: upload_id.to_string(),
                chunk_index: range.index,
                filename: source.filename().to_string(),
                data,
            };
            let send = self
                .transport
                .post_chunk(CHUNK_PATH, part, self.config.chunk_timeout());
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                sent = send => sent,
            };
            sent.map_err(|source| TransferError::Chunk {
                index: range.index,
                source,
            })?;

            tracing::debug!(upload_id, chunk = range.index, bytes = range.len(), "chunk acknowledged");

            if let Some((path, checkpoint)) = checkpoint.as_mut() {
                checkpoint.chunks_confirmed = range.index + 1;
                state::save(*path, &**checkpoint).await?;
            }
            on_progress(UploadProgress::new(range.index + 1, total_chunks));
        }
        Ok(())
    }
}

fn parse_progress(value: Value) -> Result<ServerUploadProgress> {
    let mut value = payload(value);
    let nested = value.get_mut("progress").map(Value::take);
    if let Some(progress) = nested {
        value = progress;
    }
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()).into())
}

/// `POST /books/from-chunks` with `{uploadId, ...metadata}`. This belongs to
/// the caller once an upload has returned its id.
pub async fn finalize_from_chunks<T: Transport + ?Sized>(
    transport: &T,
    upload_id: &str,
    metadata: Map<String, Value>,
) -> Result<Value> {
    let mut body = metadata;
    body.insert("uploadId".to_string(), Value::String(upload_id.to_string()));
    let response = transport.post_json(FINALIZE_PATH, &Value::Object(body)).await?;
    Ok(payload(response))
}
