use anyhow::{Context, Result};
use indicatif::HumanBytes;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use rxfer::utils::{get_filename_from_url, get_unique_filepath, sanitize_filename, upload_checkpoint_path};
use rxfer::{
    finalize_from_chunks, CancellationToken, ChunkPlan, ChunkSource, ChunkedDownloadClient,
    ChunkedUploadClient, DownloadProgress, FileSource, HttpTransport, TransferConfig, UploadProgress,
};

use crate::progress;

pub async fn run_upload(
    config: TransferConfig,
    file: PathBuf,
    mime: Option<String>,
    resume: bool,
    finalize: bool,
    meta: Vec<(String, Value)>,
    cancel: CancellationToken,
) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(&config)?);
    let client = ChunkedUploadClient::new(transport.clone(), config)?;

    let mut source = FileSource::open(&file)
        .await
        .with_context(|| format!("Failed to open {:?}", file))?;
    if let Some(mime) = mime {
        source = source.with_mime_type(mime);
    }

    let total_chunks = ChunkPlan::new(source.len(), client.chunk_size()).total_chunks();
    let pb = progress::chunk_bar(total_chunks, source.filename());
    let on_progress = |p: UploadProgress| pb.set_position(p.chunks_uploaded);

    let uploaded = if resume {
        let checkpoint = upload_checkpoint_path(&file);
        client
            .upload_file_resumable(&source, &checkpoint, on_progress, &cancel)
            .await
    } else {
        client.upload_file(&source, on_progress, &cancel).await
    };
    let upload_id = match uploaded {
        Ok(id) => id,
        Err(e) => {
            pb.abandon_with_message(format!("Failed      {}", source.filename()));
            return Err(e).with_context(|| format!("Failed to upload {:?}", file));
        }
    };
    pb.finish_with_message(format!(
        "Uploaded    {} ({})",
        source.filename(),
        HumanBytes(source.len())
    ));
    println!("{}", upload_id);

    if finalize {
        let metadata: Map<String, Value> = meta.into_iter().collect();
        let response = finalize_from_chunks(&*transport, &upload_id, metadata)
            .await
            .context("Failed to create resource from chunks")?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    Ok(())
}

pub async fn run_download(
    config: TransferConfig,
    url: String,
    output: Option<PathBuf>,
    download_dir: PathBuf,
    resume: bool,
    sha256: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let filepath = match output {
        Some(path) => path,
        None => {
            let filename = sanitize_filename(&get_filename_from_url(&url)?);
            if resume {
                // Resuming needs the same name as the interrupted run.
                download_dir.join(filename)
            } else {
                get_unique_filepath(&download_dir, &filename)
            }
        }
    };
    if let Some(parent) = filepath.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create output directory")?;
        }
    }

    let transport = Arc::new(HttpTransport::new(&config)?);
    let client = ChunkedDownloadClient::new(transport, config)?;

    let display_name = display_name(&filepath);
    let pb = progress::byte_bar(&display_name);
    let on_progress = |p: DownloadProgress| {
        pb.set_length(p.total_bytes);
        pb.set_position(p.bytes_downloaded);
    };

    let downloaded = if resume {
        client
            .download_to_file_resumable(&url, &filepath, sha256.as_deref(), on_progress, &cancel)
            .await
    } else {
        client
            .download_and_save(&url, &filepath, sha256.as_deref(), on_progress, &cancel)
            .await
            .map(|blob| blob.len())
    };
    match downloaded {
        Ok(bytes) => {
            let verb = if sha256.is_some() { "Verified   " } else { "Completed  " };
            pb.finish_with_message(format!("{} {} ({})", verb, display_name, HumanBytes(bytes)));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message(format!("Failed      {}", display_name));
            Err(e).with_context(|| format!("Failed to download {}", url))
        }
    }
}

pub async fn run_progress(config: TransferConfig, upload_id: String) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(&config)?);
    let client = ChunkedUploadClient::new(transport, config)?;
    let progress = client
        .server_progress(&upload_id)
        .await
        .with_context(|| format!("Failed to query progress of {}", upload_id))?;

    println!("{:<40} {:<15} {:<15}", "Upload", "Chunks", "Progress");
    println!("{:-<40} {:-<15} {:-<15}", "", "", "");
    println!(
        "{:<40} {:<15} {:<15}",
        upload_id,
        format!("{}/{}", progress.uploaded, progress.total),
        format!("{}%", progress.percentage)
    );
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
