mod cli;
mod commands;
mod progress;

use anyhow::Result;
use clap::Parser;
use rxfer::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    let config = args.transfer_config()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling transfer");
                on_interrupt.cancel();
            }
        });

        match args.command {
            Command::Upload {
                file,
                mime,
                resume,
                finalize,
                meta,
            } => crate::commands::run_upload(config, file, mime, resume, finalize, meta, cancel).await,
            Command::Download {
                url,
                output,
                download_dir,
                resume,
                sha256,
            } => {
                crate::commands::run_download(config, url, output, download_dir, resume, sha256, cancel)
                    .await
            }
            Command::Progress { upload_id } => crate::commands::run_progress(config, upload_id).await,
        }
    })
}
