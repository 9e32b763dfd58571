use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rxfer::TransferConfig;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload and ranged download client", long_about = None)]
pub struct Args {
    /// JSON config file (keys match TransferConfig fields)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL, e.g. http://localhost:5000/api (overrides RXFER_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request (overrides RXFER_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Upload chunk size in bytes
    #[arg(long, global = true)]
    pub upload_chunk_size: Option<u64>,

    /// Download range size in bytes
    #[arg(long, global = true)]
    pub download_chunk_size: Option<u64>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file in chunks and print the upload id
    Upload {
        file: PathBuf,

        /// Declared MIME type (guessed from the extension by default)
        #[arg(long)]
        mime: Option<String>,

        /// Keep a checkpoint next to the file and continue an interrupted upload
        #[arg(long)]
        resume: bool,

        /// Call /books/from-chunks once every chunk is acknowledged
        #[arg(long)]
        finalize: bool,

        /// Metadata for --finalize, as key=value (values may be JSON)
        #[arg(short = 'm', long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, Value)>,
    },

    /// Download a resource with sequential range requests
    Download {
        url: String,

        /// Destination file (defaults to the URL's file name inside --download-dir)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Directory to save downloaded files
        #[arg(short = 'd', long = "download-dir", default_value = "downloads")]
        download_dir: PathBuf,

        /// Stream into a .part file with a checkpoint so the download can be resumed
        #[arg(long)]
        resume: bool,

        /// Expected SHA-256 of the resource (hex)
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Show server-side progress of an upload session
    Progress { upload_id: String },
}

fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

impl Args {
    /// Defaults, then the config file, then environment, then flags.
    pub fn transfer_config(&self) -> Result<TransferConfig> {
        let mut config = match &self.config {
            Some(path) => TransferConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => TransferConfig::default(),
        }
        .with_env();

        if let Some(url) = &self.api_url {
            config.base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(size) = self.upload_chunk_size {
            config.upload_chunk_size = size;
        }
        if let Some(size) = self.download_chunk_size {
            config.download_chunk_size = size;
        }
        config.validate().context("Invalid transfer configuration")?;
        Ok(config)
    }
}
