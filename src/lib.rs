//! Client side of a chunked file transfer protocol.
//!
//! [`ChunkedUploadClient`] slices a local file into fixed-size chunks and
//! sends them one after another to an upload session.
//! [`ChunkedDownloadClient`] rebuilds a remote resource from sequential byte
//! ranges. Both talk to the server through a [`Transport`].

pub mod chunk;
pub mod config;
pub mod download;
pub mod error;
pub mod hashing;
pub mod source;
pub mod state;
pub mod transport;
pub mod upload;
pub mod utils;

pub use chunk::{ByteRange, ChunkPlan, DownloadProgress, UploadProgress};
pub use config::TransferConfig;
pub use download::{Blob, ChunkedDownloadClient, DownloadDescriptor};
pub use error::{Result, TransferError, TransportError};
pub use source::{ChunkSource, FileSource, MemorySource};
pub use transport::{HttpTransport, Transport};
pub use upload::{finalize_from_chunks, ChunkedUploadClient, ServerUploadProgress, UploadSession};

pub use tokio_util::sync::CancellationToken;
