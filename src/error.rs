use thiserror::Error;

/// Failures raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Network failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout => true,
            Self::Status { status, .. } => (500..600).contains(status),
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Request(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to initialize upload session")]
    Init(#[source] TransportError),

    #[error("unable to determine file size: {0}")]
    Probe(String),

    #[error("chunk {index} failed")]
    Chunk {
        index: u64,
        #[source]
        source: TransportError,
    },

    #[error("range bytes={start}-{end} failed")]
    Range {
        start: u64,
        end: u64,
        #[source]
        source: TransportError,
    },

    #[error("range bytes={start}-{end} returned {actual} bytes")]
    UnexpectedRangeLength { start: u64, end: u64, actual: u64 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("hash mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("checkpoint error")]
    Checkpoint(#[from] serde_json::Error),
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
