//! The HTTP seam both pipelines talk through.

pub mod http;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

use crate::chunk::ByteRange;
use crate::error::TransportError;

pub use http::HttpTransport;

/// One `/upload/chunk` multipart body.
#[derive(Debug, Clone)]
pub struct ChunkPart {
    pub upload_id: String,
    pub chunk_index: u64,
    pub filename: String,
    pub data: Bytes,
}

/// Headers returned by a metadata probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// Generic request layer. API paths (`/upload/init`) are resolved against the
/// configured base URL; download URLs may be absolute.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError>;

    async fn get_json(&self, path: &str) -> Result<Value, TransportError>;

    async fn post_chunk(
        &self,
        path: &str,
        part: ChunkPart,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    async fn head(&self, url: &str) -> Result<ResourceInfo, TransportError>;

    async fn get_range(
        &self,
        url: &str,
        range: ByteRange,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;
}

/// Servers answer either with the payload itself or wrapped as
/// `{"success": true, "data": {...}}`.
pub fn payload(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
