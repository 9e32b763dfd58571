//! In-process fake server used by the pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{ChunkPart, ResourceInfo, Transport};
use crate::chunk::ByteRange;
use crate::error::TransportError;

#[derive(Default)]
pub(crate) struct State {
    next_id: u64,
    inits: Vec<Value>,
    sessions: HashMap<String, Vec<Bytes>>,
    resources: HashMap<String, (Bytes, Option<String>)>,
    calls: Vec<String>,
    finalized: Vec<Value>,
}

/// Accepts chunks only in append order, like the real `/upload/chunk`.
#[derive(Default)]
pub struct MemoryTransport {
    pub(crate) state: Mutex<State>,
    pub fail_init: bool,
    pub fail_chunk: Option<u64>,
    pub fail_range_start: Option<u64>,
    pub omit_content_length: bool,
    /// Serve ranges one byte short to exercise length validation.
    pub truncate_ranges: bool,
    /// Wrap JSON responses in `{"success": true, "data": ...}`.
    pub envelope: bool,
    /// Never answer this chunk, leaving the request in flight.
    pub stall_chunk: Option<u64>,
    /// Never answer the range starting here.
    pub stall_range_start: Option<u64>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(self, url: &str, data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        self.state.lock().unwrap().resources.insert(
            url.to_string(),
            (data.into(), content_type.map(str::to_string)),
        );
        self
    }

    /// Pre-creates a session as if a previous run had already sent `chunks`.
    pub fn with_session(self, upload_id: &str, chunks: Vec<Bytes>) -> Self {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(upload_id.to_string(), chunks);
        self
    }

    pub fn received(&self, upload_id: &str) -> Vec<Bytes> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(upload_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn assembled(&self, upload_id: &str) -> Vec<u8> {
        self.received(upload_id).concat()
    }

    pub fn inits(&self) -> Vec<Value> {
        self.state.lock().unwrap().inits.clone()
    }

    pub fn finalized(&self) -> Vec<Value> {
        self.state.lock().unwrap().finalized.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn respond(&self, value: Value) -> Value {
        if self.envelope {
            json!({ "success": true, "data": value })
        } else {
            value
        }
    }
}

fn status(status: u16, message: &str) -> TransportError {
    TransportError::Status {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("POST {}", path));
        match path {
            "/upload/init" => {
                if self.fail_init {
                    return Err(status(500, "init rejected"));
                }
                state.next_id += 1;
                let upload_id = format!("upload-{}", state.next_id);
                state.inits.push(body.clone());
                state.sessions.insert(upload_id.clone(), Vec::new());
                Ok(self.respond(json!({ "uploadId": upload_id })))
            }
            "/books/from-chunks" => {
                state.finalized.push(body.clone());
                Ok(self.respond(json!({ "book": { "id": "book-1" } })))
            }
            _ => Err(status(404, "not found")),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("GET {}", path));
        let upload_id = path
            .strip_prefix("/upload/progress/")
            .ok_or_else(|| status(404, "not found"))?;
        let uploaded = state
            .sessions
            .get(upload_id)
            .map(Vec::len)
            .ok_or_else(|| status(404, "Upload session not found"))?;
        let total = state
            .inits
            .last()
            .and_then(|init| init["totalChunks"].as_u64())
            .unwrap_or(uploaded as u64);
        Ok(self.respond(json!({
            "progress": {
                "uploaded": uploaded,
                "total": total,
                "percentage": crate::chunk::percentage(uploaded as u64, total),
            }
        })))
    }

    async fn post_chunk(
        &self,
        path: &str,
        part: ChunkPart,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("{} {}", path, part.chunk_index));
        }
        if self.stall_chunk == Some(part.chunk_index) {
            return std::future::pending().await;
        }
        let mut state = self.state.lock().unwrap();
        if self.fail_chunk == Some(part.chunk_index) {
            return Err(status(503, "chunk rejected"));
        }
        let chunks = state
            .sessions
            .get_mut(&part.upload_id)
            .ok_or_else(|| status(404, "Upload session not found"))?;
        if part.chunk_index != chunks.len() as u64 {
            return Err(status(409, "chunk out of order"));
        }
        chunks.push(part.data);
        Ok(())
    }

    async fn head(&self, url: &str) -> Result<ResourceInfo, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("HEAD {}", url));
        let (data, content_type) = state
            .resources
            .get(url)
            .ok_or_else(|| status(404, "not found"))?;
        Ok(ResourceInfo {
            content_length: (!self.omit_content_length).then_some(data.len() as u64),
            content_type: content_type.clone(),
        })
    }

    async fn get_range(
        &self,
        url: &str,
        range: ByteRange,
        _timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("GET {} {}", url, range.header_value()));
        }
        if self.stall_range_start == Some(range.start) {
            return std::future::pending().await;
        }
        let state = self.state.lock().unwrap();
        if self.fail_range_start == Some(range.start) {
            return Err(status(502, "bad gateway"));
        }
        let (data, _) = state
            .resources
            .get(url)
            .ok_or_else(|| status(404, "not found"))?;
        let end = range.end.min(data.len() as u64) as usize;
        let mut slice = data.slice(range.start as usize..end);
        if self.truncate_ranges && !slice.is_empty() {
            slice.truncate(slice.len() - 1);
        }
        Ok(slice)
    }
}
