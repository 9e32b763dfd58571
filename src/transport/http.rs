use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, multipart, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::{ChunkPart, ResourceInfo, Transport};
use crate::chunk::ByteRange;
use crate::config::TransferConfig;
use crate::error::{TransferError, TransportError};

/// reqwest-backed transport with bearer auth and retry on network/5xx errors.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransferError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    /// Absolute URLs pass through; anything else is appended to the base URL.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, TransportError> {
        if let Ok(url) = Url::parse(path_or_url) {
            return Ok(url);
        }
        let joined = format!("{}/{}", self.base_url, path_or_url.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", joined, e)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut attempt_fn: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, TransportError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay * attempt;
                    tracing::warn!(%what, attempt, ?delay, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, TransportError> {
        let response = check_status(request.send().await?).await?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Turns a non-2xx response into `TransportError::Status`, preferring the
/// server's `error.message` or `message` field over the status reason.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let url = self.resolve(path)?;
        let url = &url;
        self.with_retry(path, move || {
            let request = self
                .authorize(self.client.post(url.clone()))
                .timeout(self.request_timeout)
                .json(body);
            self.send_json(request)
        })
        .await
    }

    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        let url = self.resolve(path)?;
        let url = &url;
        self.with_retry(path, move || {
            let request = self
                .authorize(self.client.get(url.clone()))
                .timeout(self.request_timeout);
            self.send_json(request)
        })
        .await
    }

    async fn post_chunk(
        &self,
        path: &str,
        part: ChunkPart,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let url = self.resolve(path)?;
        let url = &url;
        let part = &part;
        self.with_retry(path, move || async move {
            // multipart::Form is consumed by send, so it is rebuilt per attempt.
            let chunk = multipart::Part::bytes(part.data.to_vec())
                .file_name(part.filename.clone())
                .mime_str("application/octet-stream")?;
            let form = multipart::Form::new()
                .part("chunk", chunk)
                .text("uploadId", part.upload_id.clone())
                .text("chunkIndex", part.chunk_index.to_string());
            let request = self
                .authorize(self.client.post(url.clone()))
                .timeout(timeout)
                .multipart(form);
            check_status(request.send().await?).await?;
            Ok(())
        })
        .await
    }

    async fn head(&self, url: &str) -> Result<ResourceInfo, TransportError> {
        let url = self.resolve(url)?;
        let url = &url;
        self.with_retry(url.as_str(), move || async move {
            let request = self
                .authorize(self.client.head(url.clone()))
                .timeout(self.request_timeout);
            let response = check_status(request.send().await?).await?;
            let headers = response.headers();
            let content_length = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(ResourceInfo {
                content_length,
                content_type,
            })
        })
        .await
    }

    async fn get_range(
        &self,
        url: &str,
        range: ByteRange,
        timeout: Duration,
    ) -> Result<Bytes, TransportError> {
        let url = self.resolve(url)?;
        let url = &url;
        let range_header = range.header_value();
        let range_header = range_header.as_str();
        self.with_retry(url.as_str(), move || async move {
            let request = self
                .authorize(self.client.get(url.clone()))
                .header(header::RANGE, range_header)
                .timeout(timeout);
            let response = check_status(request.send().await?).await?;
            Ok(response.bytes().await?)
        })
        .await
    }
}
