//! HTTP implementation of the engine transport.
//!
//! A stream is a single chunked POST whose body is fed from a bounded channel,
//! so at most a few encoded frames are buffered at any time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Body, Client, Response, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::frame::{Frame, ProcessingResult};
use crate::transport::{EngineStream, EngineTransport};

/// Encoded frames buffered between the sender and the HTTP body.
const FRAME_BUFFER: usize = 4;

/// Configuration for the engine client.
#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    /// Base URL of the inference engine
    pub base_url: String,
    /// Connect timeout
    pub connect_timeout: Duration,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:50051".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ENGINE_URL")
                .unwrap_or_else(|_| "http://localhost:50051".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("ENGINE_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

/// Client for the inference engine.
#[derive(Clone)]
pub struct EngineClient {
    http: Client,
    config: EngineClientConfig,
}

impl EngineClient {
    /// Create a new engine client.
    pub fn new(config: EngineClientConfig) -> EngineResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("vnotes-engine-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::open_failed(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineClientConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> EngineResult<Url> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        Url::parse(&url).map_err(|e| EngineError::open_failed(format!("{}: {}", url, e)))
    }

    /// Check if the engine is reachable and healthy.
    pub async fn health_check(&self) -> bool {
        let url = match self.endpoint("health") {
            Ok(url) => url,
            Err(e) => {
                warn!("Engine health check skipped: {}", e);
                return false;
            }
        };

        match self.http.get(url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Engine health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Engine health check error: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl EngineTransport for EngineClient {
    async fn open(&self, timeout: Duration) -> EngineResult<Box<dyn EngineStream>> {
        let url = self.endpoint("v1/process")?;
        let (tx, rx) = mpsc::channel::<Vec<u8>>(FRAME_BUFFER);

        let body = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|frame| (Ok::<_, std::io::Error>(frame), rx))
        });

        let request = self
            .http
            .post(url.clone())
            .header("content-type", "application/x-ndjson")
            .timeout(timeout)
            .body(Body::wrap_stream(body));

        debug!(url = %url, timeout_secs = timeout.as_secs(), "Opening engine stream");

        Ok(Box::new(HttpEngineStream {
            sender: Some(tx),
            response: Some(tokio::spawn(request.send())),
            timeout,
            bytes_sent: 0,
        }))
    }
}

/// An in-flight chunked POST to the engine.
pub struct HttpEngineStream {
    sender: Option<mpsc::Sender<Vec<u8>>>,
    response: Option<JoinHandle<reqwest::Result<Response>>>,
    timeout: Duration,
    bytes_sent: u64,
}

impl HttpEngineStream {
    async fn send_frame(&mut self, frame: Frame, payload_len: usize) -> EngineResult<()> {
        let line = frame.encode()?;
        let sender = self.sender.as_ref().ok_or(EngineError::Closed)?;

        if sender.send(line).await.is_err() {
            // The request ended early; report why.
            let reason = self.abandon().await;
            return Err(EngineError::send_failed(self.bytes_sent, reason));
        }

        self.bytes_sent += payload_len as u64;
        Ok(())
    }

    /// Drop the sender and describe how the request ended.
    async fn abandon(&mut self) -> String {
        self.sender = None;
        match self.response.take() {
            Some(handle) => match handle.await {
                Ok(Ok(response)) => format!("engine responded early with {}", response.status()),
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("request task failed: {}", e),
            },
            None => "stream closed".to_string(),
        }
    }

    fn map_request_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(self.timeout)
        } else if e.is_connect() {
            EngineError::open_failed(e.to_string())
        } else {
            EngineError::ResponseFailed(e.to_string())
        }
    }
}

#[async_trait]
impl EngineStream for HttpEngineStream {
    async fn send_metadata(&mut self, filename: &str, job_id: &str) -> EngineResult<()> {
        self.send_frame(Frame::metadata(filename, job_id), 0).await
    }

    async fn send_chunk(&mut self, data: &[u8]) -> EngineResult<()> {
        self.send_frame(Frame::chunk(data), data.len()).await
    }

    async fn close_and_recv(self: Box<Self>) -> EngineResult<ProcessingResult> {
        let mut this = self;
        // Dropping the sender ends the request body.
        this.sender = None;
        let handle = this.response.take().ok_or(EngineError::Closed)?;

        let response = handle
            .await
            .map_err(|e| EngineError::ResponseFailed(format!("request task failed: {}", e)))?
            .map_err(|e| this.map_request_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| this.map_request_error(e))?;

        if !status.is_success() {
            return Err(EngineError::ResponseFailed(format!(
                "engine returned {}: {}",
                status, body
            )));
        }

        debug!(bytes_sent = this.bytes_sent, "Engine stream closed");
        serde_json::from_str(&body)
            .map_err(|e| EngineError::InvalidResponse(format!("{}: {}", e, body)))
    }
}

impl Drop for HttpEngineStream {
    fn drop(&mut self) {
        if let Some(handle) = self.response.take() {
            handle.abort();
        }
    }
}
