use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Proxy;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Opens streaming POST requests and yields the raw response body.
///
/// Authentication and request construction belong to the caller, which passes
/// whatever headers it needs. No retries are attempted.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client with env-overridable defaults:
    /// `AI_HTTP_TIMEOUT_SECS` (connect timeout, default 30) and `AI_PROXY_URL`.
    pub fn new() -> Result<Self> {
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        // Streams stay open far longer than a single request timeout would allow,
        // so only connecting is bounded.
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(error = %e, "ignoring invalid AI_PROXY_URL"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POSTs `body` as JSON to `url` and returns the SSE body as byte chunks.
    ///
    /// A non-2xx status is returned as [`Error::Remote`] with the response body text.
    pub async fn open_stream(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<BoxStream<'static, Bytes>> {
        let mut req = self
            .client
            .post(url)
            .json(body)
            .header("accept", "text/event-stream");
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "stream request rejected");
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }
        debug!(status = status.as_u16(), url, "response stream opened");

        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
