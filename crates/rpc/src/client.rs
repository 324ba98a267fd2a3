//! JSON-RPC over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response, VERSION};

/// Default timeout for one request/response round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum response body size (1MB).
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// A JSON-RPC endpoint reached over HTTP POST.
#[derive(Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            next_id: AtomicU64::new(1),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its result.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = serde_json::to_value(params)?;
        let request = Request::new(id, method, &params);

        tracing::debug!(url = %self.url, method, id, "json-rpc request");
        let response = timeout(self.timeout, self.send(&request))
            .await
            .map_err(|_| Error::Timeout)??;

        if response.jsonrpc != VERSION {
            return Err(Error::InvalidResponse(format!(
                "unsupported jsonrpc version '{}'",
                response.jsonrpc
            )));
        }
        // An error object may come back without an id.
        if response.id.is_some_and(|got| got != id) {
            return Err(Error::InvalidResponse(format!(
                "response id {:?} does not match request id {id}",
                response.id
            )));
        }

        let result_value = response.into_result()?;
        serde_json::from_value(result_value).map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    async fn send(&self, request: &Request<'_>) -> Result<Response> {
        let response = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if body.len() > MAX_RESPONSE_SIZE {
            return Err(Error::InvalidResponse(format!(
                "response too large: {} bytes (max {MAX_RESPONSE_SIZE})",
                body.len()
            )));
        }

        // Nodes commonly answer JSON-RPC errors with a non-2xx status; prefer the
        // JSON-RPC body when there is one.
        match serde_json::from_slice::<Response>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(Error::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(e) => Err(Error::InvalidResponse(e.to_string())),
        }
    }
}
