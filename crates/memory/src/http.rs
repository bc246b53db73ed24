//! Shared HTTP plumbing for the memory layer clients.
//!
//! Every service speaks JSON over HTTP. Transport failures are mapped to
//! [`LayerError`] so the orchestrator can degrade the layer uniformly:
//! client timeouts → `Timeout`, undecodable bodies → `InvalidResponse`,
//! everything else (refused connections, non-2xx) → `Unavailable`.

use hearth_core::{LayerError, LayerKind, LayerResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::trace;

/// A JSON-over-HTTP connection to one memory service.
#[derive(Debug, Clone)]
pub struct HttpLayer {
    layer: LayerKind,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpLayer {
    pub fn new(
        layer: LayerKind,
        base_url: impl Into<String>,
        timeout: Duration,
        token: Option<String>,
    ) -> LayerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LayerError::unavailable(layer, format!("HTTP client setup: {e}")))?;

        Ok(Self {
            layer,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
            client,
        })
    }

    pub fn layer(&self) -> LayerKind {
        self.layer
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> LayerResult<T> {
        trace!(layer = %self.layer, path, "GET");
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.decode(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> LayerResult<T> {
        trace!(layer = %self.layer, path, "POST");
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.decode(response).await
    }

    /// Send a body and ignore the response payload.
    pub async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> LayerResult<()> {
        trace!(layer = %self.layer, path, %method, "send");
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.check_status(response).await.map(|_| ())
    }

    /// `GET /health`: any 2xx means healthy, any other status means not.
    pub async fn health(&self) -> LayerResult<bool> {
        let response = self
            .request(reqwest::Method::GET, "/health")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        Ok(response.status().is_success())
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> LayerResult<T> {
        let response = self.check_status(response).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else {
                LayerError::InvalidResponse {
                    layer: self.layer,
                    reason: e.to_string(),
                }
            }
        })
    }

    async fn check_status(&self, response: reqwest::Response) -> LayerResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Err(LayerError::unavailable(
            self.layer,
            format!("HTTP {}: {}", status.as_u16(), snippet),
        ))
    }

    fn timeout_error(&self) -> LayerError {
        LayerError::Timeout {
            layer: self.layer,
            after_ms: self.timeout.as_millis() as u64,
        }
    }

    fn map_error(&self, e: reqwest::Error) -> LayerError {
        if e.is_timeout() {
            self.timeout_error()
        } else if e.is_decode() {
            LayerError::InvalidResponse {
                layer: self.layer,
                reason: e.to_string(),
            }
        } else {
            LayerError::unavailable(self.layer, e.to_string())
        }
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Local axum servers standing in for the memory services.

    /// Serve `router` on an ephemeral port and return its base URL.
    pub async fn spawn(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A base URL nothing listens on.
    pub async fn dead_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }
}
