//! HTTP client for the long-term archive. Write-only.

use crate::http::HttpLayer;
use async_trait::async_trait;
use hearth_core::{Archive, LayerClient, LayerKind, LayerResult, MemoryItem};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    item: &'a MemoryItem,
}

/// `POST /append`.
pub struct HttpArchive {
    http: HttpLayer,
}

impl HttpArchive {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> LayerResult<Self> {
        Ok(Self {
            http: HttpLayer::new(LayerKind::Archive, base_url, timeout, token)?,
        })
    }
}

#[async_trait]
impl LayerClient for HttpArchive {
    fn layer(&self) -> LayerKind {
        LayerKind::Archive
    }

    async fn health(&self) -> LayerResult<bool> {
        self.http.health().await
    }
}

#[async_trait]
impl Archive for HttpArchive {
    async fn append(&self, item: &MemoryItem) -> LayerResult<()> {
        self.http
            .send_unit(reqwest::Method::POST, "/append", &AppendRequest { item })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hearth_core::MemoryType;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn append_sends_bearer_token() {
        let router = Router::new().route(
            "/append",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer tok" || body["item"]["id"] != "a1" {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                (StatusCode::OK, Json(json!({ "ok": true })))
            }),
        );
        let base = test_server::spawn(router).await;
        let archive = HttpArchive::new(&base, Duration::from_secs(2), Some("tok".into())).unwrap();

        let item = MemoryItem::new("u1", "c1", MemoryType::Conversation, "bye").with_id("a1");
        archive.append(&item).await.unwrap();
    }

    #[tokio::test]
    async fn health_reflects_status_code() {
        let router = Router::new().route("/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let base = test_server::spawn(router).await;
        let archive = HttpArchive::new(&base, Duration::from_secs(2), None).unwrap();
        assert!(!archive.health().await.unwrap());
    }
}
