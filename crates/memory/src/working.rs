//! HTTP client for working memory.

use crate::hot_cache::ItemsResponse;
use crate::http::HttpLayer;
use async_trait::async_trait;
use hearth_core::{LayerClient, LayerKind, LayerResult, MemoryItem, WorkingMemory};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    item: &'a MemoryItem,
}

/// `POST /search`, `POST /add`.
pub struct HttpWorkingMemory {
    http: HttpLayer,
}

impl HttpWorkingMemory {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> LayerResult<Self> {
        Ok(Self {
            http: HttpLayer::new(LayerKind::Working, base_url, timeout, token)?,
        })
    }
}

#[async_trait]
impl LayerClient for HttpWorkingMemory {
    fn layer(&self) -> LayerKind {
        LayerKind::Working
    }

    async fn health(&self) -> LayerResult<bool> {
        self.http.health().await
    }
}

#[async_trait]
impl WorkingMemory for HttpWorkingMemory {
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let body = SearchRequest {
            user_id,
            query,
            limit,
        };
        let response: ItemsResponse = self.http.post_json("/search", &body).await?;
        Ok(response.items)
    }

    async fn add(&self, item: &MemoryItem) -> LayerResult<()> {
        self.http
            .send_unit(reqwest::Method::POST, "/add", &AddRequest { item })
            .await
    }
}
