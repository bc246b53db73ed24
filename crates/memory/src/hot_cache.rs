//! HTTP client for the hot cache (immediate tier).

use crate::http::HttpLayer;
use async_trait::async_trait;
use hearth_core::{HotCache, LayerClient, LayerKind, LayerResult, MemoryItem};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response body shared by the list-returning endpoints.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<MemoryItem>,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    item: &'a MemoryItem,
    ttl_secs: u64,
}

/// `GET /recent`, `POST /set`.
pub struct HttpHotCache {
    http: HttpLayer,
}

impl HttpHotCache {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> LayerResult<Self> {
        Ok(Self {
            http: HttpLayer::new(LayerKind::Immediate, base_url, timeout, token)?,
        })
    }
}

#[async_trait]
impl LayerClient for HttpHotCache {
    fn layer(&self) -> LayerKind {
        LayerKind::Immediate
    }

    async fn health(&self) -> LayerResult<bool> {
        self.http.health().await
    }
}

#[async_trait]
impl HotCache for HttpHotCache {
    async fn recent(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let query = [
            ("user", user_id.to_string()),
            ("conv", conversation_id.to_string()),
            ("limit", limit.to_string()),
        ];
        let response: ItemsResponse = self.http.get_json("/recent", &query).await?;
        Ok(response.items)
    }

    async fn put(&self, item: &MemoryItem, ttl: Duration) -> LayerResult<()> {
        let body = SetRequest {
            item,
            ttl_secs: ttl.as_secs(),
        };
        self.http
            .send_unit(reqwest::Method::POST, "/set", &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use axum::extract::{Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hearth_core::MemoryType;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn recent_sends_query_parameters() {
        let seen: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let router = Router::new()
            .route(
                "/recent",
                get(
                    |State(seen): State<Arc<Mutex<HashMap<String, String>>>>,
                     Query(params): Query<HashMap<String, String>>| async move {
                        *seen.lock().unwrap() = params;
                        let item = MemoryItem::new("u1", "c1", MemoryType::Conversation, "hi")
                            .with_id("t1");
                        Json(json!({ "items": [item] }))
                    },
                ),
            )
            .with_state(seen.clone());
        let base = test_server::spawn(router).await;
        let cache = HttpHotCache::new(&base, Duration::from_secs(2), None).unwrap();

        let items = cache.recent("u1", "c1", 7).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "t1");

        let params = seen.lock().unwrap().clone();
        assert_eq!(params.get("user").map(String::as_str), Some("u1"));
        assert_eq!(params.get("conv").map(String::as_str), Some("c1"));
        assert_eq!(params.get("limit").map(String::as_str), Some("7"));
    }

    #[tokio::test]
    async fn put_posts_item_and_ttl() {
        let body: Arc<Mutex<Option<Value>>> = Arc::default();
        let router = Router::new()
            .route(
                "/set",
                post(
                    |State(body): State<Arc<Mutex<Option<Value>>>>, Json(v): Json<Value>| async move {
                        *body.lock().unwrap() = Some(v);
                        Json(json!({ "ok": true }))
                    },
                ),
            )
            .with_state(body.clone());
        let base = test_server::spawn(router).await;
        let cache = HttpHotCache::new(&base, Duration::from_secs(2), Some("secret".into())).unwrap();

        let item = MemoryItem::new("u1", "c1", MemoryType::Conversation, "hello").with_id("t9");
        cache.put(&item, Duration::from_secs(3600)).await.unwrap();

        let sent = body.lock().unwrap().clone().unwrap();
        assert_eq!(sent["ttl_secs"], 3600);
        assert_eq!(sent["item"]["id"], "t9");
        assert_eq!(sent["item"]["type"], "conversation");
    }
}
