//! HTTP client for the semantic (vector) index.

use crate::http::HttpLayer;
use async_trait::async_trait;
use hearth_core::{LayerClient, LayerKind, LayerResult, MemoryItem, SearchFilter, SemanticIndex};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    filter: &'a SearchFilter,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f32,
    payload: MemoryItem,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a MemoryItem,
}

/// `POST /search`, `POST /upsert`.
pub struct HttpSemanticIndex {
    http: HttpLayer,
}

impl HttpSemanticIndex {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> LayerResult<Self> {
        Ok(Self {
            http: HttpLayer::new(LayerKind::Semantic, base_url, timeout, token)?,
        })
    }
}

#[async_trait]
impl LayerClient for HttpSemanticIndex {
    fn layer(&self) -> LayerKind {
        LayerKind::Semantic
    }

    async fn health(&self) -> LayerResult<bool> {
        self.http.health().await
    }
}

#[async_trait]
impl SemanticIndex for HttpSemanticIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let body = SearchRequest {
            vector,
            filter,
            top_k,
        };
        let response: SearchResponse = self.http.post_json("/search", &body).await?;
        Ok(response
            .hits
            .into_iter()
            .map(|hit| hit.payload.with_score(hit.score))
            .collect())
    }

    async fn upsert(&self, vector: &[f32], item: &MemoryItem) -> LayerResult<()> {
        let body = UpsertRequest {
            id: &item.id,
            vector,
            payload: item,
        };
        self.http
            .send_unit(reqwest::Method::POST, "/upsert", &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use axum::routing::post;
    use axum::{Json, Router};
    use hearth_core::MemoryType;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn search_copies_hit_score_onto_item() {
        let router = Router::new().route(
            "/search",
            post(|Json(req): Json<Value>| async move {
                assert_eq!(req["filter"]["user_id"], "u1");
                assert_eq!(req["top_k"], 3);
                let payload = MemoryItem::new("u1", "c0", MemoryType::Fact, "Sofia is in 4th grade")
                    .with_id("s1");
                Json(json!({ "hits": [{ "id": "s1", "score": 0.91, "payload": payload }] }))
            }),
        );
        let base = test_server::spawn(router).await;
        let index = HttpSemanticIndex::new(&base, Duration::from_secs(2), None).unwrap();

        let hits = index
            .search(&[0.1, 0.2], &SearchFilter::for_user("u1"), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s1");
        assert!((hits[0].relevance_score.unwrap() - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_uses_item_id_as_point_id() {
        let router = Router::new().route(
            "/upsert",
            post(|Json(req): Json<Value>| async move {
                assert_eq!(req["id"], "p7");
                assert_eq!(req["payload"]["id"], "p7");
                assert_eq!(req["vector"].as_array().map(Vec::len), Some(2));
                Json(json!({ "ok": true }))
            }),
        );
        let base = test_server::spawn(router).await;
        let index = HttpSemanticIndex::new(&base, Duration::from_secs(2), None).unwrap();

        let item = MemoryItem::new("u1", "c1", MemoryType::Context, "x").with_id("p7");
        index.upsert(&[1.0, 0.0], &item).await.unwrap();
    }
}
