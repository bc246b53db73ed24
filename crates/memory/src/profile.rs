//! HTTP client for the structured profile store.

use crate::http::HttpLayer;
use async_trait::async_trait;
use hearth_core::{
    LayerClient, LayerKind, LayerResult, MemoryItem, StructuredProfile, StructuredProfileStore,
};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PreferenceUpdate<'a> {
    item: &'a MemoryItem,
}

/// `GET /profile/{user}`, `PUT /profile/{user}/preferences`.
pub struct HttpProfileStore {
    http: HttpLayer,
}

impl HttpProfileStore {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> LayerResult<Self> {
        Ok(Self {
            http: HttpLayer::new(LayerKind::Structured, base_url, timeout, token)?,
        })
    }
}

/// Percent-encode a user id for use as a path segment.
fn path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait]
impl LayerClient for HttpProfileStore {
    fn layer(&self) -> LayerKind {
        LayerKind::Structured
    }

    async fn health(&self) -> LayerResult<bool> {
        self.http.health().await
    }
}

#[async_trait]
impl StructuredProfileStore for HttpProfileStore {
    async fn load(&self, user_id: &str) -> LayerResult<StructuredProfile> {
        let path = format!("/profile/{}", path_segment(user_id));
        self.http.get_json(&path, &[]).await
    }

    async fn update_preferences(&self, user_id: &str, item: &MemoryItem) -> LayerResult<()> {
        let path = format!("/profile/{}/preferences", path_segment(user_id));
        self.http
            .send_unit(reqwest::Method::PUT, &path, &PreferenceUpdate { item })
            .await
    }
}
