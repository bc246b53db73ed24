//! Embedding providers.
//!
//! - [`HttpEmbedder`]: `POST /embed {text, model}` against an embedding service.
//! - [`HashEmbedder`]: deterministic feature hashing, no network.
//!
//! Every failure surfaces as [`LayerError::EmbeddingFailure`] so the
//! orchestrator only degrades the semantic tier when embedding breaks.

use crate::http::HttpLayer;
use crate::vector::hash_embedding;
use async_trait::async_trait;
use hearth_core::{EmbeddingProvider, LayerError, LayerKind, LayerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    http: HttpLayer,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
        token: Option<String>,
    ) -> LayerResult<Self> {
        Ok(Self {
            // Transport errors are tagged semantic; embed() rewraps them.
            http: HttpLayer::new(LayerKind::Semantic, base_url, timeout, token)?,
            model: model.into(),
            dimension,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> LayerResult<Vec<f32>> {
        let body = EmbedRequest {
            text,
            model: &self.model,
        };
        let response: EmbedResponse = self
            .http
            .post_json("/embed", &body)
            .await
            .map_err(|e| LayerError::EmbeddingFailure(e.to_string()))?;

        if response.embedding.len() != self.dimension {
            return Err(LayerError::EmbeddingFailure(format!(
                "expected {} dimensions from model '{}', got {}",
                self.dimension,
                self.model,
                response.embedding.len()
            )));
        }
        Ok(response.embedding)
    }
}

/// Offline embedder used by tests and `--offline`.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> LayerResult<Vec<f32>> {
        if self.dimension == 0 {
            return Err(LayerError::EmbeddingFailure(
                "hash embedder configured with zero dimensions".into(),
            ));
        }
        Ok(hash_embedding(text, self.dimension))
    }
}
