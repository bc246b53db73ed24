//! Memory layer client traits.
//!
//! Each of the five memory tiers is reached through a typed client. All of
//! them share the [`LayerClient`] capability so the orchestrator can wrap
//! every call with the same timeout / retry / degradation policy, and tests
//! can swap in doubles.
//!
//! Implementations: HTTP clients and in-process backends in `hearth-memory`.

use crate::error::LayerError;
use crate::memory::{LayerKind, MemoryItem};
use crate::user::StructuredProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type for single-layer calls.
pub type LayerResult<T> = std::result::Result<T, LayerError>;

/// Capability shared by every memory layer client.
#[async_trait]
pub trait LayerClient: Send + Sync {
    /// Which tier this client talks to.
    fn layer(&self) -> LayerKind;

    /// Cheap reachability probe.
    async fn health(&self) -> LayerResult<bool>;
}

/// Short-TTL store of the most recent turns.
#[async_trait]
pub trait HotCache: LayerClient {
    /// Most recent turns for a conversation, newest first.
    async fn recent(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> LayerResult<Vec<MemoryItem>>;

    /// Store a turn with a TTL. Storing the same id twice keeps one copy.
    async fn put(&self, item: &MemoryItem, ttl: Duration) -> LayerResult<()>;
}

/// Session-aware semantic memory (~24h retention).
#[async_trait]
pub trait WorkingMemory: LayerClient {
    /// Ranked snippets for `query`; an empty query lists the session.
    async fn search(&self, user_id: &str, query: &str, limit: usize)
    -> LayerResult<Vec<MemoryItem>>;

    /// Add an item. Idempotent per item id.
    async fn add(&self, item: &MemoryItem) -> LayerResult<()>;
}

/// Relational store of user / family facts and preferences.
#[async_trait]
pub trait StructuredProfileStore: LayerClient {
    async fn load(&self, user_id: &str) -> LayerResult<StructuredProfile>;

    /// Record a preference or fact. Idempotent per item id.
    async fn update_preferences(&self, user_id: &str, item: &MemoryItem) -> LayerResult<()>;
}

/// Filter applied to semantic searches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl SearchFilter {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            conversation_id: None,
        }
    }
}

/// Vector similarity index.
#[async_trait]
pub trait SemanticIndex: LayerClient {
    /// Scored items, best first. `relevance_score` is set on every result.
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> LayerResult<Vec<MemoryItem>>;

    /// Insert or replace the point whose id is `item.id`.
    async fn upsert(&self, vector: &[f32], item: &MemoryItem) -> LayerResult<()>;
}

/// Long-term, write-mostly store. Never read on the hot path.
#[async_trait]
pub trait Archive: LayerClient {
    /// Append an item. Idempotent per item id.
    async fn append(&self, item: &MemoryItem) -> LayerResult<()>;
}

/// Text → fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Output dimension.
    fn dimension(&self) -> usize;

    /// Failures must be reported as [`LayerError::EmbeddingFailure`].
    async fn embed(&self, text: &str) -> LayerResult<Vec<f32>>;
}
