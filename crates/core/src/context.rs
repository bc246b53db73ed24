//! The per-request memory context handed to the prompt assembler.

use crate::memory::{LayerKind, MemoryItem};
use crate::user::UserContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A merged item with the scores that placed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: MemoryItem,
    /// Layer the item was retrieved from.
    pub layer: LayerKind,
    /// Relevance used for ranking (the item's score or the layer default).
    pub relevance: f32,
    /// Exponential age decay in (0, 1].
    pub recency_weight: f32,
    /// `relevance * recency_weight`.
    pub rank_score: f32,
    /// Estimated token cost of the (possibly sentence-trimmed) content.
    pub tokens: usize,
}

/// Context gathered from all memory tiers for one turn.
///
/// Built fresh per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Hot-cache turns that survived the merge, newest first.
    pub immediate: Vec<MemoryItem>,
    /// Working-memory snippets that survived the merge, rank order.
    pub working: Vec<MemoryItem>,
    /// The user's profile (or the fallback when the profile layer degraded).
    pub structured: UserContext,
    /// Structured facts that survived the merge.
    pub facts: Vec<MemoryItem>,
    /// Key/value preferences from the profile store.
    pub preferences: BTreeMap<String, String>,
    /// Semantic hits that survived the merge, score order.
    pub semantic: Vec<MemoryItem>,
    /// All surviving items in final merged order.
    pub ranked: Vec<RankedItem>,
    /// Layers that failed or timed out during this request.
    pub degraded: BTreeSet<LayerKind>,
    /// Failure reason per degraded layer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<LayerKind, String>,
}

impl AssembledContext {
    /// A context with no memory at all, only the user.
    pub fn empty(user: UserContext) -> Self {
        Self {
            immediate: Vec::new(),
            working: Vec::new(),
            structured: user,
            facts: Vec::new(),
            preferences: BTreeMap::new(),
            semantic: Vec::new(),
            ranked: Vec::new(),
            degraded: BTreeSet::new(),
            failures: BTreeMap::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn has_memory(&self) -> bool {
        !self.ranked.is_empty() || !self.preferences.is_empty()
    }

    /// Record a failed layer.
    pub fn mark_degraded(&mut self, layer: LayerKind, reason: impl Into<String>) {
        self.degraded.insert(layer);
        self.failures.insert(layer, reason.into());
    }

    /// Names of the degraded layers, in priority order.
    pub fn degraded_names(&self) -> Vec<String> {
        self.degraded.iter().map(|l| l.as_str().to_string()).collect()
    }
}
