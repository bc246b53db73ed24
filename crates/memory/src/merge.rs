//! Merging per-layer results into one ranked, budgeted list.
//!
//! Pipeline, deterministic for identical inputs and `now`:
//!
//! 1. **Score**: tag each item with its layer, drop superseded items, and
//!    compute `recency_weight = 0.5^(age / half_life)`.
//! 2. **Dedup**: same id, or token-set Jaccard ≥ threshold.
//! 3. **Rank**: `relevance * recency_weight`, descending; ties keep layer
//!    priority then input order.
//! 4. **Truncate**: greedy best-first fill of the token budget, trimming
//!    at sentence boundaries when a whole sentence still fits.

use chrono::{DateTime, Utc};
use hearth_config::MergeConfig;
use hearth_core::token::{estimate_tokens, truncate_at_sentence};
use hearth_core::{AssembledContext, LayerKind, MemoryItem, RankedItem};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Metadata key set on items shortened to fit the budget.
pub const TRUNCATED: &str = "truncated";

/// Results from one layer, in the order the layer returned them.
#[derive(Debug, Clone)]
pub struct LayerBatch {
    pub layer: LayerKind,
    pub items: Vec<MemoryItem>,
}

impl LayerBatch {
    pub fn new(layer: LayerKind, items: Vec<MemoryItem>) -> Self {
        Self { layer, items }
    }
}

/// Combines layer results into a single ranked context.
#[derive(Debug, Clone, Default)]
pub struct MemoryMerger {
    config: MergeConfig,
}

impl MemoryMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Run the whole pipeline. `budget = None` skips truncation.
    pub fn merge(
        &self,
        batches: Vec<LayerBatch>,
        budget: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<RankedItem> {
        let scored = self.score(batches, now);
        let total = scored.len();
        let unique = self.dedup(scored);
        let deduped = total - unique.len();
        let ranked = rank(unique);
        let kept = match budget {
            Some(budget) => truncate(ranked, budget),
            None => ranked,
        };
        debug!(
            candidates = total,
            deduped,
            kept = kept.len(),
            tokens = kept.iter().map(|r| r.tokens).sum::<usize>(),
            "merged memory layers"
        );
        kept
    }

    /// Merge and lay the survivors out into `base`'s per-tier fields.
    ///
    /// `base` carries the user, preferences and degradation markers gathered
    /// by the caller; its memory fields are overwritten.
    pub fn assemble(
        &self,
        mut base: AssembledContext,
        batches: Vec<LayerBatch>,
        budget: Option<usize>,
        now: DateTime<Utc>,
    ) -> AssembledContext {
        let ranked = self.merge(batches, budget, now);

        base.immediate.clear();
        base.working.clear();
        base.facts.clear();
        base.semantic.clear();

        let mut immediate = Vec::new();
        let mut semantic = Vec::new();
        for r in &ranked {
            match r.layer {
                LayerKind::Immediate => immediate.push(r.item.clone()),
                LayerKind::Working => base.working.push(r.item.clone()),
                LayerKind::Semantic => semantic.push((r.relevance, r.item.clone())),
                LayerKind::Structured | LayerKind::Archive => base.facts.push(r.item.clone()),
            }
        }

        // Hot-cache turns newest first; semantic hits by raw similarity.
        immediate.sort_by(|a: &MemoryItem, b| b.created_at.cmp(&a.created_at));
        semantic.sort_by(|a, b| b.0.total_cmp(&a.0));
        base.immediate = immediate;
        base.semantic = semantic.into_iter().map(|(_, item)| item).collect();
        base.ranked = ranked;
        base
    }

    /// Step 1: attach layer, relevance and recency weight to every item.
    pub fn score(&self, batches: Vec<LayerBatch>, now: DateTime<Utc>) -> Vec<RankedItem> {
        let mut out = Vec::new();
        for batch in batches {
            let half_life = self.config.half_life(batch.layer);
            for item in batch.items {
                if item.is_superseded() {
                    continue;
                }
                let relevance = item.relevance_score.unwrap_or(match batch.layer {
                    LayerKind::Immediate => self.config.immediate_relevance,
                    _ => self.config.default_relevance,
                });
                let recency_weight = recency_weight(item.created_at, now, half_life);
                let tokens = estimate_tokens(&item.content);
                out.push(RankedItem {
                    item,
                    layer: batch.layer,
                    relevance,
                    recency_weight,
                    rank_score: relevance * recency_weight,
                    tokens,
                });
            }
        }
        out
    }

    /// Step 2: collapse duplicates.
    ///
    /// Items are compared in layer-priority order (stable within a layer).
    /// Of two duplicates the higher relevance wins, then the newer
    /// `created_at`, then the one from the higher-priority layer.
    pub fn dedup(&self, mut items: Vec<RankedItem>) -> Vec<RankedItem> {
        items.sort_by_key(|r| r.layer.priority());

        let mut kept: Vec<(RankedItem, BTreeSet<String>)> = Vec::with_capacity(items.len());
        for candidate in items {
            let tokens = normalized_tokens(&candidate.item.content);
            let duplicate_of = kept.iter().position(|(existing, existing_tokens)| {
                existing.item.id == candidate.item.id
                    || jaccard_similarity(existing_tokens, &tokens)
                        >= self.config.similarity_threshold
            });

            match duplicate_of {
                Some(idx) => {
                    if prefer(&candidate, &kept[idx].0) {
                        kept[idx] = (candidate, tokens);
                    }
                }
                None => kept.push((candidate, tokens)),
            }
        }
        kept.into_iter().map(|(item, _)| item).collect()
    }

    /// Dedup plain items (already scored by their layer) and sort them by
    /// relevance, best first. Used by memory search.
    pub fn dedup_and_sort(&self, batches: Vec<LayerBatch>, limit: usize) -> Vec<MemoryItem> {
        let scored = self.score(batches, Utc::now());
        let mut unique = self.dedup(scored);
        sort_by_relevance(&mut unique);
        unique
            .into_iter()
            .take(limit)
            .map(|r| {
                let relevance = r.relevance;
                r.item.with_score(relevance)
            })
            .collect()
    }
}

/// `0.5^(age / half_life)`; `1.0` without a half-life or for future items.
pub fn recency_weight(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    half_life: Option<Duration>,
) -> f32 {
    let Some(half_life) = half_life else {
        return 1.0;
    };
    let half_life_secs = half_life.as_secs_f64();
    if half_life_secs <= 0.0 {
        return 1.0;
    }
    let age_secs = (now - created_at).num_milliseconds().max(0) as f64 / 1000.0;
    0.5f64.powf(age_secs / half_life_secs) as f32
}

fn prefer(candidate: &RankedItem, existing: &RankedItem) -> bool {
    match candidate.relevance.total_cmp(&existing.relevance) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.item.created_at > existing.item.created_at,
    }
}

/// Step 3: stable sort by rank score, then layer priority.
pub fn rank(mut items: Vec<RankedItem>) -> Vec<RankedItem> {
    items.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| a.layer.priority().cmp(&b.layer.priority()))
    });
    items
}

/// Stable sort by raw relevance, then layer priority.
pub fn sort_by_relevance(items: &mut [RankedItem]) {
    items.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| a.layer.priority().cmp(&b.layer.priority()))
    });
}

/// Step 4: keep items best-first while they fit in `budget` tokens.
///
/// An item that does not fit is shortened to its longest whole-sentence
/// prefix that does; if no sentence fits it is skipped and smaller items
/// further down may still be taken.
pub fn truncate(items: Vec<RankedItem>, budget: usize) -> Vec<RankedItem> {
    let mut remaining = budget;
    let mut kept = Vec::with_capacity(items.len());

    for mut ranked in items {
        if remaining == 0 {
            break;
        }
        if ranked.tokens <= remaining {
            remaining -= ranked.tokens;
            kept.push(ranked);
            continue;
        }
        if let Some(trimmed) = truncate_at_sentence(&ranked.item.content, remaining) {
            let tokens = estimate_tokens(&trimmed);
            if tokens == 0 || tokens > remaining {
                continue;
            }
            ranked.item.content = trimmed;
            ranked.item.annotate(TRUNCATED, "true");
            ranked.tokens = tokens;
            remaining -= tokens;
            kept.push(ranked);
        }
    }
    kept
}

/// Lowercased alphanumeric word set used for near-duplicate detection.
pub fn normalized_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// `|A ∩ B| / |A ∪ B|`; `0.0` when either side is empty.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}
