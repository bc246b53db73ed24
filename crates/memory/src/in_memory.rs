//! In-process layer backends: test doubles and the CLI's offline mode.
//!
//! Each mirrors the contract of its HTTP counterpart: writes are idempotent
//! per item id, reads never see superseded items from other users.

use crate::vector::vector_search;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hearth_core::memory::PREFERENCE_KEY;
use hearth_core::{
    Archive, ConversationKey, HotCache, LanguageTag, LayerClient, LayerKind, LayerResult,
    MemoryItem, SearchFilter, SemanticIndex, StructuredProfile, StructuredProfileStore,
    UserContext, WorkingMemory,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Turns kept per conversation before the oldest are evicted.
pub const HOT_CACHE_MAX_TURNS: usize = 100;

/// Default working-memory retention.
pub const WORKING_RETENTION_HOURS: i64 = 24;

// ── Hot cache ─────────────────────────────────────────────────────────────

struct CachedTurn {
    item: MemoryItem,
    expires_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct HotCacheState {
    turns: HashMap<ConversationKey, Vec<CachedTurn>>,
    next_seq: u64,
}

/// TTL-bounded recent-turn cache.
#[derive(Clone, Default)]
pub struct InMemoryHotCache {
    state: Arc<RwLock<HotCacheState>>,
}

impl InMemoryHotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live turns stored for a conversation.
    pub async fn len(&self, user_id: &str, conversation_id: &str) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .await
            .turns
            .get(&ConversationKey::new(user_id, conversation_id))
            .map(|turns| turns.iter().filter(|t| t.expires_at > now).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl LayerClient for InMemoryHotCache {
    fn layer(&self) -> LayerKind {
        LayerKind::Immediate
    }

    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl HotCache for InMemoryHotCache {
    async fn recent(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let now = Instant::now();
        let state = self.state.read().await;
        let Some(turns) = state.turns.get(&ConversationKey::new(user_id, conversation_id)) else {
            return Ok(Vec::new());
        };

        let mut live: Vec<&CachedTurn> = turns.iter().filter(|t| t.expires_at > now).collect();
        live.sort_by(|a, b| {
            b.item
                .created_at
                .cmp(&a.item.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        Ok(live
            .into_iter()
            .take(limit)
            .map(|t| t.item.clone())
            .collect())
    }

    async fn put(&self, item: &MemoryItem, ttl: Duration) -> LayerResult<()> {
        let now = Instant::now();
        let mut state = self.state.write().await;
        let seq = state.next_seq;
        state.next_seq += 1;

        let turns = state.turns.entry(item.conversation_key()).or_default();
        turns.retain(|t| t.expires_at > now);

        let turn = CachedTurn {
            item: item.clone(),
            expires_at: now + ttl,
            seq,
        };
        match turns.iter_mut().find(|t| t.item.id == item.id) {
            Some(existing) => {
                // Same id: refresh TTL, keep original position.
                existing.item = turn.item;
                existing.expires_at = turn.expires_at;
            }
            None => turns.push(turn),
        }

        if turns.len() > HOT_CACHE_MAX_TURNS {
            turns.sort_by(|a, b| {
                a.item
                    .created_at
                    .cmp(&b.item.created_at)
                    .then_with(|| a.seq.cmp(&b.seq))
            });
            let excess = turns.len() - HOT_CACHE_MAX_TURNS;
            turns.drain(..excess);
        }
        Ok(())
    }
}

// ── Working memory ────────────────────────────────────────────────────────

/// Session memory with keyword scoring and a retention window.
#[derive(Clone)]
pub struct InMemoryWorkingMemory {
    items: Arc<RwLock<BTreeMap<String, MemoryItem>>>,
    retention: ChronoDuration,
}

impl InMemoryWorkingMemory {
    pub fn new() -> Self {
        Self::with_retention(ChronoDuration::hours(WORKING_RETENTION_HOURS))
    }

    pub fn with_retention(retention: ChronoDuration) -> Self {
        Self {
            items: Arc::new(RwLock::new(BTreeMap::new())),
            retention,
        }
    }

    pub async fn count(&self) -> usize {
        self.items.read().await.len()
    }
}

impl Default for InMemoryWorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of query words present in `content`.
fn keyword_score(query_words: &[String], content: &str) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let content_words: Vec<&str> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let hits = query_words
        .iter()
        .filter(|q| content_words.contains(&q.as_str()))
        .count();
    hits as f32 / query_words.len() as f32
}

fn query_words(query: &str) -> Vec<String> {
    let mut words: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect();
    words.sort();
    words.dedup();
    words
}

#[async_trait]
impl LayerClient for InMemoryWorkingMemory {
    fn layer(&self) -> LayerKind {
        LayerKind::Working
    }

    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl WorkingMemory for InMemoryWorkingMemory {
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let cutoff = Utc::now() - self.retention;
        let items = self.items.read().await;
        let live = items
            .values()
            .filter(|i| i.user_id == user_id && i.created_at >= cutoff && !i.is_superseded());

        let words = query_words(query);
        let mut results: Vec<MemoryItem> = if words.is_empty() {
            // Session listing: newest first, unscored.
            let mut all: Vec<MemoryItem> = live.cloned().collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
            all
        } else {
            let mut scored: Vec<MemoryItem> = live
                .filter_map(|i| {
                    let score = keyword_score(&words, &i.content);
                    (score > 0.0).then(|| i.clone().with_score(score))
                })
                .collect();
            scored.sort_by(|a, b| {
                b.relevance_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.relevance_score.unwrap_or(0.0))
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            });
            scored
        };
        results.truncate(limit);
        Ok(results)
    }

    async fn add(&self, item: &MemoryItem) -> LayerResult<()> {
        let cutoff = Utc::now() - self.retention;
        let mut items = self.items.write().await;
        items.insert(item.id.clone(), item.clone());
        items.retain(|_, i| i.created_at >= cutoff);
        Ok(())
    }
}

// ── Structured profile ────────────────────────────────────────────────────

/// Profiles keyed by user id. Unknown users load as a default member profile.
#[derive(Clone)]
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<HashMap<String, StructuredProfile>>>,
    default_language: LanguageTag,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::with_default_language(LanguageTag::En)
    }

    pub fn with_default_language(default_language: LanguageTag) -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            default_language,
        }
    }

    /// Insert or replace a whole profile.
    pub async fn insert(&self, profile: StructuredProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.context.user_id.clone(), profile);
    }

    /// Current profile, if one was inserted or updated.
    pub async fn get(&self, user_id: &str) -> Option<StructuredProfile> {
        self.profiles.read().await.get(user_id).cloned()
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerClient for InMemoryProfileStore {
    fn layer(&self) -> LayerKind {
        LayerKind::Structured
    }

    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl StructuredProfileStore for InMemoryProfileStore {
    async fn load(&self, user_id: &str) -> LayerResult<StructuredProfile> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).cloned().unwrap_or_else(|| {
            StructuredProfile::new(UserContext::fallback(user_id, self.default_language))
        }))
    }

    async fn update_preferences(&self, user_id: &str, item: &MemoryItem) -> LayerResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.entry(user_id.to_string()).or_insert_with(|| {
            StructuredProfile::new(UserContext::fallback(user_id, self.default_language))
        });

        if let Some(key) = item.metadata.get(PREFERENCE_KEY) {
            profile.preferences.insert(key.clone(), item.content.clone());
        }
        match profile.facts.iter_mut().find(|f| f.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => profile.facts.push(item.clone()),
        }
        Ok(())
    }
}

// ── Semantic index ────────────────────────────────────────────────────────

/// Brute-force cosine index keyed by item id.
#[derive(Clone)]
pub struct InMemorySemanticIndex {
    points: Arc<RwLock<BTreeMap<String, (Vec<f32>, MemoryItem)>>>,
    min_score: f32,
}

impl InMemorySemanticIndex {
    pub fn new() -> Self {
        Self {
            points: Arc::new(RwLock::new(BTreeMap::new())),
            min_score: 0.1,
        }
    }

    /// Hits scoring below `min_score` are not returned.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub async fn count(&self) -> usize {
        self.points.read().await.len()
    }
}

impl Default for InMemorySemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerClient for InMemorySemanticIndex {
    fn layer(&self) -> LayerKind {
        LayerKind::Semantic
    }

    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let points = self.points.read().await;
        let candidates = points.values().filter(|(_, item)| {
            item.user_id == filter.user_id
                && !item.is_superseded()
                && filter
                    .conversation_id
                    .as_ref()
                    .is_none_or(|c| *c == item.conversation_id)
        });
        Ok(vector_search(
            candidates.map(|(v, item)| (v.as_slice(), item)),
            vector,
            top_k,
            self.min_score,
        ))
    }

    async fn upsert(&self, vector: &[f32], item: &MemoryItem) -> LayerResult<()> {
        let mut stored = item.clone();
        stored.embedding_ref = Some(item.id.clone());
        stored.relevance_score = None;
        self.points
            .write()
            .await
            .insert(item.id.clone(), (vector.to_vec(), stored));
        Ok(())
    }
}

// ── Archive ───────────────────────────────────────────────────────────────

/// Append-only archive keyed by item id.
#[derive(Clone, Default)]
pub struct InMemoryArchive {
    items: Arc<RwLock<BTreeMap<String, MemoryItem>>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.items.read().await.contains_key(id)
    }
}

#[async_trait]
impl LayerClient for InMemoryArchive {
    fn layer(&self) -> LayerKind {
        LayerKind::Archive
    }

    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl Archive for InMemoryArchive {
    async fn append(&self, item: &MemoryItem) -> LayerResult<()> {
        self.items
            .write()
            .await
            .entry(item.id.clone())
            .or_insert_with(|| item.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::hash_embedding;
    use hearth_core::memory::SUPERSEDED;
    use hearth_core::{MemoryType, Role};

    fn turn(id: &str, content: &str, minutes_ago: i64) -> MemoryItem {
        MemoryItem::new("u1", "c1", MemoryType::Conversation, content)
            .with_id(id)
            .with_created_at(Utc::now() - ChronoDuration::minutes(minutes_ago))
    }

    #[tokio::test]
    async fn hot_cache_returns_newest_first() {
        let cache = InMemoryHotCache::new();
        let ttl = Duration::from_secs(60);
        cache.put(&turn("a", "first", 3), ttl).await.unwrap();
        cache.put(&turn("b", "second", 2), ttl).await.unwrap();
        cache.put(&turn("c", "third", 1), ttl).await.unwrap();

        let recent = cache.recent("u1", "c1", 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn hot_cache_put_is_idempotent() {
        let cache = InMemoryHotCache::new();
        let item = turn("a", "hello", 0);
        cache.put(&item, Duration::from_secs(60)).await.unwrap();
        cache.put(&item, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len("u1", "c1").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hot_cache_expires_after_ttl() {
        let cache = InMemoryHotCache::new();
        cache
            .put(&turn("a", "short lived", 0), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.recent("u1", "c1", 5).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.recent("u1", "c1", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hot_cache_caps_turns_per_conversation() {
        let cache = InMemoryHotCache::new();
        for i in 0..(HOT_CACHE_MAX_TURNS + 5) {
            let item = turn(&format!("t{i:03}"), "x", (HOT_CACHE_MAX_TURNS + 5 - i) as i64);
            cache.put(&item, Duration::from_secs(600)).await.unwrap();
        }
        assert_eq!(cache.len("u1", "c1").await, HOT_CACHE_MAX_TURNS);
        let oldest_kept = cache
            .recent("u1", "c1", HOT_CACHE_MAX_TURNS)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(oldest_kept.id, "t005");
    }

    #[tokio::test]
    async fn working_memory_scores_keywords() {
        let wm = InMemoryWorkingMemory::new();
        wm.add(&turn("w1", "Sofia is working on fractions homework", 5))
            .await
            .unwrap();
        wm.add(&turn("w2", "Dinner is at seven", 4)).await.unwrap();

        let hits = wm.search("u1", "fractions homework", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "w1");
        assert_eq!(hits[0].relevance_score, Some(1.0));
    }

    #[tokio::test]
    async fn working_memory_empty_query_lists_session() {
        let wm = InMemoryWorkingMemory::new();
        wm.add(&turn("old", "a", 10)).await.unwrap();
        wm.add(&turn("new", "b", 1)).await.unwrap();
        let listed = wm.search("u1", "", 10).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(listed[0].relevance_score.is_none());
    }

    #[tokio::test]
    async fn working_memory_drops_expired_and_superseded() {
        let wm = InMemoryWorkingMemory::new();
        wm.add(&turn("stale", "math notes", 60 * 25)).await.unwrap();
        let mut replaced = turn("replaced", "math notes v1", 1);
        replaced.annotate(SUPERSEDED, "true");
        wm.add(&replaced).await.unwrap();

        assert!(wm.search("u1", "", 10).await.unwrap().is_empty());
        // The superseded item stays stored; the stale one was evicted on write.
        assert_eq!(wm.count().await, 1);
    }

    #[tokio::test]
    async fn working_memory_evicts_past_retention_on_add() {
        let wm = InMemoryWorkingMemory::with_retention(ChronoDuration::minutes(30));
        wm.add(&turn("old-1", "grocery list", 90)).await.unwrap();
        wm.add(&turn("old-2", "soccer practice", 45)).await.unwrap();
        wm.add(&turn("fresh", "math notes", 5)).await.unwrap();

        assert_eq!(wm.count().await, 1);
        let listed = wm.search("u1", "", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "fresh");
    }

    #[tokio::test]
    async fn profile_store_defaults_unknown_users() {
        let store = InMemoryProfileStore::with_default_language(LanguageTag::Es);
        let profile = store.load("nobody").await.unwrap();
        assert_eq!(profile.context.role, Role::Member);
        assert_eq!(profile.context.language_preference.primary(), LanguageTag::Es);
    }

    #[tokio::test]
    async fn profile_store_records_preferences_once() {
        let store = InMemoryProfileStore::new();
        let mut pref = MemoryItem::new("dad", "c1", MemoryType::Preference, "short answers")
            .with_id("p1");
        pref.annotate(PREFERENCE_KEY, "verbosity");

        store.update_preferences("dad", &pref).await.unwrap();
        store.update_preferences("dad", &pref).await.unwrap();

        let profile = store.load("dad").await.unwrap();
        assert_eq!(profile.facts.len(), 1);
        assert_eq!(
            profile.preferences.get("verbosity").map(String::as_str),
            Some("short answers")
        );
    }

    #[tokio::test]
    async fn semantic_index_filters_by_user_and_upserts_by_id() {
        let index = InMemorySemanticIndex::new();
        let mine = turn("m1", "science fair volcano", 1);
        let theirs = MemoryItem::new("u2", "c9", MemoryType::Context, "science fair volcano")
            .with_id("t1");
        let v = hash_embedding("science fair volcano", 64);
        index.upsert(&v, &mine).await.unwrap();
        index.upsert(&v, &mine).await.unwrap();
        index.upsert(&v, &theirs).await.unwrap();
        assert_eq!(index.count().await, 2);

        let hits = index
            .search(&hash_embedding("volcano", 64), &SearchFilter::for_user("u1"), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
        assert_eq!(hits[0].embedding_ref.as_deref(), Some("m1"));
        assert!(hits[0].relevance_score.unwrap() > 0.1);
    }

    #[tokio::test]
    async fn archive_append_is_idempotent() {
        let archive = InMemoryArchive::new();
        let item = turn("a1", "archived", 0);
        archive.append(&item).await.unwrap();
        archive.append(&item).await.unwrap();
        assert_eq!(archive.count().await, 1);
        assert!(archive.contains("a1").await);
    }
}
