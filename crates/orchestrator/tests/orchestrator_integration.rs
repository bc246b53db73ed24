//! Integration tests for the memory orchestrator.
//!
//! These run the full read and write paths over in-process layers, with
//! failing, slow and racy doubles swapped in where a scenario needs them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hearth_config::AppConfig;
use hearth_core::{
    Archive, EmbeddingProvider, Error, HotCache, LanguagePreference, LayerClient, LayerError,
    LayerKind, LayerResult, MemoryItem, MemoryType, PromptMode, Role, SearchFilter, Section,
    SemanticIndex, StructuredProfile, StructuredProfileStore, UserContext, WorkingMemory,
};
use hearth_memory::{
    InMemoryArchive, InMemoryHotCache, InMemoryProfileStore, InMemorySemanticIndex,
    InMemoryWorkingMemory,
};
use hearth_orchestrator::{GetContextRequest, Layers, MemoryOrchestrator, PromptBuildRequest};
use hearth_prompt::TemplateStore;

// ── Doubles ──────────────────────────────────────────────────────────────

/// Every call fails as unavailable.
struct Down(LayerKind);

impl Down {
    fn err<T>(&self) -> LayerResult<T> {
        Err(LayerError::unavailable(self.0, "connection refused"))
    }
}

#[async_trait]
impl LayerClient for Down {
    fn layer(&self) -> LayerKind {
        self.0
    }
    async fn health(&self) -> LayerResult<bool> {
        self.err()
    }
}

#[async_trait]
impl HotCache for Down {
    async fn recent(&self, _: &str, _: &str, _: usize) -> LayerResult<Vec<MemoryItem>> {
        self.err()
    }
    async fn put(&self, _: &MemoryItem, _: Duration) -> LayerResult<()> {
        self.err()
    }
}

#[async_trait]
impl WorkingMemory for Down {
    async fn search(&self, _: &str, _: &str, _: usize) -> LayerResult<Vec<MemoryItem>> {
        self.err()
    }
    async fn add(&self, _: &MemoryItem) -> LayerResult<()> {
        self.err()
    }
}

#[async_trait]
impl StructuredProfileStore for Down {
    async fn load(&self, _: &str) -> LayerResult<StructuredProfile> {
        self.err()
    }
    async fn update_preferences(&self, _: &str, _: &MemoryItem) -> LayerResult<()> {
        self.err()
    }
}

#[async_trait]
impl SemanticIndex for Down {
    async fn search(&self, _: &[f32], _: &SearchFilter, _: usize) -> LayerResult<Vec<MemoryItem>> {
        self.err()
    }
    async fn upsert(&self, _: &[f32], _: &MemoryItem) -> LayerResult<()> {
        self.err()
    }
}

#[async_trait]
impl Archive for Down {
    async fn append(&self, _: &MemoryItem) -> LayerResult<()> {
        self.err()
    }
}

/// Never answers in time.
struct Stalled(LayerKind);

#[async_trait]
impl LayerClient for Stalled {
    fn layer(&self) -> LayerKind {
        self.0
    }
    async fn health(&self) -> LayerResult<bool> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(true)
    }
}

#[async_trait]
impl SemanticIndex for Stalled {
    async fn search(&self, _: &[f32], _: &SearchFilter, _: usize) -> LayerResult<Vec<MemoryItem>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
    async fn upsert(&self, _: &[f32], _: &MemoryItem) -> LayerResult<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[async_trait]
impl WorkingMemory for Stalled {
    async fn search(&self, _: &str, _: &str, _: usize) -> LayerResult<Vec<MemoryItem>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
    async fn add(&self, _: &MemoryItem) -> LayerResult<()> {
        Ok(())
    }
}

struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }
    fn dimension(&self) -> usize {
        768
    }
    async fn embed(&self, _: &str) -> LayerResult<Vec<f32>> {
        Err(LayerError::EmbeddingFailure("model not loaded".into()))
    }
}

/// Hot cache that increments a counter with a read-modify-write split by a
/// yield, and records whether two writes ever overlapped.
#[derive(Default)]
struct RacyCounter {
    count: std::sync::Mutex<usize>,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
}

#[async_trait]
impl LayerClient for RacyCounter {
    fn layer(&self) -> LayerKind {
        LayerKind::Immediate
    }
    async fn health(&self) -> LayerResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl HotCache for RacyCounter {
    async fn recent(&self, _: &str, _: &str, _: usize) -> LayerResult<Vec<MemoryItem>> {
        Ok(Vec::new())
    }

    async fn put(&self, _: &MemoryItem, _: Duration) -> LayerResult<()> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let read = *self.count.lock().unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        *self.count.lock().unwrap() = read + 1;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

struct Fixture {
    hot: Arc<InMemoryHotCache>,
    working: Arc<InMemoryWorkingMemory>,
    profile: Arc<InMemoryProfileStore>,
    semantic: Arc<InMemorySemanticIndex>,
    archive: Arc<InMemoryArchive>,
    layers: Layers,
    config: AppConfig,
}

impl Fixture {
    fn new() -> Self {
        let config = AppConfig::default();
        let hot = Arc::new(InMemoryHotCache::new());
        let working = Arc::new(InMemoryWorkingMemory::new());
        let profile = Arc::new(InMemoryProfileStore::new());
        let semantic = Arc::new(InMemorySemanticIndex::new());
        let archive = Arc::new(InMemoryArchive::new());
        let mut layers = Layers::in_memory(&config);
        layers.hot_cache = hot.clone();
        layers.working = working.clone();
        layers.profile = profile.clone();
        layers.semantic = semantic.clone();
        layers.archive = archive.clone();
        Self {
            hot,
            working,
            profile,
            semantic,
            archive,
            layers,
            config,
        }
    }

    fn orchestrator(&self) -> MemoryOrchestrator {
        MemoryOrchestrator::new(
            self.layers.clone(),
            Arc::new(TemplateStore::builtin()),
            &self.config,
        )
    }

    async fn child_profile(&self) {
        let mut user = UserContext::new("u1", Role::Child, LanguagePreference::En)
            .with_skills(["homework"]);
        user.age_group = Some("8-10".into());
        let mut profile = StructuredProfile::new(user);
        profile.facts.push(MemoryItem::new(
            "u1",
            "c0",
            MemoryType::Fact,
            "Sofia is in 4th grade and likes drawing.",
        ));
        self.profile.insert(profile).await;
    }

    async fn three_turns(&self) {
        let base = Utc::now() - ChronoDuration::minutes(10);
        let turns = [
            ("user", "I need homework help with fractions"),
            ("assistant", "Sure! Which problem are you on?"),
            ("user", "Number four, adding one half and one third"),
        ];
        for (i, (speaker, content)) in turns.into_iter().enumerate() {
            let mut item = MemoryItem::new("u1", "c1", MemoryType::Conversation, content)
                .with_id(format!("turn-{i}"))
                .with_created_at(base + ChronoDuration::minutes(i as i64));
            item.annotate(hearth_core::memory::SPEAKER, speaker);
            self.hot.put(&item, Duration::from_secs(3600)).await.unwrap();
        }
    }
}

fn fixed_clock() -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    let now = Utc::now() + ChronoDuration::hours(1);
    move || now
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn homework_help_with_semantic_timeout() {
    let mut fx = Fixture::new();
    fx.layers.semantic = Arc::new(Stalled(LayerKind::Semantic));
    fx.child_profile().await;
    fx.three_turns().await;
    let o = fx.orchestrator();

    let ctx = o
        .get_context(
            &GetContextRequest::new("u1", "c1")
                .with_query("homework help")
                .with_budget(2000),
        )
        .await
        .unwrap();

    assert_eq!(ctx.immediate.len(), 3);
    assert!(ctx.semantic.is_empty());
    assert_eq!(ctx.degraded_names(), vec!["semantic"]);
    assert!(ctx.failures[&LayerKind::Semantic].contains("timed out"));
    assert_eq!(ctx.structured.role, Role::Child);

    let prompt = o
        .build_prompt(
            &PromptBuildRequest::new("u1", "c1")
                .with_query("homework help")
                .with_budget(2000),
        )
        .await
        .unwrap();
    assert!(!prompt.final_text.is_empty());
    assert!(prompt.uses(Section::Rules));
    assert!(prompt.uses(Section::Role));
    assert!(prompt.final_text.contains("# RULES"));
    assert!(prompt.final_text.contains("# ACTIVE ROLE CONTEXT"));
    assert!(prompt.final_text.contains("adding one half and one third"));
    assert_eq!(prompt.degraded, vec!["semantic"]);
    assert!(prompt.estimated_tokens <= 2000);
}

#[tokio::test(start_paused = true)]
async fn single_slow_layer_leaves_others_populated() {
    let mut fx = Fixture::new();
    fx.layers.working = Arc::new(Stalled(LayerKind::Working));
    fx.child_profile().await;
    fx.three_turns().await;
    let o = fx.orchestrator();

    let ctx = o
        .get_context(&GetContextRequest::new("u1", "c1").with_query("fractions"))
        .await
        .unwrap();
    assert_eq!(ctx.degraded_names(), vec!["working"]);
    assert_eq!(ctx.immediate.len(), 3);
    assert_eq!(ctx.facts.len(), 1);
    assert!(ctx.working.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_shortens_layer_timeouts() {
    let mut fx = Fixture::new();
    fx.layers.semantic = Arc::new(Stalled(LayerKind::Semantic));
    let o = fx.orchestrator();

    let started = tokio::time::Instant::now();
    let ctx = o
        .get_context(
            &GetContextRequest::new("u1", "c1")
                .with_query("anything")
                .with_deadline(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    assert_eq!(ctx.degraded_names(), vec!["semantic"]);
    // 200ms deadline minus the 50ms margin
    assert!(started.elapsed() <= Duration::from_millis(160));
}

#[tokio::test]
async fn embedding_failure_degrades_semantic_only() {
    let mut fx = Fixture::new();
    fx.layers.embedder = Arc::new(BrokenEmbedder);
    fx.three_turns().await;
    let o = fx.orchestrator();

    let ctx = o
        .get_context(&GetContextRequest::new("u1", "c1").with_query("fractions"))
        .await
        .unwrap();
    assert_eq!(ctx.degraded_names(), vec!["semantic"]);
    assert!(ctx.failures[&LayerKind::Semantic].contains("model not loaded"));
    assert_eq!(ctx.immediate.len(), 3);
}

#[tokio::test]
async fn all_layers_down_fails_get_context() {
    let mut fx = Fixture::new();
    fx.layers.hot_cache = Arc::new(Down(LayerKind::Immediate));
    fx.layers.working = Arc::new(Down(LayerKind::Working));
    fx.layers.profile = Arc::new(Down(LayerKind::Structured));
    fx.layers.semantic = Arc::new(Down(LayerKind::Semantic));
    fx.layers.archive = Arc::new(Down(LayerKind::Archive));
    let o = fx.orchestrator();

    let err = o
        .get_context(&GetContextRequest::new("u1", "c1").with_query("homework"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "all_layers_unavailable");
    match err {
        Error::AllLayersUnavailable { failures } => assert_eq!(failures.len(), 4),
        other => panic!("unexpected error: {other:?}"),
    }

    // A prompt is still produced, without memory.
    let prompt = o
        .build_prompt(&PromptBuildRequest::new("u1", "c1").with_query("homework"))
        .await
        .unwrap();
    assert!(prompt.final_text.starts_with("# Hearth"));
    assert!(!prompt.uses(Section::MemoryContext));
    assert!(prompt.warnings[0].contains("all memory layers unavailable"));
    assert_eq!(prompt.degraded.len(), 4);
}

#[tokio::test]
async fn no_query_skips_semantic_index() {
    let mut fx = Fixture::new();
    fx.layers.semantic = Arc::new(Down(LayerKind::Semantic));
    let o = fx.orchestrator();

    let ctx = o.get_context(&GetContextRequest::new("u1", "c1")).await.unwrap();
    assert!(ctx.degraded.is_empty());
}

#[tokio::test]
async fn get_context_is_deterministic() {
    let fx = Fixture::new();
    fx.child_profile().await;
    fx.three_turns().await;
    for i in 0..12 {
        let item = MemoryItem::new(
            "u1",
            "c1",
            MemoryType::Context,
            format!("Fractions note {i}: practiced common denominators with example {i}."),
        )
        .with_id(format!("note-{i:02}"));
        fx.working.add(&item).await.unwrap();
        let vector = hearth_memory::hash_embedding(&item.content, 768);
        fx.semantic.upsert(&vector, &item).await.unwrap();
    }
    let o = fx.orchestrator().with_clock(fixed_clock());
    let request = GetContextRequest::new("u1", "c1")
        .with_query("fractions denominators")
        .with_budget(300);

    let first = o.get_context(&request).await.unwrap();
    for _ in 0..5 {
        assert_eq!(o.get_context(&request).await.unwrap(), first);
    }
    let tokens: usize = first.ranked.iter().map(|r| r.tokens).sum();
    assert!(tokens <= 300);
}

#[tokio::test]
async fn repeated_saves_store_one_item_per_layer() {
    let fx = Fixture::new();
    let o = fx.orchestrator();
    let mut item = MemoryItem::new("u1", "c1", MemoryType::Preference, "Likes short answers")
        .with_id("pref-1");
    item.annotate(hearth_core::memory::PREFERENCE_KEY, "verbosity");

    o.save_context(item.clone()).await.unwrap();
    o.save_context(item.clone()).await.unwrap();
    o.flush().await;

    assert_eq!(fx.hot.len("u1", "c1").await, 1);
    assert_eq!(fx.working.count().await, 1);
    assert_eq!(fx.semantic.count().await, 1);
    assert_eq!(fx.archive.count().await, 1);
    let profile = fx.profile.get("u1").await.unwrap();
    assert_eq!(profile.facts.len(), 1);
    assert_eq!(profile.preferences["verbosity"], "Likes short answers");
}

#[tokio::test]
async fn conversation_turns_skip_the_profile_store() {
    let fx = Fixture::new();
    let o = fx.orchestrator();
    o.save_context(MemoryItem::new("u1", "c1", MemoryType::Conversation, "hello"))
        .await
        .unwrap();
    o.flush().await;
    assert!(fx.profile.get("u1").await.is_none());
    assert_eq!(fx.archive.count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn background_failures_do_not_fail_save() {
    let mut fx = Fixture::new();
    fx.layers.working = Arc::new(Down(LayerKind::Working));
    fx.layers.semantic = Arc::new(Down(LayerKind::Semantic));
    fx.layers.archive = Arc::new(Down(LayerKind::Archive));
    let o = fx.orchestrator();

    let result = o
        .save_context(MemoryItem::new("u1", "c1", MemoryType::Context, "note").with_id("n1"))
        .await;
    assert!(result.is_ok());
    o.flush().await;
    assert_eq!(fx.hot.len("u1", "c1").await, 1);
    assert_eq!(o.pending_writes(), 0);
}

#[tokio::test]
async fn hot_cache_failure_fails_save() {
    let mut fx = Fixture::new();
    fx.layers.hot_cache = Arc::new(Down(LayerKind::Immediate));
    let o = fx.orchestrator();

    let err = o
        .save_context(MemoryItem::new("u1", "c1", MemoryType::Context, "note"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "layer_unavailable");
    o.flush().await;
    assert_eq!(fx.archive.count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_for_one_conversation_never_interleave() {
    let mut fx = Fixture::new();
    let counter = Arc::new(RacyCounter::default());
    fx.layers.hot_cache = counter.clone();
    let o = Arc::new(fx.orchestrator());

    let mut handles = Vec::new();
    for i in 0..50 {
        let o = o.clone();
        handles.push(tokio::spawn(async move {
            o.save_context(MemoryItem::new(
                "u1",
                "c1",
                MemoryType::Conversation,
                format!("turn {i}"),
            ))
            .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    o.flush().await;

    assert_eq!(*counter.count.lock().unwrap(), 50);
    assert!(!counter.overlapped.load(Ordering::SeqCst));
    assert_eq!(fx.archive.count().await, 50);
}

#[tokio::test]
async fn search_merges_working_and_semantic() {
    let fx = Fixture::new();
    let o = fx.orchestrator();
    for (id, content) in [
        ("a", "Soccer practice moved to Thursday at five"),
        ("b", "Grandma's birthday dinner is on Sunday"),
        ("c", "Soccer cleats need replacing before practice"),
    ] {
        o.save_context(MemoryItem::new("u1", "c1", MemoryType::Context, content).with_id(id))
            .await
            .unwrap();
    }
    o.flush().await;

    let results = o.search_memories("soccer practice", "u1", 5).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|i| i.id.as_str()).collect();
    assert!(ids.contains(&"a"));
    assert!(ids.contains(&"c"));
    // one entry per item even though both layers return it
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    for pair in results.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
}

#[tokio::test]
async fn search_fails_when_both_layers_are_down() {
    let mut fx = Fixture::new();
    fx.layers.working = Arc::new(Down(LayerKind::Working));
    fx.layers.semantic = Arc::new(Down(LayerKind::Semantic));
    let o = fx.orchestrator();
    let err = o.search_memories("soccer", "u1", 5).await.unwrap_err();
    assert_eq!(err.kind(), "all_layers_unavailable");
}

async fn rich_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.child_profile().await;
    fx.three_turns().await;
    let mut profile = fx.profile.get("u1").await.unwrap();
    for i in 0..150 {
        // distinct vocabulary per fact so none collapse as near-duplicates
        let words: Vec<String> = (0..14).map(|j| format!("f{i}w{j}")).collect();
        profile.facts.push(
            MemoryItem::new("u1", "c0", MemoryType::Fact, format!("{}.", words.join(" ")))
                .with_id(format!("fact-{i:03}")),
        );
    }
    fx.profile.insert(profile).await;
    fx
}

#[tokio::test]
async fn prompts_never_exceed_budget() {
    let fx = rich_fixture().await;
    let o = fx.orchestrator();
    for budget in [300, 450, 700, 1000, 1500, 2500, 4000] {
        for mode in [PromptMode::Full, PromptMode::Minimal] {
            let prompt = o
                .build_prompt(
                    &PromptBuildRequest::new("u1", "c1")
                        .with_query("homework")
                        .with_mode(mode)
                        .with_budget(budget),
                )
                .await
                .unwrap();
            assert!(
                prompt.estimated_tokens <= budget,
                "{mode:?} at {budget}: {}",
                prompt.estimated_tokens
            );
        }
    }

    let err = o
        .build_prompt(&PromptBuildRequest::new("u1", "c1").with_budget(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "budget_unsatisfiable");
}

#[tokio::test]
async fn minimal_prompt_is_much_smaller_than_full() {
    let fx = rich_fixture().await;
    let o = fx.orchestrator();
    let request = PromptBuildRequest::new("u1", "c1")
        .with_query("homework")
        .with_budget(4000);

    let full = o.build_prompt(&request).await.unwrap();
    let minimal = o
        .build_prompt(&request.clone().with_mode(PromptMode::Minimal))
        .await
        .unwrap();

    let ratio = minimal.estimated_tokens as f32 / full.estimated_tokens as f32;
    assert!(ratio <= fx.config.prompt.minimal_ratio_target, "ratio {ratio}");
}

#[tokio::test]
async fn minimal_prompt_ratio_holds_with_little_memory() {
    let fx = Fixture::new();
    fx.child_profile().await;
    fx.three_turns().await;
    let o = fx.orchestrator();
    let request = PromptBuildRequest::new("u1", "c1").with_budget(4000);

    let full = o.build_prompt(&request).await.unwrap();
    let minimal = o
        .build_prompt(&request.clone().with_mode(PromptMode::Minimal))
        .await
        .unwrap();

    let ratio = minimal.estimated_tokens as f32 / full.estimated_tokens as f32;
    assert!(ratio <= fx.config.prompt.minimal_ratio_target, "ratio {ratio}");
    assert!(minimal.uses(Section::Core));
    assert!(minimal.uses(Section::Role));
}

#[tokio::test]
async fn health_flags_down_layers() {
    let mut fx = Fixture::new();
    fx.layers.archive = Arc::new(Down(LayerKind::Archive));
    let report = fx.orchestrator().health().await;
    assert!(!report.is_healthy());
    let archive = report
        .layers
        .iter()
        .find(|l| l.layer == LayerKind::Archive)
        .unwrap();
    assert!(!archive.healthy);
    assert!(archive.error.as_deref().unwrap().contains("connection refused"));
}
