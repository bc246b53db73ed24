//! MemoryOrchestrator: the façade over memory tiers, merger and assembler.
//!
//! Read path: fan out to the hot cache, working memory, profile store and
//! (with a query) the semantic index concurrently, each under its own
//! deadline. A failed layer is recorded in `degraded`; only when every
//! consulted layer fails does the call fail.
//!
//! Write path: the hot-cache write happens under a per-conversation lock and
//! must succeed. Everything else is written behind on detached tasks with
//! bounded retry, so a cancelled caller never loses a write.

use crate::layers::Layers;
use crate::retry::{RetryPolicy, with_deadline};
use crate::single_flight::KeyedLocks;
use chrono::{DateTime, Utc};
use hearth_config::{AppConfig, OrchestratorConfig, PromptConfig};
use hearth_core::memory::PREFERENCE_KEY;
use hearth_core::{
    AssembledContext, BuiltPrompt, Error, LanguageTag, LayerKind, LayerResult, MemoryItem, MemoryType,
    PromptMode, Result, SearchFilter, UserContext,
};
use hearth_memory::{LayerBatch, MemoryMerger};
use hearth_prompt::{DirectorySource, PromptAssembler, TemplateStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ── Requests ──────────────────────────────────────────────────────────────

/// Input to [`MemoryOrchestrator::get_context`].
#[derive(Debug, Clone, Default)]
pub struct GetContextRequest {
    pub user_id: String,
    pub conversation_id: String,
    /// Drives working-memory search and the semantic lookup.
    pub query: Option<String>,
    /// Token budget for merged memory; `None` uses the prompt default.
    pub budget: Option<usize>,
    /// Overall deadline; `None` uses the configured request deadline.
    pub deadline: Option<Duration>,
}

impl GetContextRequest {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Input to [`MemoryOrchestrator::build_prompt`].
#[derive(Debug, Clone, Default)]
pub struct PromptBuildRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub query: Option<String>,
    pub mode: PromptMode,
    /// Token budget for the whole prompt; `None` uses the prompt default.
    pub budget: Option<usize>,
    pub deadline: Option<Duration>,
}

impl PromptBuildRequest {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LayerHealth {
    pub layer: LayerKind,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Reachability of every tier.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub layers: Vec<LayerHealth>,
    pub embedder: String,
    pub templates: String,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.layers.iter().all(|l| l.healthy)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────

pub struct MemoryOrchestrator {
    layers: Layers,
    merger: MemoryMerger,
    assembler: PromptAssembler,
    config: OrchestratorConfig,
    locks: KeyedLocks,
    retry: RetryPolicy,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    clock: Clock,
}

/// Template store for `config`: the directory layered over the built-ins,
/// or the built-ins alone.
pub fn template_store(config: &PromptConfig) -> Result<TemplateStore> {
    match &config.templates_dir {
        Some(dir) => TemplateStore::new(DirectorySource::layered(dir.clone())),
        None => Ok(TemplateStore::builtin()),
    }
}

impl MemoryOrchestrator {
    pub fn new(layers: Layers, templates: Arc<TemplateStore>, config: &AppConfig) -> Self {
        Self {
            layers,
            merger: MemoryMerger::new(config.merge.clone()),
            assembler: PromptAssembler::new(templates, config.prompt.clone()),
            config: config.orchestrator.clone(),
            locks: KeyedLocks::new(),
            retry: RetryPolicy::from_config(&config.orchestrator),
            pending: Arc::new(Mutex::new(Vec::new())),
            clock: Arc::new(Utc::now),
        }
    }

    /// Wire layers and templates from configuration. `offline` selects the
    /// in-process backends instead of the HTTP services.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self> {
        let templates = Arc::new(template_store(&config.prompt)?);
        let layers = if offline {
            Layers::in_memory(config)
        } else {
            Layers::http(config)?
        };
        Ok(Self::new(layers, templates, config))
    }

    /// Replace the clock used for recency weighting.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        self.assembler.store()
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    /// Background writes not yet awaited by [`flush`](Self::flush).
    pub fn pending_writes(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.len()
    }

    fn default_language(&self) -> LanguageTag {
        self.assembler.config().default_language_tag()
    }

    fn default_budget(&self) -> usize {
        self.assembler.config().default_budget
    }

    /// Per-layer timeout: the layer timeout, shortened to fit the request
    /// deadline minus the safety margin.
    fn layer_timeout(&self, deadline: Option<Duration>) -> Duration {
        let deadline = deadline.unwrap_or_else(|| self.config.request_deadline());
        self.config
            .layer_timeout()
            .min(deadline.saturating_sub(self.config.safety_margin()))
    }

    async fn semantic_search(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
    ) -> LayerResult<Vec<MemoryItem>> {
        let vector = self.layers.embedder.embed(query).await?;
        self.layers
            .semantic
            .search(&vector, &SearchFilter::for_user(user_id), top_k)
            .await
    }

    // ── Read path ──────────────────────────────────────────────────────────

    /// Gather and merge context from every readable tier.
    ///
    /// # Errors
    ///
    /// [`Error::AllLayersUnavailable`] when every consulted layer failed.
    pub async fn get_context(&self, request: &GetContextRequest) -> Result<AssembledContext> {
        let started = Instant::now();
        let timeout = self.layer_timeout(request.deadline);
        let user_id = request.user_id.as_str();
        let query = request
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());

        let hot = observe(
            LayerKind::Immediate,
            timeout,
            self.layers.hot_cache.recent(
                user_id,
                &request.conversation_id,
                self.config.hot_cache_limit,
            ),
        );
        let working = observe(
            LayerKind::Working,
            timeout,
            self.layers
                .working
                .search(user_id, query.unwrap_or(""), self.config.working_limit),
        );
        let profile = observe(LayerKind::Structured, timeout, self.layers.profile.load(user_id));
        let semantic = async {
            match query {
                Some(q) => Some(
                    observe(
                        LayerKind::Semantic,
                        timeout,
                        self.semantic_search(user_id, q, self.config.semantic_top_k),
                    )
                    .await,
                ),
                None => None,
            }
        };

        let (hot, working, profile, semantic) = tokio::join!(hot, working, profile, semantic);

        let mut failures = BTreeMap::new();
        let mut batches = Vec::new();
        let consulted = if semantic.is_some() { 4 } else { 3 };

        match hot {
            Ok(items) => batches.push(LayerBatch::new(LayerKind::Immediate, items)),
            Err(e) => {
                failures.insert(LayerKind::Immediate, e.to_string());
            }
        }
        match working {
            Ok(items) => batches.push(LayerBatch::new(LayerKind::Working, items)),
            Err(e) => {
                failures.insert(LayerKind::Working, e.to_string());
            }
        }
        match semantic {
            Some(Ok(items)) => batches.push(LayerBatch::new(LayerKind::Semantic, items)),
            Some(Err(e)) => {
                failures.insert(LayerKind::Semantic, e.to_string());
            }
            None => {}
        }
        let (user, preferences) = match profile {
            Ok(profile) => {
                // Keyed preferences are carried in the map.
                let facts = profile
                    .facts
                    .into_iter()
                    .filter(|f| {
                        !(f.memory_type == MemoryType::Preference
                            && f.metadata.contains_key(PREFERENCE_KEY))
                    })
                    .collect();
                batches.push(LayerBatch::new(LayerKind::Structured, facts));
                (profile.context, profile.preferences)
            }
            Err(e) => {
                failures.insert(LayerKind::Structured, e.to_string());
                (
                    UserContext::fallback(user_id, self.default_language()),
                    BTreeMap::new(),
                )
            }
        };

        if failures.len() == consulted {
            warn!(
                user_id,
                conversation_id = %request.conversation_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "All memory layers unavailable"
            );
            return Err(Error::AllLayersUnavailable { failures });
        }

        let mut base = AssembledContext::empty(user);
        base.preferences = preferences;
        for (layer, reason) in failures {
            base.mark_degraded(layer, reason);
        }

        let budget = request.budget.unwrap_or_else(|| self.default_budget());
        let ctx = self.merger.assemble(base, batches, Some(budget), (self.clock)());

        debug!(
            user_id,
            conversation_id = %request.conversation_id,
            items = ctx.ranked.len(),
            degraded = ?ctx.degraded_names(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Context assembled"
        );
        Ok(ctx)
    }

    /// Working memory and semantic hits for `query`, deduplicated and sorted
    /// by relevance.
    ///
    /// # Errors
    ///
    /// [`Error::AllLayersUnavailable`] when both layers failed.
    pub async fn search_memories(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>> {
        let timeout = self.layer_timeout(None);
        let query = query.trim();

        let working = observe(
            LayerKind::Working,
            timeout,
            self.layers.working.search(user_id, query, limit),
        );
        let semantic = async {
            if query.is_empty() {
                None
            } else {
                Some(
                    observe(
                        LayerKind::Semantic,
                        timeout,
                        self.semantic_search(user_id, query, limit),
                    )
                    .await,
                )
            }
        };
        let (working, semantic) = tokio::join!(working, semantic);

        let mut failures = BTreeMap::new();
        let mut batches = Vec::new();
        let consulted = if semantic.is_some() { 2 } else { 1 };

        match working {
            Ok(items) => batches.push(LayerBatch::new(LayerKind::Working, items)),
            Err(e) => {
                failures.insert(LayerKind::Working, e.to_string());
            }
        }
        match semantic {
            Some(Ok(items)) => batches.push(LayerBatch::new(LayerKind::Semantic, items)),
            Some(Err(e)) => {
                failures.insert(LayerKind::Semantic, e.to_string());
            }
            None => {}
        }

        if failures.len() == consulted {
            return Err(Error::AllLayersUnavailable { failures });
        }
        Ok(self.merger.dedup_and_sort(batches, limit))
    }

    /// Gather context and assemble the system prompt.
    ///
    /// When every layer is down the prompt is still built, from the fallback
    /// user and no memory, with a warning.
    pub async fn build_prompt(&self, request: &PromptBuildRequest) -> Result<BuiltPrompt> {
        let budget = request.budget.unwrap_or_else(|| self.default_budget());
        let ctx_request = GetContextRequest {
            user_id: request.user_id.clone(),
            conversation_id: request.conversation_id.clone(),
            query: request.query.clone(),
            budget: Some(budget),
            deadline: request.deadline,
        };

        let (ctx, fallback) = match self.get_context(&ctx_request).await {
            Ok(ctx) => (ctx, None),
            Err(Error::AllLayersUnavailable { failures }) => {
                warn!(user_id = %request.user_id, "Building core-only prompt without memory");
                let mut ctx = AssembledContext::empty(UserContext::fallback(
                    request.user_id.as_str(),
                    self.default_language(),
                ));
                for (layer, reason) in failures {
                    ctx.mark_degraded(layer, reason);
                }
                (ctx, Some("all memory layers unavailable; built without memory".to_string()))
            }
            Err(e) => return Err(e),
        };

        let mut prompt = self.assembler.build(
            &ctx.structured,
            &ctx,
            request.mode,
            budget,
            request.query.as_deref(),
        )?;
        if let Some(warning) = fallback {
            prompt.warnings.insert(0, warning);
        }
        Ok(prompt)
    }

    // ── Write path ─────────────────────────────────────────────────────────

    /// Persist one item.
    ///
    /// Returns once the hot cache holds it. The other tiers are written in
    /// the background; their failures are logged, never returned.
    ///
    /// # Errors
    ///
    /// - [`Error::WriteLockTimeout`] when the conversation lock is not
    ///   acquired in time
    /// - [`Error::Layer`] when the hot-cache write fails or times out
    pub async fn save_context(&self, item: MemoryItem) -> Result<()> {
        let key = item.conversation_key();
        let lock_timeout = self.config.write_lock_timeout();
        let _guard = self.locks.acquire(&key, lock_timeout).await?;

        with_deadline(
            LayerKind::Immediate,
            lock_timeout,
            self.layers.hot_cache.put(&item, self.config.hot_cache_ttl()),
        )
        .await?;

        debug!(item_id = %item.id, key = %key, "Saved to hot cache");
        self.dispatch(item);
        Ok(())
    }

    fn dispatch(&self, item: MemoryItem) {
        let handle = tokio::spawn(write_behind(self.layers.clone(), self.retry, item));
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every background write dispatched so far.
    pub async fn flush(&self) {
        loop {
            let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    warn!(error = %e, "Background write task failed to complete");
                }
            }
        }
    }

    // ── Operations ─────────────────────────────────────────────────────────

    /// Probe every tier concurrently.
    pub async fn health(&self) -> HealthReport {
        let timeout = self.config.layer_timeout();
        let probes = self.layers.clients().into_iter().map(|client| async move {
            let started = Instant::now();
            let layer = client.layer();
            let result = with_deadline(layer, timeout, client.health()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match result {
                Ok(healthy) => LayerHealth {
                    layer,
                    healthy,
                    error: None,
                    elapsed_ms,
                },
                Err(e) => LayerHealth {
                    layer,
                    healthy: false,
                    error: Some(e.to_string()),
                    elapsed_ms,
                },
            }
        });
        let layers = futures::future::join_all(probes).await;

        HealthReport {
            layers,
            embedder: self.layers.embedder.name().to_string(),
            templates: self.templates().describe_source(),
        }
    }

    /// Re-read templates from their source. Returns the template count.
    pub fn reload_templates(&self) -> Result<usize> {
        self.templates().reload()
    }
}

/// Bound a layer call by `timeout` and log the outcome.
async fn observe<T, F>(layer: LayerKind, timeout: Duration, fut: F) -> LayerResult<T>
where
    F: Future<Output = LayerResult<T>>,
{
    let started = Instant::now();
    let result = with_deadline(layer, timeout, fut).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => debug!(layer = %layer, elapsed_ms, "Layer responded"),
        Err(e) => warn!(layer = %layer, elapsed_ms, error = %e, "Layer degraded"),
    }
    result
}

/// Best-effort writes to every tier but the hot cache.
async fn write_behind(layers: Layers, retry: RetryPolicy, item: MemoryItem) {
    let working = retry.run(LayerKind::Working, || layers.working.add(&item));

    let structured = async {
        if item.memory_type.is_profile_data() {
            Some(
                retry
                    .run(LayerKind::Structured, || {
                        layers.profile.update_preferences(&item.user_id, &item)
                    })
                    .await,
            )
        } else {
            None
        }
    };

    let semantic = async {
        let vector = match retry
            .run(LayerKind::Semantic, || layers.embedder.embed(&item.content))
            .await
        {
            Ok(vector) => vector,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Embedding failed, skipping semantic write");
                return None;
            }
        };
        Some(
            retry
                .run(LayerKind::Semantic, || layers.semantic.upsert(&vector, &item))
                .await,
        )
    };

    let archive = retry.run(LayerKind::Archive, || layers.archive.append(&item));

    let (working, structured, semantic, archive) =
        tokio::join!(working, structured, semantic, archive);

    for (layer, result) in [
        (LayerKind::Working, Some(working)),
        (LayerKind::Structured, structured),
        (LayerKind::Semantic, semantic),
        (LayerKind::Archive, Some(archive)),
    ] {
        match result {
            Some(Ok(())) => debug!(layer = %layer, item_id = %item.id, "Background write done"),
            Some(Err(e)) => warn!(layer = %layer, item_id = %item.id, error = %e, "Background write failed"),
            None => {}
        }
    }
}
