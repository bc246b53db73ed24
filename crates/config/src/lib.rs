//! Configuration loading, validation, and management for Hearth.
//!
//! Loads configuration from `~/.hearth/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Every tunable of the merge and assembly algorithms (half-lives,
//! similarity threshold, minimal-mode share, timeouts, retries) is an
//! explicit field here with a documented default.

use hearth_core::LayerKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.hearth/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Memory service endpoints
    #[serde(default)]
    pub layers: LayersConfig,

    /// Fan-out, deadline and write-path settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Merge / rank / dedup tunables
    #[serde(default)]
    pub merge: MergeConfig,

    /// Prompt assembly settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

// ── Layers ────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct LayersConfig {
    #[serde(default = "default_hot_cache_url")]
    pub hot_cache_url: String,

    #[serde(default = "default_working_memory_url")]
    pub working_memory_url: String,

    #[serde(default = "default_profile_url")]
    pub profile_url: String,

    #[serde(default = "default_semantic_index_url")]
    pub semantic_index_url: String,

    #[serde(default = "default_archive_url")]
    pub archive_url: String,

    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    /// Bearer token sent to every memory service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Client-level HTTP timeout; per-call deadlines are usually tighter
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_hot_cache_url() -> String {
    "http://127.0.0.1:8701".into()
}
fn default_working_memory_url() -> String {
    "http://127.0.0.1:8702".into()
}
fn default_profile_url() -> String {
    "http://127.0.0.1:8703".into()
}
fn default_semantic_index_url() -> String {
    "http://127.0.0.1:8704".into()
}
fn default_archive_url() -> String {
    "http://127.0.0.1:8705".into()
}
fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".into()
}
fn default_http_timeout_ms() -> u64 {
    5_000
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LayersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayersConfig")
            .field("hot_cache_url", &self.hot_cache_url)
            .field("working_memory_url", &self.working_memory_url)
            .field("profile_url", &self.profile_url)
            .field("semantic_index_url", &self.semantic_index_url)
            .field("archive_url", &self.archive_url)
            .field("embedding_url", &self.embedding_url)
            .field("api_token", &redact(&self.api_token))
            .field("http_timeout_ms", &self.http_timeout_ms)
            .finish()
    }
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            hot_cache_url: default_hot_cache_url(),
            working_memory_url: default_working_memory_url(),
            profile_url: default_profile_url(),
            semantic_index_url: default_semantic_index_url(),
            archive_url: default_archive_url(),
            embedding_url: default_embedding_url(),
            api_token: None,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl LayersConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Independent deadline for each layer call
    #[serde(default = "default_layer_timeout_ms")]
    pub layer_timeout_ms: u64,

    /// Overall deadline for a `get_context` call when the caller gives none
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,

    /// Subtracted from the request deadline before deriving layer deadlines
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,

    /// Recent turns fetched from the hot cache
    #[serde(default = "default_hot_cache_limit")]
    pub hot_cache_limit: usize,

    /// Snippets fetched from working memory
    #[serde(default = "default_working_limit")]
    pub working_limit: usize,

    /// Hits fetched from the semantic index
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// TTL applied to hot-cache writes
    #[serde(default = "default_hot_cache_ttl_secs")]
    pub hot_cache_ttl_secs: u64,

    /// Retries for best-effort background writes
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Backoff cap
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Max wait for, and max hold of, the per-conversation write lock
    #[serde(default = "default_write_lock_timeout_ms")]
    pub write_lock_timeout_ms: u64,
}

fn default_layer_timeout_ms() -> u64 {
    500
}
fn default_request_deadline_ms() -> u64 {
    1_500
}
fn default_safety_margin_ms() -> u64 {
    50
}
fn default_hot_cache_limit() -> usize {
    20
}
fn default_working_limit() -> usize {
    5
}
fn default_semantic_top_k() -> usize {
    5
}
fn default_hot_cache_ttl_secs() -> u64 {
    3_600
}
fn default_write_retries() -> u32 {
    1
}
fn default_retry_base_delay_ms() -> u64 {
    250
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}
fn default_write_lock_timeout_ms() -> u64 {
    2_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            layer_timeout_ms: default_layer_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
            safety_margin_ms: default_safety_margin_ms(),
            hot_cache_limit: default_hot_cache_limit(),
            working_limit: default_working_limit(),
            semantic_top_k: default_semantic_top_k(),
            hot_cache_ttl_secs: default_hot_cache_ttl_secs(),
            write_retries: default_write_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            write_lock_timeout_ms: default_write_lock_timeout_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn layer_timeout(&self) -> Duration {
        Duration::from_millis(self.layer_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    pub fn hot_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_cache_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn write_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.write_lock_timeout_ms)
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Recency half-life for hot-cache turns (`None` = no decay)
    #[serde(default = "default_session_half_life", skip_serializing_if = "Option::is_none")]
    pub immediate_half_life_hours: Option<f64>,

    #[serde(default = "default_session_half_life", skip_serializing_if = "Option::is_none")]
    pub working_half_life_hours: Option<f64>,

    #[serde(default = "default_semantic_half_life", skip_serializing_if = "Option::is_none")]
    pub semantic_half_life_hours: Option<f64>,

    /// Structured facts do not decay by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_half_life_hours: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_half_life_hours: Option<f64>,

    /// Token-set Jaccard similarity at which two items are duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Relevance assumed for items without a score
    #[serde(default = "default_relevance")]
    pub default_relevance: f32,

    /// Relevance assumed for unscored hot-cache turns
    #[serde(default = "default_immediate_relevance")]
    pub immediate_relevance: f32,
}

fn default_session_half_life() -> Option<f64> {
    Some(24.0)
}
fn default_semantic_half_life() -> Option<f64> {
    Some(24.0 * 7.0)
}
fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_relevance() -> f32 {
    0.5
}
fn default_immediate_relevance() -> f32 {
    1.0
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            immediate_half_life_hours: default_session_half_life(),
            working_half_life_hours: default_session_half_life(),
            semantic_half_life_hours: default_semantic_half_life(),
            structured_half_life_hours: None,
            archive_half_life_hours: None,
            similarity_threshold: default_similarity_threshold(),
            default_relevance: default_relevance(),
            immediate_relevance: default_immediate_relevance(),
        }
    }
}

impl MergeConfig {
    /// Recency half-life for a layer, `None` when the layer does not decay.
    pub fn half_life(&self, layer: LayerKind) -> Option<Duration> {
        let hours = match layer {
            LayerKind::Immediate => self.immediate_half_life_hours,
            LayerKind::Working => self.working_half_life_hours,
            LayerKind::Semantic => self.semantic_half_life_hours,
            LayerKind::Structured => self.structured_half_life_hours,
            LayerKind::Archive => self.archive_half_life_hours,
        }?;
        Some(Duration::from_secs_f64(hours * 3_600.0))
    }
}

// ── Prompt ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Token budget used when the caller does not give one
    #[serde(default = "default_budget")]
    pub default_budget: usize,

    /// Share of the budget given to memory context in minimal mode
    #[serde(default = "default_minimal_memory_share")]
    pub minimal_memory_share: f32,

    /// Upper bound on the minimal/full token ratio; minimal memory is capped
    /// to stay under it
    #[serde(default = "default_minimal_ratio_target")]
    pub minimal_ratio_target: f32,

    /// Directory of markdown templates overriding the built-in set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    /// Language assumed when the profile is unavailable
    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Recent turns rendered into the memory context
    #[serde(default = "default_max_recent_turns")]
    pub max_recent_turns: usize,
}

fn default_budget() -> usize {
    4_000
}
fn default_minimal_memory_share() -> f32 {
    0.10
}
fn default_minimal_ratio_target() -> f32 {
    0.35
}
fn default_language() -> String {
    "en".into()
}
fn default_assistant_name() -> String {
    "Hearth".into()
}
fn default_max_recent_turns() -> usize {
    5
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
            minimal_memory_share: default_minimal_memory_share(),
            minimal_ratio_target: default_minimal_ratio_target(),
            templates_dir: None,
            default_language: default_language(),
            assistant_name: default_assistant_name(),
            max_recent_turns: default_max_recent_turns(),
        }
    }
}

impl PromptConfig {
    pub fn default_language_tag(&self) -> hearth_core::LanguageTag {
        hearth_core::LanguageTag::parse(&self.default_language).unwrap_or_default()
    }
}

// ── Embedding ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Fixed vector dimension; responses of any other size are rejected
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_dimension() -> usize {
    768
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_dimension(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.hearth/config.toml),
    /// then apply `HEARTH_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let urls: [(&str, &mut String); 6] = [
            ("HEARTH_HOT_CACHE_URL", &mut self.layers.hot_cache_url),
            ("HEARTH_WORKING_MEMORY_URL", &mut self.layers.working_memory_url),
            ("HEARTH_PROFILE_URL", &mut self.layers.profile_url),
            ("HEARTH_SEMANTIC_INDEX_URL", &mut self.layers.semantic_index_url),
            ("HEARTH_ARCHIVE_URL", &mut self.layers.archive_url),
            ("HEARTH_EMBEDDING_URL", &mut self.layers.embedding_url),
        ];
        for (name, slot) in urls {
            if let Some(value) = lookup(name) {
                *slot = value;
            }
        }

        if let Some(token) = lookup("HEARTH_API_TOKEN") {
            self.layers.api_token = Some(token);
        }

        if let Some(ms) = lookup("HEARTH_LAYER_TIMEOUT_MS") {
            match ms.parse() {
                Ok(ms) => self.orchestrator.layer_timeout_ms = ms,
                Err(_) => tracing::warn!(value = %ms, "Ignoring invalid HEARTH_LAYER_TIMEOUT_MS"),
            }
        }

        if let Some(dir) = lookup("HEARTH_TEMPLATES_DIR") {
            self.prompt.templates_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hearth")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.merge;
        if !(m.similarity_threshold > 0.0 && m.similarity_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "merge.similarity_threshold must be in (0, 1]".into(),
            ));
        }
        for layer in LayerKind::ALL {
            if let Some(half_life) = m.half_life(layer) {
                if half_life.is_zero() {
                    return Err(ConfigError::ValidationError(format!(
                        "merge.{layer}_half_life_hours must be > 0"
                    )));
                }
            }
        }
        if m.default_relevance < 0.0 || m.immediate_relevance < 0.0 {
            return Err(ConfigError::ValidationError(
                "merge relevance defaults must be >= 0".into(),
            ));
        }

        let p = &self.prompt;
        if !(p.minimal_memory_share > 0.0 && p.minimal_memory_share < 1.0) {
            return Err(ConfigError::ValidationError(
                "prompt.minimal_memory_share must be in (0, 1)".into(),
            ));
        }
        if !(p.minimal_ratio_target > 0.0 && p.minimal_ratio_target <= 1.0) {
            return Err(ConfigError::ValidationError(
                "prompt.minimal_ratio_target must be in (0, 1]".into(),
            ));
        }
        if p.default_budget == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.default_budget must be > 0".into(),
            ));
        }
        if hearth_core::LanguageTag::parse(&p.default_language).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "prompt.default_language '{}' is not a supported language",
                p.default_language
            )));
        }

        let o = &self.orchestrator;
        if o.layer_timeout_ms == 0 || o.write_lock_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator timeouts must be > 0".into(),
            ));
        }
        if o.safety_margin_ms >= o.request_deadline_ms {
            return Err(ConfigError::ValidationError(
                "orchestrator.safety_margin_ms must be below request_deadline_ms".into(),
            ));
        }
        if o.retry_base_delay_ms > o.retry_max_delay_ms {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Render this configuration as TOML (secrets included as stored).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for hearth_core::Error {
    fn from(e: ConfigError) -> Self {
        hearth_core::Error::Config {
            message: e.to_string(),
        }
    }
}
