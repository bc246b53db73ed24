//! The set of layer clients an orchestrator talks to.

use hearth_config::AppConfig;
use hearth_core::{
    Archive, EmbeddingProvider, HotCache, LayerClient, LayerResult, SemanticIndex,
    StructuredProfileStore, WorkingMemory,
};
use hearth_memory::{
    HashEmbedder, HttpArchive, HttpEmbedder, HttpHotCache, HttpProfileStore, HttpSemanticIndex,
    HttpWorkingMemory, InMemoryArchive, InMemoryHotCache, InMemoryProfileStore,
    InMemorySemanticIndex, InMemoryWorkingMemory,
};
use std::sync::Arc;
use tracing::info;

/// One client per memory tier plus the embedder.
#[derive(Clone)]
pub struct Layers {
    pub hot_cache: Arc<dyn HotCache>,
    pub working: Arc<dyn WorkingMemory>,
    pub profile: Arc<dyn StructuredProfileStore>,
    pub semantic: Arc<dyn SemanticIndex>,
    pub archive: Arc<dyn Archive>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl Layers {
    /// HTTP clients for the services named in `config.layers`.
    pub fn http(config: &AppConfig) -> LayerResult<Self> {
        let l = &config.layers;
        let timeout = l.http_timeout();
        let token = l.api_token.clone();

        info!(
            hot_cache = %l.hot_cache_url,
            working = %l.working_memory_url,
            profile = %l.profile_url,
            semantic = %l.semantic_index_url,
            archive = %l.archive_url,
            embedding = %l.embedding_url,
            "Using HTTP memory layers"
        );

        Ok(Self {
            hot_cache: Arc::new(HttpHotCache::new(&l.hot_cache_url, timeout, token.clone())?),
            working: Arc::new(HttpWorkingMemory::new(&l.working_memory_url, timeout, token.clone())?),
            profile: Arc::new(HttpProfileStore::new(&l.profile_url, timeout, token.clone())?),
            semantic: Arc::new(HttpSemanticIndex::new(&l.semantic_index_url, timeout, token.clone())?),
            archive: Arc::new(HttpArchive::new(&l.archive_url, timeout, token.clone())?),
            embedder: Arc::new(HttpEmbedder::new(
                &l.embedding_url,
                config.embedding.model.clone(),
                config.embedding.dimension,
                timeout,
                token,
            )?),
        })
    }

    /// In-process backends with a hashing embedder.
    pub fn in_memory(config: &AppConfig) -> Self {
        info!("Using in-process memory layers");
        Self {
            hot_cache: Arc::new(InMemoryHotCache::new()),
            working: Arc::new(InMemoryWorkingMemory::new()),
            profile: Arc::new(InMemoryProfileStore::with_default_language(
                config.prompt.default_language_tag(),
            )),
            semantic: Arc::new(InMemorySemanticIndex::new()),
            archive: Arc::new(InMemoryArchive::new()),
            embedder: Arc::new(HashEmbedder::new(config.embedding.dimension)),
        }
    }

    /// Every tier as a plain [`LayerClient`], in priority order.
    pub fn clients(&self) -> Vec<Arc<dyn LayerClient>> {
        vec![
            self.hot_cache.clone() as Arc<dyn LayerClient>,
            self.working.clone() as Arc<dyn LayerClient>,
            self.semantic.clone() as Arc<dyn LayerClient>,
            self.profile.clone() as Arc<dyn LayerClient>,
            self.archive.clone() as Arc<dyn LayerClient>,
        ]
    }
}
