//! # Hearth Orchestrator
//!
//! [`MemoryOrchestrator`] is the entry point most callers need: it gathers
//! context from every memory tier under per-layer deadlines, persists new
//! items with per-conversation write serialization, and builds the final
//! system prompt.

pub mod layers;
pub mod orchestrator;
pub mod retry;
pub mod single_flight;

pub use layers::Layers;
pub use orchestrator::{
    GetContextRequest, HealthReport, LayerHealth, MemoryOrchestrator, PromptBuildRequest,
    template_store,
};
pub use retry::{RetryPolicy, with_deadline};
pub use single_flight::{KeyedGuard, KeyedLocks};
