//! # Hearth Core
//!
//! Domain types, traits, and error definitions for the Hearth memory
//! orchestration and prompt assembly engine. Every other crate depends
//! inward on this one.
//!
//! Each memory tier is defined here as a trait; HTTP clients and in-process
//! backends live in `hearth-memory`, so the orchestrator can be tested with
//! doubles and wired to real services through configuration.

pub mod context;
pub mod error;
pub mod layer;
pub mod memory;
pub mod prompt;
pub mod token;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use context::{AssembledContext, RankedItem};
pub use error::{Error, LayerError, Result};
pub use layer::{
    Archive, EmbeddingProvider, HotCache, LayerClient, LayerResult, SearchFilter, SemanticIndex,
    StructuredProfileStore, WorkingMemory,
};
pub use memory::{ConversationKey, LayerKind, MemoryItem, MemoryType};
pub use prompt::{BuiltPrompt, PromptMode, PromptTemplate, Section, TemplateKey};
pub use user::{LanguagePreference, LanguageTag, Role, StructuredProfile, UserContext};
