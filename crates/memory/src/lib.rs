//! Memory tiers for Hearth.
//!
//! - HTTP clients for the five memory services plus the embedding service
//! - In-process backends implementing the same traits
//! - [`MemoryMerger`]: dedup, recency-weighted ranking and budget truncation

pub mod archive;
pub mod embedding;
pub mod hot_cache;
pub mod http;
pub mod in_memory;
pub mod merge;
pub mod profile;
pub mod semantic;
pub mod vector;
pub mod working;

pub use archive::HttpArchive;
pub use embedding::{HashEmbedder, HttpEmbedder};
pub use hot_cache::HttpHotCache;
pub use http::HttpLayer;
pub use in_memory::{
    InMemoryArchive, InMemoryHotCache, InMemoryProfileStore, InMemorySemanticIndex,
    InMemoryWorkingMemory,
};
pub use merge::{LayerBatch, MemoryMerger};
pub use profile::HttpProfileStore;
pub use semantic::HttpSemanticIndex;
pub use vector::{cosine_similarity, hash_embedding, vector_search};
pub use working::HttpWorkingMemory;
