//! Error types for the Hearth domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Per-layer failures
//! (`LayerError`) are transient and get downgraded to a `degraded` marker by
//! the orchestrator; everything in [`Error`] besides `Layer` is surfaced to
//! the caller.

use crate::memory::LayerKind;
use std::collections::BTreeMap;
use thiserror::Error;

/// The top-level error type for all Hearth operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Layer errors ---
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("All memory layers unavailable ({})", describe_failures(.failures))]
    AllLayersUnavailable { failures: BTreeMap<LayerKind, String> },

    // --- Template / assembly errors ---
    #[error("Core template is missing from the template registry")]
    MissingCoreTemplate,

    #[error("Template '{template}' requires variable '{variable}' but no value or default was supplied")]
    MissingVariable { template: String, variable: String },

    #[error("Prompt needs {required} tokens even after trimming, budget is {budget}")]
    BudgetUnsatisfiable { required: usize, budget: usize },

    // --- Write path ---
    #[error("Timed out after {waited_ms}ms waiting for write lock on {key}")]
    WriteLockTimeout { key: String, waited_ms: u64 },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable taxonomy tag for upstream handling and log aggregation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Layer(e) => e.kind(),
            Self::AllLayersUnavailable { .. } => "all_layers_unavailable",
            Self::MissingCoreTemplate => "missing_core_template",
            Self::MissingVariable { .. } => "missing_variable",
            Self::BudgetUnsatisfiable { .. } => "budget_unsatisfiable",
            Self::WriteLockTimeout { .. } => "write_lock_timeout",
            Self::Config { .. } => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// Misconfiguration errors that must never be retried.
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Self::MissingCoreTemplate
                | Self::MissingVariable { .. }
                | Self::BudgetUnsatisfiable { .. }
                | Self::Config { .. }
        )
    }
}

fn describe_failures(failures: &BTreeMap<LayerKind, String>) -> String {
    failures
        .iter()
        .map(|(layer, reason)| format!("{layer}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single memory layer call.
#[derive(Debug, Clone, Error)]
pub enum LayerError {
    #[error("{layer} layer timed out after {after_ms}ms")]
    Timeout { layer: LayerKind, after_ms: u64 },

    #[error("{layer} layer unavailable: {reason}")]
    Unavailable { layer: LayerKind, reason: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailure(String),

    #[error("{layer} layer returned an invalid response: {reason}")]
    InvalidResponse { layer: LayerKind, reason: String },
}

impl LayerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "layer_timeout",
            Self::Unavailable { .. } => "layer_unavailable",
            Self::EmbeddingFailure(_) => "embedding_failure",
            Self::InvalidResponse { .. } => "layer_invalid_response",
        }
    }

    pub fn unavailable(layer: LayerKind, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            layer,
            reason: reason.into(),
        }
    }
}
