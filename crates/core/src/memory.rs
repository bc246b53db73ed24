//! Memory items and the memory tiers they come from.
//!
//! A [`MemoryItem`] is write-once: its id, content and timestamps never
//! change after it is saved. Only metadata annotations (e.g. `superseded`)
//! may be added later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata key marking an item as replaced by a newer one.
pub const SUPERSEDED: &str = "superseded";

/// Metadata key carrying the speaker of a conversational turn.
pub const SPEAKER: &str = "role";

/// Metadata key naming the preference a `preference` item sets.
pub const PREFERENCE_KEY: &str = "preference_key";

/// The five memory tiers.
///
/// Declaration order is the merge priority order used to break ranking
/// ties: immediate > working > semantic > structured > archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Hot cache of the most recent turns.
    Immediate,
    /// Session-aware working memory.
    Working,
    /// Vector similarity index.
    Semantic,
    /// Relational profile / family facts.
    Structured,
    /// Long-term write-mostly archive.
    Archive,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Immediate,
        LayerKind::Working,
        LayerKind::Semantic,
        LayerKind::Structured,
        LayerKind::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Working => "working",
            Self::Semantic => "semantic",
            Self::Structured => "structured",
            Self::Archive => "archive",
        }
    }

    /// Position in the tie-breaking priority order (0 = highest).
    pub fn priority(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of knowledge an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Context,
    Preference,
    Fact,
}

impl MemoryType {
    /// Preferences and facts are mirrored into the structured profile store.
    pub fn is_profile_data(&self) -> bool {
        matches!(self, Self::Preference | Self::Fact)
    }
}

/// A single memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Globally unique, write-once ID
    pub id: String,

    pub user_id: String,

    pub conversation_id: String,

    #[serde(rename = "type")]
    pub memory_type: MemoryType,

    /// The content of the memory
    pub content: String,

    /// ID of the vector stored for this item in the semantic index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_ref: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Relevance score (set by search operations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl MemoryItem {
    /// Create a new item with a fresh UUID and the current timestamp.
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        memory_type: MemoryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            memory_type,
            content: content.into(),
            embedding_ref: None,
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
            relevance_score: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Add a metadata annotation. The only mutation allowed on a saved item.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn is_superseded(&self) -> bool {
        self.metadata
            .get(SUPERSEDED)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Speaker of a conversational turn (`user`, `assistant`), if recorded.
    pub fn speaker(&self) -> Option<&str> {
        self.metadata.get(SPEAKER).map(String::as_str)
    }

    /// Key used to serialize writes for the same conversation.
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, &self.conversation_id)
    }
}

/// `(user_id, conversation_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl ConversationKey {
    pub fn new(user_id: &str, conversation_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_priority_follows_declaration_order() {
        assert!(LayerKind::Immediate.priority() < LayerKind::Working.priority());
        assert!(LayerKind::Working.priority() < LayerKind::Semantic.priority());
        assert!(LayerKind::Semantic.priority() < LayerKind::Structured.priority());
        assert!(LayerKind::Structured.priority() < LayerKind::Archive.priority());
    }

    #[test]
    fn memory_item_serialization() {
        let mut item = MemoryItem::new("u1", "c1", MemoryType::Preference, "Prefers Spanish at dinner")
            .with_score(0.9);
        item.annotate("source", "profile");
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"type\":\"preference\""));
        assert!(json.contains("Prefers Spanish"));
        let back: MemoryItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn superseded_annotation() {
        let mut item = MemoryItem::new("u1", "c1", MemoryType::Fact, "Lives in Austin");
        assert!(!item.is_superseded());
        item.annotate(SUPERSEDED, "true");
        assert!(item.is_superseded());
    }

    #[test]
    fn fresh_items_get_distinct_ids() {
        let a = MemoryItem::new("u1", "c1", MemoryType::Conversation, "hi");
        let b = MemoryItem::new("u1", "c1", MemoryType::Conversation, "hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.conversation_key(), b.conversation_key());
    }
}
