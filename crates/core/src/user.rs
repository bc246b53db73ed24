//! Who is talking: family role, language preference, active skills.

use crate::memory::MemoryItem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Family role. Each role maps to its own persona template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Grandparent,
    Teenager,
    Child,
    #[default]
    Member,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Parent,
        Role::Grandparent,
        Role::Teenager,
        Role::Child,
        Role::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Grandparent => "grandparent",
            Self::Teenager => "teenager",
            Self::Child => "child",
            Self::Member => "member",
        }
    }

    /// Parse a stored role; anything unrecognized is a plain member.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "parent" => Self::Parent,
            "grandparent" => Self::Grandparent,
            "teenager" | "teen" => Self::Teenager,
            "child" | "kid" => Self::Child,
            _ => Self::Member,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete language fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    #[default]
    En,
    Es,
}

impl LanguageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::En => Self::Es,
            Self::Es => Self::En,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "es" | "spanish" | "español" => Some(Self::Es),
            _ => None,
        }
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language preference stored on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguagePreference {
    En,
    Es,
    /// Spanish-first household that code-switches freely.
    Bilingual,
}

impl LanguagePreference {
    pub fn primary(&self) -> LanguageTag {
        match self {
            Self::En => LanguageTag::En,
            Self::Es | Self::Bilingual => LanguageTag::Es,
        }
    }

    pub fn is_bilingual(&self) -> bool {
        matches!(self, Self::Bilingual)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
            Self::Bilingual => "bilingual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("bilingual") {
            return Some(Self::Bilingual);
        }
        LanguageTag::parse(s).map(Self::from)
    }
}

impl From<LanguageTag> for LanguagePreference {
    fn from(tag: LanguageTag) -> Self {
        match tag {
            LanguageTag::En => Self::En,
            LanguageTag::Es => Self::Es,
        }
    }
}

fn default_privacy_level() -> String {
    "family".into()
}

/// Per-request view of the user. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,

    #[serde(default)]
    pub role: Role,

    pub language_preference: LanguagePreference,

    #[serde(default)]
    pub active_skills: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,

    #[serde(default = "default_privacy_level")]
    pub privacy_level: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role, language: LanguagePreference) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            language_preference: language,
            active_skills: BTreeSet::new(),
            family_id: None,
            age_group: None,
            privacy_level: default_privacy_level(),
        }
    }

    /// Anonymous context used when the profile layer is unavailable.
    pub fn fallback(user_id: impl Into<String>, language: LanguageTag) -> Self {
        Self::new(user_id, Role::Member, language.into())
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_family(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = Some(family_id.into());
        self
    }
}

/// Everything the structured profile store knows about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredProfile {
    pub context: UserContext,

    /// Family relationship facts and stored preferences as memory items.
    #[serde(default)]
    pub facts: Vec<MemoryItem>,

    /// Free-form key/value preferences (tone, verbosity, ...).
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

impl StructuredProfile {
    pub fn new(context: UserContext) -> Self {
        Self {
            context,
            facts: Vec::new(),
            preferences: BTreeMap::new(),
        }
    }
}
