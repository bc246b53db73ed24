//! Prompt template and built-prompt types.

use crate::user::{LanguageTag, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Prompt sections, declared in composition order.
///
/// `CoreCondensed` is not composed on its own: minimal prompts render it in
/// the core slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Core,
    Principles,
    Rules,
    Role,
    Skill,
    Language,
    UserContext,
    MemoryContext,
    CoreCondensed,
}

impl Section {
    pub const ORDER: [Section; 8] = [
        Section::Core,
        Section::Principles,
        Section::Rules,
        Section::Role,
        Section::Skill,
        Section::Language,
        Section::UserContext,
        Section::MemoryContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Principles => "principles",
            Self::Rules => "rules",
            Self::Role => "role",
            Self::Skill => "skills",
            Self::Language => "language",
            Self::UserContext => "user_context",
            Self::MemoryContext => "memory_context",
            Self::CoreCondensed => "core_condensed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ORDER
            .into_iter()
            .chain([Section::CoreCondensed])
            .find(|section| section.as_str() == s || (s == "skill" && *section == Section::Skill))
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key: `(section, role, language, skill)`.
///
/// `None` fields mean "applies to any"; lookups fall back from the most
/// specific key to the bare section.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplateKey {
    pub section: Section,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl TemplateKey {
    pub fn section(section: Section) -> Self {
        Self {
            section,
            role: None,
            language: None,
            skill: None,
        }
    }

    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::section(Section::Role)
        }
    }

    pub fn skill(name: impl Into<String>) -> Self {
        Self {
            skill: Some(name.into()),
            ..Self::section(Section::Skill)
        }
    }

    pub fn language(tag: LanguageTag) -> Self {
        Self {
            language: Some(tag),
            ..Self::section(Section::Language)
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_language(mut self, tag: LanguageTag) -> Self {
        self.language = Some(tag);
        self
    }
}

impl std::fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.section)?;
        if let Some(role) = &self.role {
            write!(f, "/{role}")?;
        }
        if let Some(skill) = &self.skill {
            write!(f, "/{skill}")?;
        }
        if let Some(lang) = &self.language {
            write!(f, "@{lang}")?;
        }
        Ok(())
    }
}

/// A versioned template fragment with `{variable}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub key: TemplateKey,
    pub version: u32,
    pub body: String,
    #[serde(default)]
    pub required_variables: BTreeSet<String>,
    /// Values used when the caller supplies none.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl PromptTemplate {
    pub fn new(key: TemplateKey, body: impl Into<String>) -> Self {
        Self {
            key,
            version: 1,
            body: body.into(),
            required_variables: BTreeSet::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn require<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_variables.extend(variables.into_iter().map(Into::into));
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }
}

/// How much of the template stack to include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Every section; memory gets whatever budget remains.
    #[default]
    Full,
    /// Core, rules, role and a capped memory slice.
    Minimal,
}

impl PromptMode {
    pub fn includes(&self, section: Section) -> bool {
        match self {
            Self::Full => section != Section::CoreCondensed,
            Self::Minimal => matches!(
                section,
                Section::Core
                    | Section::CoreCondensed
                    | Section::Rules
                    | Section::Role
                    | Section::MemoryContext
            ),
        }
    }
}

/// The final system prompt plus build metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub final_text: String,
    /// Sections included, in composition order.
    pub sections_used: Vec<String>,
    /// Σ per-section `ceil(chars / 4)`; never above the requested budget.
    pub estimated_tokens: usize,
    /// Variables supplied to the templates.
    pub variables: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub mode: PromptMode,
    /// Memory layers that were degraded while gathering context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

impl BuiltPrompt {
    pub fn uses(&self, section: Section) -> bool {
        self.sections_used.iter().any(|s| s == section.as_str())
    }
}
