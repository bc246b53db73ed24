//! Versioned template registry.
//!
//! Templates come from a [`TemplateSource`] (built-in defaults or a
//! directory of markdown files) and are resolved with fallback:
//!
//! ```text
//! (section, role, language, skill) → (section, role) → (section, language) → (section)
//! ```
//!
//! A skill name identifies its template, so it is kept at every fallback
//! step for skill keys.
//!
//! # Directory layout
//!
//! ```text
//! core.md                  principles.md       rules.md
//! user_context.md          memory_context.md
//! roles/child.md           roles/child.es.md
//! skills/homework.md       languages/es.md
//! ```
//!
//! A file named `<name>.<lang>.md` is the language-specific variant.
//! Files may start with TOML front matter:
//!
//! ```text
//! +++
//! version = 2
//! required = ["assistant_name"]
//! [defaults]
//! assistant_name = "Hearth"
//! +++
//! ```

use crate::builtin;
use hearth_core::{Error, LanguageTag, PromptTemplate, Result, Role, Section, TemplateKey};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Where templates come from.
pub trait TemplateSource: Send + Sync {
    /// Human-readable origin, for logs and `hearth templates`.
    fn describe(&self) -> String;

    /// Read every template.
    fn load_all(&self) -> Result<Vec<PromptTemplate>>;

    /// Latest version the source holds for an exact key, if it can tell
    /// cheaply. `None` means "unknown"; such entries only change on reload.
    fn version(&self, _key: &TemplateKey) -> Option<u32> {
        None
    }

    /// Fetch one template by exact key.
    fn fetch(&self, key: &TemplateKey) -> Result<Option<PromptTemplate>> {
        Ok(self.load_all()?.into_iter().find(|t| &t.key == key))
    }
}

// ── Static source ─────────────────────────────────────────────────────────

/// In-memory templates that can be updated at runtime.
#[derive(Clone, Default)]
pub struct StaticSource {
    templates: Arc<RwLock<BTreeMap<TemplateKey, PromptTemplate>>>,
}

impl StaticSource {
    pub fn new(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        let map = templates.into_iter().map(|t| (t.key.clone(), t)).collect();
        Self {
            templates: Arc::new(RwLock::new(map)),
        }
    }

    /// The built-in default template set.
    pub fn builtin() -> Self {
        Self::new(builtin::templates())
    }

    /// Insert or replace a template.
    pub fn upsert(&self, template: PromptTemplate) {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(template.key.clone(), template);
    }

    pub fn remove(&self, key: &TemplateKey) {
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

impl TemplateSource for StaticSource {
    fn describe(&self) -> String {
        "built-in".into()
    }

    fn load_all(&self) -> Result<Vec<PromptTemplate>> {
        Ok(self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    fn version(&self, key: &TemplateKey) -> Option<u32> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|t| t.version)
    }

    fn fetch(&self, key: &TemplateKey) -> Result<Option<PromptTemplate>> {
        Ok(self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

// ── Directory source ──────────────────────────────────────────────────────

/// Markdown templates on disk, optionally layered over the built-ins.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    with_builtin: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    defaults: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}

impl DirectorySource {
    /// Only the files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            with_builtin: false,
        }
    }

    /// Files under `root` override the built-in defaults key by key.
    pub fn layered(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            with_builtin: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir(&self, dir: &Path, out: &mut Vec<PromptTemplate>) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::Config {
            message: format!("cannot read template directory {}: {e}", dir.display()),
        })?;

        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(key) = self.key_for(&path) else {
                warn!(path = %path.display(), "Skipping template with unrecognized name");
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|e| Error::Config {
                message: format!("cannot read template {}: {e}", path.display()),
            })?;
            let template = parse_template_file(key, &text).map_err(|message| Error::Config {
                message: format!("{}: {message}", path.display()),
            })?;
            debug!(path = %path.display(), key = %template.key, version = template.version, "Loaded template");
            out.push(template);
        }
        Ok(())
    }

    /// Map a path under `root` to its registry key.
    fn key_for(&self, path: &Path) -> Option<TemplateKey> {
        let file = path.file_name()?.to_str()?.strip_suffix(".md")?;
        let (name, language) = match file.rsplit_once('.') {
            Some((name, lang)) => (name, Some(LanguageTag::parse(lang)?)),
            None => (file, None),
        };

        let parent = path.parent()?;
        let dir = if parent == self.root {
            None
        } else {
            Some(parent.file_name()?.to_str()?)
        };

        let mut key = match dir {
            None => TemplateKey::section(Section::parse(name)?),
            Some("roles") => {
                let role = Role::ALL.into_iter().find(|r| r.as_str() == name)?;
                TemplateKey::role(role)
            }
            Some("skills") => TemplateKey::skill(name),
            Some("languages") => {
                // languages/<lang>.md
                return match language {
                    None => LanguageTag::parse(name).map(TemplateKey::language),
                    Some(_) => None,
                };
            }
            Some(_) => return None,
        };
        key.language = language;
        Some(key)
    }
}

/// Split optional `+++` front matter from the body.
fn parse_template_file(key: TemplateKey, text: &str) -> std::result::Result<PromptTemplate, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (front, body) = match text.strip_prefix("+++") {
        Some(rest) => {
            let rest = rest.trim_start_matches([' ', '\t']);
            let rest = rest
                .strip_prefix("\r\n")
                .or_else(|| rest.strip_prefix('\n'))
                .ok_or("front matter opener must be on its own line")?;
            let end = rest
                .find("\n+++")
                .ok_or("unterminated front matter (missing closing +++)")?;
            let front: FrontMatter =
                toml::from_str(&rest[..end]).map_err(|e| format!("invalid front matter: {e}"))?;
            let body = &rest[end + 4..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            (front, body)
        }
        None => (FrontMatter::default_with_version(), text),
    };

    let mut template = PromptTemplate::new(key, body.trim_end())
        .with_version(front.version)
        .require(front.required);
    template.defaults = front.defaults;
    Ok(template)
}

impl FrontMatter {
    fn default_with_version() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }
}

impl TemplateSource for DirectorySource {
    fn describe(&self) -> String {
        if self.with_builtin {
            format!("{} (over built-in)", self.root.display())
        } else {
            self.root.display().to_string()
        }
    }

    fn load_all(&self) -> Result<Vec<PromptTemplate>> {
        let mut templates = Vec::new();
        self.read_dir(&self.root, &mut templates)?;
        for sub in ["roles", "skills", "languages"] {
            let dir = self.root.join(sub);
            if dir.is_dir() {
                self.read_dir(&dir, &mut templates)?;
            }
        }

        if self.with_builtin {
            let mut merged: BTreeMap<TemplateKey, PromptTemplate> = builtin::templates()
                .into_iter()
                .map(|t| (t.key.clone(), t))
                .collect();
            for t in templates {
                merged.insert(t.key.clone(), t);
            }
            return Ok(merged.into_values().collect());
        }
        Ok(templates)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────

/// Resolves, caches and renders templates.
pub struct TemplateStore {
    source: Box<dyn TemplateSource>,
    registry: RwLock<HashMap<TemplateKey, PromptTemplate>>,
    cache: RwLock<HashMap<TemplateKey, Option<PromptTemplate>>>,
}

impl TemplateStore {
    /// Load every template from `source`.
    pub fn new(source: impl TemplateSource + 'static) -> Result<Self> {
        let store = Self {
            source: Box::new(source),
            registry: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Store backed by the built-in templates.
    pub fn builtin() -> Self {
        let templates = builtin::templates();
        Self {
            registry: RwLock::new(templates.iter().map(|t| (t.key.clone(), t.clone())).collect()),
            source: Box::new(StaticSource::new(templates)),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Re-read the source and drop every cached resolution.
    ///
    /// Returns the number of templates now registered.
    pub fn reload(&self) -> Result<usize> {
        let templates = self.source.load_all()?;
        let count = templates.len();
        let registry: HashMap<TemplateKey, PromptTemplate> =
            templates.into_iter().map(|t| (t.key.clone(), t)).collect();

        if !registry.contains_key(&TemplateKey::section(Section::Core)) {
            warn!(source = %self.source.describe(), "Template source has no core template");
        }

        *self.registry.write().unwrap_or_else(|e| e.into_inner()) = registry;
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        info!(source = %self.source.describe(), templates = count, "Templates loaded");
        Ok(count)
    }

    /// Resolve `key` with fallback; `None` when no candidate exists.
    pub fn load(&self, key: &TemplateKey) -> Option<PromptTemplate> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned();

        match cached {
            Some(Some(template)) => {
                match self.source.version(&template.key) {
                    Some(latest) if latest > template.version => self.refresh(key, &template.key),
                    _ => Some(template),
                }
            }
            Some(None) => None,
            None => {
                let resolved = self.resolve(key);
                self.cache
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key.clone(), resolved.clone());
                resolved
            }
        }
    }

    /// Pull a newer version of `resolved_key` from the source.
    fn refresh(&self, key: &TemplateKey, resolved_key: &TemplateKey) -> Option<PromptTemplate> {
        match self.source.fetch(resolved_key) {
            Ok(Some(fresh)) => {
                debug!(key = %resolved_key, version = fresh.version, "Refreshing cached template");
                self.registry
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(resolved_key.clone(), fresh.clone());
                self.cache
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key.clone(), Some(fresh.clone()));
                Some(fresh)
            }
            Ok(None) => {
                // Vanished from the source: resolve again from the registry.
                self.cache
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(key);
                self.resolve(key)
            }
            Err(e) => {
                warn!(key = %resolved_key, error = %e, "Template refresh failed; keeping cached version");
                self.registry
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(resolved_key)
                    .cloned()
            }
        }
    }

    fn resolve(&self, key: &TemplateKey) -> Option<PromptTemplate> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        fallback_chain(key)
            .into_iter()
            .find_map(|candidate| registry.get(&candidate).cloned())
    }

    /// Every registered key, sorted.
    pub fn keys(&self) -> Vec<TemplateKey> {
        let mut keys: Vec<TemplateKey> = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Every registered template, sorted by key.
    pub fn templates(&self) -> Vec<PromptTemplate> {
        let mut all: Vec<PromptTemplate> = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn render(
        &self,
        template: &PromptTemplate,
        variables: &BTreeMap<String, String>,
    ) -> Result<String> {
        crate::template::render(template, variables)
    }
}

/// Candidate keys from most to least specific, without duplicates.
pub fn fallback_chain(key: &TemplateKey) -> Vec<TemplateKey> {
    let base = TemplateKey {
        section: key.section,
        role: None,
        language: None,
        skill: key.skill.clone(),
    };
    let candidates = [
        key.clone(),
        TemplateKey {
            role: key.role,
            ..base.clone()
        },
        TemplateKey {
            language: key.language,
            ..base.clone()
        },
        base,
    ];

    let mut chain: Vec<TemplateKey> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !chain.contains(&candidate) {
            chain.push(candidate);
        }
    }
    chain
}
