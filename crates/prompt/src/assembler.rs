//! Prompt assembly: composes templates and memory into one system prompt.
//!
//! Composition order:
//!
//! 1. **Core**: mandatory, never dropped
//! 2. **Principles**
//! 3. **Rules**
//! 4. **Role**: kept with core when everything else has been dropped
//! 5. **Skills**: one fragment per active skill
//! 6. **Language**: preferred language, plus the other one on code-switch
//! 7. **User context**
//! 8. **Memory context**: fills whatever budget is left
//!
//! Each section after the first carries its separator, so the sum of the
//! per-section estimates bounds the token count of the final text.
//!
//! # Determinism
//!
//! Identical user, context, mode, budget and query always produce identical
//! output. Nothing here reads the clock.

use crate::language::detect_language;
use crate::store::TemplateStore;
use hearth_config::PromptConfig;
use hearth_core::token::estimate_tokens;
use hearth_core::{
    AssembledContext, BuiltPrompt, Error, LanguagePreference, LanguageTag, LayerKind, MemoryItem,
    PromptMode, RankedItem, Result, Section, TemplateKey, UserContext,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placed between sections.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Sections removed, in this order, while the prompt is over budget.
pub const DROP_ORDER: [Section; 6] = [
    Section::Skill,
    Section::Language,
    Section::MemoryContext,
    Section::Principles,
    Section::UserContext,
    Section::Rules,
];

const ROLE_HEADING: &str = "# ACTIVE ROLE CONTEXT\n\n";
const SKILLS_HEADING: &str = "# ACTIVE SKILLS\n\n";
const LANGUAGE_HEADING: &str = "# LANGUAGE CONTEXT\n\n";

const RECENT_HEADING: &str = "## Recent Conversation Context\n";
const PREFERENCES_HEADING: &str = "## User Preferences\n";
const FACTS_HEADING: &str = "## Known Facts\n";
const RELEVANT_HEADING: &str = "## Relevant Memories\n";

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RenderedSection {
    section: Section,
    text: String,
    tokens: usize,
}

impl RenderedSection {
    fn first(section: Section, body: String) -> Self {
        let tokens = estimate_tokens(&body);
        Self {
            section,
            text: body,
            tokens,
        }
    }

    fn following(section: Section, body: &str) -> Self {
        Self::first(section, format!("{SECTION_SEPARATOR}{body}"))
    }
}

/// One run of the assembler.
#[derive(Debug, Clone, Copy)]
struct Pass {
    mode: PromptMode,
    /// Token ceiling for the whole minimal prompt, from the full prompt's size.
    ratio_ceiling: Option<usize>,
    log_drops: bool,
}

impl Pass {
    fn full() -> Self {
        Self {
            mode: PromptMode::Full,
            ratio_ceiling: None,
            log_drops: true,
        }
    }
}

/// Memory lines chosen to fit a budget, grouped for rendering.
#[derive(Debug, Default)]
struct MemoryDigest<'a> {
    recent: Vec<&'a MemoryItem>,
    preferences: Vec<(&'a str, &'a str)>,
    facts: Vec<&'a MemoryItem>,
    relevant: Vec<&'a RankedItem>,
    tokens: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Recent,
    Preferences,
    Facts,
    Relevant,
}

impl Group {
    fn heading(&self) -> &'static str {
        match self {
            Self::Recent => RECENT_HEADING,
            Self::Preferences => PREFERENCES_HEADING,
            Self::Facts => FACTS_HEADING,
            Self::Relevant => RELEVANT_HEADING,
        }
    }

    /// Cost of opening the group, including the blank line before it.
    fn heading_tokens(&self) -> usize {
        estimate_tokens(self.heading()) + 1
    }
}

fn recent_line(item: &MemoryItem) -> String {
    format!("**{}**: {}\n", item.speaker().unwrap_or("user"), item.content)
}

fn preference_line(key: &str, value: &str) -> String {
    format!("- {key}: {value}\n")
}

fn fact_line(item: &MemoryItem) -> String {
    format!("- {}\n", item.content)
}

fn relevant_line(ranked: &RankedItem) -> String {
    format!("- (relevance: {:.2}) {}\n", ranked.relevance, ranked.item.content)
}

impl<'a> MemoryDigest<'a> {
    /// Greedy fill: preferences first, then `ranked` best-first. Lines that
    /// do not fit are skipped.
    fn select(ctx: &'a AssembledContext, budget: usize, max_recent: usize) -> Self {
        let mut digest = Self::default();
        let mut opened: Vec<Group> = Vec::new();

        let mut admit = |group: Group, line_tokens: usize, digest: &mut Self| -> bool {
            let opening = if opened.contains(&group) {
                0
            } else {
                group.heading_tokens()
            };
            let cost = opening + line_tokens;
            if digest.tokens + cost > budget {
                return false;
            }
            digest.tokens += cost;
            if opening > 0 {
                opened.push(group);
            }
            true
        };

        for (key, value) in &ctx.preferences {
            let line = estimate_tokens(&preference_line(key, value));
            if admit(Group::Preferences, line, &mut digest) {
                digest.preferences.push((key.as_str(), value.as_str()));
            }
        }

        for ranked in &ctx.ranked {
            match ranked.layer {
                LayerKind::Immediate => {
                    if digest.recent.len() >= max_recent {
                        continue;
                    }
                    let line = estimate_tokens(&recent_line(&ranked.item));
                    if admit(Group::Recent, line, &mut digest) {
                        digest.recent.push(&ranked.item);
                    }
                }
                LayerKind::Structured | LayerKind::Archive => {
                    let line = estimate_tokens(&fact_line(&ranked.item));
                    if admit(Group::Facts, line, &mut digest) {
                        digest.facts.push(&ranked.item);
                    }
                }
                LayerKind::Working | LayerKind::Semantic => {
                    let line = estimate_tokens(&relevant_line(ranked));
                    if admit(Group::Relevant, line, &mut digest) {
                        digest.relevant.push(ranked);
                    }
                }
            }
        }

        // Conversation reads oldest to newest.
        digest.recent.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        digest
    }

    fn is_empty(&self) -> bool {
        self.recent.is_empty()
            && self.preferences.is_empty()
            && self.facts.is_empty()
            && self.relevant.is_empty()
    }

    fn render(&self) -> String {
        let mut groups: Vec<String> = Vec::new();

        if !self.recent.is_empty() {
            let mut s = RECENT_HEADING.to_string();
            self.recent.iter().for_each(|i| s.push_str(&recent_line(i)));
            groups.push(s);
        }
        if !self.preferences.is_empty() {
            let mut s = PREFERENCES_HEADING.to_string();
            self.preferences
                .iter()
                .for_each(|(k, v)| s.push_str(&preference_line(k, v)));
            groups.push(s);
        }
        if !self.facts.is_empty() {
            let mut s = FACTS_HEADING.to_string();
            self.facts.iter().for_each(|i| s.push_str(&fact_line(i)));
            groups.push(s);
        }
        if !self.relevant.is_empty() {
            let mut s = RELEVANT_HEADING.to_string();
            self.relevant.iter().for_each(|r| s.push_str(&relevant_line(r)));
            groups.push(s);
        }

        groups.join("\n").trim_end().to_string()
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds system prompts from a [`TemplateStore`]. Stateless per call.
pub struct PromptAssembler {
    store: Arc<TemplateStore>,
    config: PromptConfig,
}

impl PromptAssembler {
    pub fn new(store: Arc<TemplateStore>, config: PromptConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Assemble a prompt that fits `budget` tokens.
    ///
    /// Minimal prompts use the condensed core when one is registered, and
    /// their memory slice is capped so the whole prompt stays within
    /// `minimal_ratio_target` of the full prompt for the same input.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCoreTemplate`] when no core template resolves
    /// - [`Error::MissingVariable`] when a template requirement is unmet
    /// - [`Error::BudgetUnsatisfiable`] when core + role alone exceed `budget`
    pub fn build(
        &self,
        user: &UserContext,
        ctx: &AssembledContext,
        mode: PromptMode,
        budget: usize,
        query: Option<&str>,
    ) -> Result<BuiltPrompt> {
        match mode {
            PromptMode::Full => self.assemble(user, ctx, Pass::full(), budget, query),
            PromptMode::Minimal => {
                let reference = Pass {
                    log_drops: false,
                    ..Pass::full()
                };
                // No ceiling when the full prompt itself cannot be built.
                let ratio_ceiling = self
                    .assemble(user, ctx, reference, budget, query)
                    .ok()
                    .map(|full| {
                        (full.estimated_tokens as f32 * self.config.minimal_ratio_target).floor()
                            as usize
                    });
                let pass = Pass {
                    mode,
                    ratio_ceiling,
                    log_drops: true,
                };
                self.assemble(user, ctx, pass, budget, query)
            }
        }
    }

    fn assemble(
        &self,
        user: &UserContext,
        ctx: &AssembledContext,
        pass: Pass,
        budget: usize,
        query: Option<&str>,
    ) -> Result<BuiltPrompt> {
        let mode = pass.mode;
        let variables = self.variables(user);

        // ── Fixed sections ─────────────────────────────────────────────────
        let core = match mode {
            PromptMode::Full => self.store.load(&TemplateKey::section(Section::Core)),
            PromptMode::Minimal => self
                .store
                .load(&TemplateKey::section(Section::CoreCondensed))
                .or_else(|| self.store.load(&TemplateKey::section(Section::Core))),
        }
        .ok_or(Error::MissingCoreTemplate)?;
        let mut sections = vec![RenderedSection::first(
            Section::Core,
            self.store.render(&core, &variables)?,
        )];

        for section in [
            Section::Principles,
            Section::Rules,
            Section::Role,
            Section::Skill,
            Section::Language,
            Section::UserContext,
        ] {
            if !mode.includes(section) {
                continue;
            }
            if let Some(body) = self.render_fixed(section, user, query, &variables)? {
                sections.push(RenderedSection::following(section, &body));
            }
        }

        // ── Budget enforcement ─────────────────────────────────────────────
        let mut warnings = Vec::new();
        let mut fixed: usize = sections.iter().map(|s| s.tokens).sum();
        let mut memory_dropped = false;

        for drop in DROP_ORDER {
            if fixed <= budget {
                break;
            }
            if drop == Section::MemoryContext {
                memory_dropped = true;
                if ctx.has_memory() {
                    warnings.push(format!(
                        "dropped memory_context: fixed sections need {fixed} of {budget} tokens"
                    ));
                }
                continue;
            }
            if let Some(pos) = sections.iter().position(|s| s.section == drop) {
                let removed = sections.remove(pos);
                fixed -= removed.tokens;
                if pass.log_drops {
                    warn!(section = %drop, tokens = removed.tokens, budget, "Dropping prompt section to fit budget");
                }
                warnings.push(format!(
                    "dropped {drop} ({} tokens) to fit budget of {budget}",
                    removed.tokens
                ));
            }
        }

        if fixed > budget {
            return Err(Error::BudgetUnsatisfiable {
                required: fixed,
                budget,
            });
        }

        // ── Memory context ─────────────────────────────────────────────────
        if let Some(ceiling) = pass.ratio_ceiling
            && fixed > ceiling
        {
            warn!(fixed, ceiling, "Minimal prompt exceeds its ratio of the full prompt");
            warnings.push(format!(
                "minimal prompt needs {fixed} tokens, above {ceiling} ({:.0}% of full)",
                self.config.minimal_ratio_target * 100.0
            ));
            memory_dropped = true;
        }

        if mode.includes(Section::MemoryContext) && !memory_dropped && ctx.has_memory() {
            let available = budget - fixed;
            let cap = match mode {
                PromptMode::Full => available,
                PromptMode::Minimal => {
                    let share = (budget as f32 * self.config.minimal_memory_share).floor() as usize;
                    let headroom = pass.ratio_ceiling.map_or(available, |c| c - fixed);
                    available.min(share).min(headroom)
                }
            };
            match self.render_memory(ctx, cap, &variables)? {
                Some(section) => sections.push(section),
                None => warnings.push(format!(
                    "dropped memory_context: no memory fits in {cap} tokens"
                )),
            }
        }

        // ── Final assembly ─────────────────────────────────────────────────
        let estimated_tokens: usize = sections.iter().map(|s| s.tokens).sum();
        let final_text: String = sections.iter().map(|s| s.text.as_str()).collect();
        let sections_used: Vec<String> = sections
            .iter()
            .map(|s| s.section.as_str().to_string())
            .collect();

        debug!(
            mode = ?mode,
            budget,
            estimated_tokens,
            sections = sections_used.len(),
            dropped = warnings.len(),
            "Assembled prompt"
        );

        Ok(BuiltPrompt {
            final_text,
            sections_used,
            estimated_tokens,
            variables,
            warnings,
            mode,
            degraded: ctx.degraded_names(),
        })
    }

    /// Values available to every template.
    pub fn variables(&self, user: &UserContext) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("assistant_name".into(), self.config.assistant_name.clone());
        vars.insert("user_id".into(), user.user_id.clone());
        vars.insert("role".into(), user.role.as_str().into());
        vars.insert("language".into(), user.language_preference.as_str().into());
        vars.insert("privacy_level".into(), user.privacy_level.clone());
        if let Some(age_group) = &user.age_group {
            vars.insert("age_group".into(), age_group.clone());
        }
        if let Some(family_id) = &user.family_id {
            vars.insert("family_id".into(), family_id.clone());
        }
        if !user.active_skills.is_empty() {
            let skills: Vec<&str> = user.active_skills.iter().map(String::as_str).collect();
            vars.insert("active_skills".into(), skills.join(", "));
        }
        vars
    }

    fn render_template(
        &self,
        key: &TemplateKey,
        variables: &BTreeMap<String, String>,
    ) -> Result<Option<String>> {
        match self.store.load(key) {
            Some(template) => self.store.render(&template, variables).map(Some),
            None => {
                debug!(key = %key, "No template registered");
                Ok(None)
            }
        }
    }

    fn render_fixed(
        &self,
        section: Section,
        user: &UserContext,
        query: Option<&str>,
        variables: &BTreeMap<String, String>,
    ) -> Result<Option<String>> {
        let primary = user.language_preference.primary();
        match section {
            Section::Role => {
                let key = TemplateKey::role(user.role).with_language(primary);
                Ok(self
                    .render_template(&key, variables)?
                    .map(|body| format!("{ROLE_HEADING}{body}")))
            }
            Section::Skill => {
                let mut fragments = Vec::new();
                for skill in &user.active_skills {
                    let key = TemplateKey::skill(skill.as_str()).with_language(primary);
                    if let Some(body) = self.render_template(&key, variables)? {
                        fragments.push(body);
                    }
                }
                Ok((!fragments.is_empty())
                    .then(|| format!("{SKILLS_HEADING}{}", fragments.join("\n\n"))))
            }
            Section::Language => {
                let mut fragments = Vec::new();
                for tag in language_tags(user.language_preference, query) {
                    if let Some(body) = self.render_template(&TemplateKey::language(tag), variables)? {
                        fragments.push(body);
                    }
                }
                Ok((!fragments.is_empty())
                    .then(|| format!("{LANGUAGE_HEADING}{}", fragments.join("\n\n"))))
            }
            other => self.render_template(&TemplateKey::section(other), variables),
        }
    }

    fn render_memory(
        &self,
        ctx: &AssembledContext,
        cap: usize,
        variables: &BTreeMap<String, String>,
    ) -> Result<Option<RenderedSection>> {
        let Some(template) = self.store.load(&TemplateKey::section(Section::MemoryContext)) else {
            debug!("No memory_context template registered");
            return Ok(None);
        };

        let mut vars = variables.clone();
        vars.insert("memory".into(), String::new());
        let shell = format!("{SECTION_SEPARATOR}{}", self.store.render(&template, &vars)?);
        let overhead = estimate_tokens(&shell);
        if overhead >= cap {
            return Ok(None);
        }

        let digest = MemoryDigest::select(ctx, cap - overhead, self.config.max_recent_turns);
        if digest.is_empty() {
            return Ok(None);
        }
        vars.insert("memory".into(), digest.render());
        let body = self.store.render(&template, &vars)?;
        Ok(Some(RenderedSection::following(Section::MemoryContext, &body)))
    }
}

/// Language fragments to include: the preferred one, plus the other when
/// the user is bilingual or the query is written in the other language.
pub fn language_tags(preference: LanguagePreference, query: Option<&str>) -> Vec<LanguageTag> {
    let primary = preference.primary();
    let switched = preference.is_bilingual()
        || query.is_some_and(|q| detect_language(q, primary) != primary);
    if switched {
        vec![primary, primary.other()]
    } else {
        vec![primary]
    }
}
