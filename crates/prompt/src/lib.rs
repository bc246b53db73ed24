//! Prompt templates and assembly for Hearth.
//!
//! - [`TemplateStore`]: registry with fallback resolution, caching and reload
//! - [`PromptAssembler`]: composes sections under a token budget
//! - [`detect_language`]: English / Spanish detection for code-switching

pub mod assembler;
pub mod builtin;
pub mod language;
pub mod store;
pub mod template;

pub use assembler::{DROP_ORDER, PromptAssembler, SECTION_SEPARATOR, language_tags};
pub use language::detect_language;
pub use store::{DirectorySource, StaticSource, TemplateSource, TemplateStore, fallback_chain};
pub use template::{placeholders, render};
