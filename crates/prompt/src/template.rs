//! Placeholder rendering for prompt templates.
//!
//! Syntax: `{name}` where `name` is `[A-Za-z_][A-Za-z0-9_]*`. `{{` and `}}`
//! produce literal braces. A `{` that does not open a valid placeholder is
//! copied through unchanged.

use hearth_core::{Error, PromptTemplate, Result};
use std::collections::{BTreeMap, BTreeSet};

enum Piece<'a> {
    Text(&'a str),
    Brace(char),
    Var(&'a str),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Length in bytes of a valid `name}` tail starting at `rest`, if any.
fn placeholder_len(rest: &str) -> Option<usize> {
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return None,
    }
    for (idx, c) in chars {
        if c == '}' {
            return Some(idx);
        }
        if !is_ident_char(c) {
            return None;
        }
    }
    None
}

fn parse(body: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut idx = 0;
    let bytes = body.as_bytes();

    while idx < bytes.len() {
        match bytes[idx] {
            b'{' if bytes.get(idx + 1) == Some(&b'{') => {
                pieces.push(Piece::Text(&body[start..idx]));
                pieces.push(Piece::Brace('{'));
                idx += 2;
                start = idx;
            }
            b'}' if bytes.get(idx + 1) == Some(&b'}') => {
                pieces.push(Piece::Text(&body[start..idx]));
                pieces.push(Piece::Brace('}'));
                idx += 2;
                start = idx;
            }
            b'{' => match placeholder_len(&body[idx + 1..]) {
                Some(len) => {
                    pieces.push(Piece::Text(&body[start..idx]));
                    pieces.push(Piece::Var(&body[idx + 1..idx + 1 + len]));
                    idx += len + 2;
                    start = idx;
                }
                None => idx += 1,
            },
            _ => idx += 1,
        }
    }
    pieces.push(Piece::Text(&body[start..]));
    pieces
}

/// Names of every placeholder in `body`.
pub fn placeholders(body: &str) -> BTreeSet<String> {
    parse(body)
        .into_iter()
        .filter_map(|p| match p {
            Piece::Var(name) => Some(name.to_string()),
            _ => None,
        })
        .collect()
}

/// Substitute variables into a template body.
///
/// Lookup order per placeholder: `variables`, then the template's defaults.
/// A required variable with neither fails with [`Error::MissingVariable`];
/// an optional one renders empty.
pub fn render(template: &PromptTemplate, variables: &BTreeMap<String, String>) -> Result<String> {
    for name in &template.required_variables {
        if !variables.contains_key(name) && !template.defaults.contains_key(name) {
            return Err(Error::MissingVariable {
                template: template.key.to_string(),
                variable: name.clone(),
            });
        }
    }

    let mut out = String::with_capacity(template.body.len());
    for piece in parse(&template.body) {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Brace(c) => out.push(c),
            Piece::Var(name) => {
                if let Some(value) = variables.get(name).or_else(|| template.defaults.get(name)) {
                    out.push_str(value);
                }
            }
        }
    }
    Ok(out)
}
