// Template Resolver
// Substitutes {stageId.path.to.field} references in stage prompts with
// values produced by prior stages. A single-pass segment tokenizer keeps
// literal braces (JSON examples in prompts) intact.

use crate::config::models::{resolve_path, value_to_display_string};
use crate::error::StageError;

use serde_json::{Map, Value};
use std::collections::HashMap;

/// A piece of a template: verbatim text or a `{reference}` token body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(String),
}

/// Split a template into literal and reference segments.
/// A brace span is a reference only when its body is a dot-joined sequence
/// of identifier segments; anything else (nested braces, spaces, quotes)
/// stays literal.
pub fn tokenize(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        if ch != '{' {
            literal.push(ch);
            continue;
        }

        // Candidate reference: scan to the next closing brace
        let rest = &template[start + 1..];
        match rest.find(|c| c == '}' || c == '{') {
            Some(end) if rest.as_bytes()[end] == b'}' && is_reference_body(&rest[..end]) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Reference(rest[..end].to_string()));
                // Skip past the body and closing brace
                for _ in 0..=end {
                    chars.next();
                }
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

fn is_reference_body(body: &str) -> bool {
    !body.is_empty()
        && body.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

/// Reference token bodies appearing in a template, in order.
/// Used by validation to check that references name earlier stages.
pub fn reference_tokens(template: &str) -> Vec<String> {
    tokenize(template)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Reference(token) => Some(token),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Resolves templates against the parsed outputs of completed stages
pub struct TemplateResolver<'a> {
    outputs: &'a HashMap<String, Map<String, Value>>,
}

impl<'a> TemplateResolver<'a> {
    /// Create a resolver over completed stage outputs (stage id -> parsed mapping)
    pub fn new(outputs: &'a HashMap<String, Map<String, Value>>) -> Self {
        Self { outputs }
    }

    /// Substitute every reference in the template. An unresolvable
    /// reference fails with the offending token; the caller treats this
    /// as a stage failure, not a crash.
    pub fn resolve(&self, template: &str) -> Result<String, StageError> {
        let mut result = String::with_capacity(template.len());

        for segment in tokenize(template) {
            match segment {
                Segment::Literal(text) => result.push_str(&text),
                Segment::Reference(token) => {
                    let value = self.lookup(&token).ok_or(StageError::Template {
                        token: token.clone(),
                    })?;
                    result.push_str(&value);
                }
            }
        }

        Ok(result)
    }

    /// Resolve one reference token to its string form.
    /// `{stageId}` alone substitutes the whole mapping as compact JSON.
    fn lookup(&self, token: &str) -> Option<String> {
        let (stage_id, path) = match token.split_once('.') {
            Some((stage_id, path)) => (stage_id, Some(path)),
            None => (token, None),
        };

        let parsed = self.outputs.get(stage_id)?;

        match path {
            Some(path) => resolve_path(parsed, path).map(value_to_display_string),
            None => Some(Value::Object(parsed.clone()).to_string()),
        }
    }
}
