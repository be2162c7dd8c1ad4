//! Field-token substitution for non-cloze templates.

use super::{expand, Substitution, Token};
use crate::types::FieldMap;

/// Shown for `{{type:Field}}` when the field has a value.
pub const TYPE_ANSWER_PROMPT: &str = "[type your answer here]";
/// Shown for `{{type:Field}}` when the field is empty.
pub const TYPE_ANSWER_EMPTY: &str = "[type: empty]";

const FRONT_SIDE: &str = "FrontSide";

/// Plain substitution: field lookup, `type:` placeholders and `{{FrontSide}}`.
#[derive(Debug, Clone, Copy)]
pub struct FieldSubstitution<'a> {
    pub fields: &'a FieldMap,
    /// Already-rendered front side; only set while rendering a back template.
    pub front_side: Option<&'a str>,
}

impl<'a> FieldSubstitution<'a> {
    pub fn new(fields: &'a FieldMap, front_side: Option<&'a str>) -> Self {
        Self { fields, front_side }
    }

    /// Expansion of a trimmed tag key.
    pub fn lookup(&self, key: &str) -> &'a str {
        if key == FRONT_SIDE {
            if let Some(front) = self.front_side {
                return front;
            }
        }

        if let Some(field) = key.strip_prefix("type:") {
            return match self.fields.get(field.trim()) {
                Some(value) if !value.is_empty() => TYPE_ANSWER_PROMPT,
                _ => TYPE_ANSWER_EMPTY,
            };
        }

        self.fields.get(key).map(String::as_str).unwrap_or("")
    }
}

impl Substitution for FieldSubstitution<'_> {
    fn substitute(&self, token: &Token<'_>, out: &mut String) {
        if let Some(key) = token.key() {
            out.push_str(self.lookup(key));
        }
    }
}

/// Render a non-cloze template against `fields`.
///
/// `front_rendered` is substituted for `{{FrontSide}}` exactly once; a
/// `{{FrontSide}}` inside the substituted text is left as-is.
pub fn render(template: &str, fields: &FieldMap, front_rendered: Option<&str>) -> String {
    expand(template, &FieldSubstitution::new(fields, front_rendered))
}
