//! Cloze deletion analysis and rendering.
//!
//! # Format
//! ```text
//! The {{c1::capital}} of {{c2::France::country}} is Paris
//! ```
//! Each distinct `cN` produces one card. On that card only the `cN`
//! occurrences are hidden; every other deletion shows its answer.

use std::collections::BTreeSet;

use crate::template::{expand, FieldSubstitution, Substitution, Token};

/// Front-side mask when no hint is given.
pub const CLOZE_MASK: &str = "[...]";

/// A parsed `{{cN::answer[::hint]}}` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClozeMarker<'a> {
    /// `None` when the digits do not fit an ordinal.
    pub ordinal: Option<u32>,
    pub answer: &'a str,
    pub hint: Option<&'a str>,
}

impl<'a> ClozeMarker<'a> {
    /// Parse the inside of a `{{...}}` tag. Returns `None` for non-cloze tags.
    pub fn parse(inner: &'a str) -> Option<Self> {
        let rest = inner.strip_prefix('c')?;
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 {
            return None;
        }
        let (digits, rest) = rest.split_at(digits_len);
        let body = rest.strip_prefix("::")?;

        let (answer, hint) = match body.split_once("::") {
            Some((answer, hint)) => (answer, Some(hint)),
            None => (body, None),
        };

        Some(Self {
            ordinal: digits.parse().ok(),
            answer,
            hint,
        })
    }

    fn render(&self, target: u32, reveal: bool, out: &mut String) {
        if self.ordinal != Some(target) {
            out.push_str(self.answer);
            return;
        }

        if reveal {
            out.push_str("**");
            out.push_str(self.answer);
            out.push_str("**");
            return;
        }

        match self.hint.filter(|hint| !hint.trim().is_empty()) {
            Some(hint) => {
                out.push('[');
                out.push_str(hint);
                out.push(']');
            }
            None => out.push_str(CLOZE_MASK),
        }
    }
}

/// Distinct positive cloze ordinals in `text`, ascending.
pub fn extract_ordinals(text: &str) -> BTreeSet<u32> {
    crate::template::tokenize(text)
        .iter()
        .filter_map(|token| match token {
            Token::Tag { inner, .. } => ClozeMarker::parse(inner),
            Token::Text(_) => None,
        })
        .filter_map(|marker| marker.ordinal)
        .filter(|ordinal| *ordinal > 0)
        .collect()
}

/// Strategy for cloze field text: markers are rendered, other tags stay literal.
#[derive(Debug, Clone, Copy)]
struct ClozeTextSubstitution {
    target: u32,
    reveal: bool,
}

impl Substitution for ClozeTextSubstitution {
    fn substitute(&self, token: &Token<'_>, out: &mut String) {
        if let Token::Tag { raw, inner } = token {
            match ClozeMarker::parse(inner) {
                Some(marker) => marker.render(self.target, self.reveal, out),
                None => out.push_str(raw),
            }
        }
    }
}

/// Render cloze `text` for the card with `target_ordinal`.
///
/// With `reveal = false` (front) the target shows `[hint]` or `[...]`; with
/// `reveal = true` (back) it shows the answer emphasized. Other ordinals always
/// show their answer.
pub fn render_cloze(text: &str, target_ordinal: u32, reveal: bool) -> String {
    expand(
        text,
        &ClozeTextSubstitution {
            target: target_ordinal,
            reveal,
        },
    )
}

/// Template strategy for cloze templates: `{{cloze:Field}}` renders the field's
/// cloze text for the target ordinal, everything else falls back to plain lookup.
#[derive(Debug, Clone, Copy)]
pub struct ClozeSubstitution<'a> {
    pub plain: FieldSubstitution<'a>,
    pub target: u32,
    pub reveal: bool,
}

impl Substitution for ClozeSubstitution<'_> {
    fn substitute(&self, token: &Token<'_>, out: &mut String) {
        let Some(key) = token.key() else {
            return;
        };
        match key.strip_prefix("cloze:") {
            Some(field) => {
                let text = self.plain.lookup(field.trim());
                out.push_str(&render_cloze(text, self.target, self.reveal));
            }
            None => self.plain.substitute(token, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldMap;

    const CAPITAL: &str = "The {{c1::capital}} of {{c2::France}} is Paris";

    #[test]
    fn extract_sorted_distinct() {
        let ords = extract_ordinals("{{c3::a}} {{c1::b}} {{c3::c}} {{c2::d::hint}}");
        assert_eq!(ords.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn extract_ignores_zero_and_non_numeric() {
        let ords = extract_ordinals("{{c0::a}} {{cx::b}} {{c::c}} {{c99999999999::d}} {{c4::e}}");
        assert_eq!(ords.into_iter().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn answer_with_lone_brace_still_counts() {
        let ords = extract_ordinals("{{c1::a}b}}");
        assert_eq!(ords.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(render_cloze("{{c1::a}b}}", 1, true), "**a}b**");
    }

    #[test]
    fn extract_none() {
        assert!(extract_ordinals("plain text {{Front}}").is_empty());
        assert!(extract_ordinals("").is_empty());
    }

    #[test]
    fn front_masks_only_target() {
        let front = render_cloze(CAPITAL, 1, false);
        assert_eq!(front, "The [...] of France is Paris");
        assert!(!front.contains("capital"));
    }

    #[test]
    fn back_reveals_target_emphasized() {
        let back = render_cloze(CAPITAL, 1, true);
        assert_eq!(back, "The **capital** of France is Paris");
    }

    #[test]
    fn hint_shown_when_non_blank() {
        assert_eq!(render_cloze("{{c1::Paris::city}}", 1, false), "[city]");
        assert_eq!(render_cloze("{{c1::Paris::  }}", 1, false), "[...]");
        assert_eq!(render_cloze("{{c1::Paris::city}}", 1, true), "**Paris**");
    }

    #[test]
    fn non_marker_tags_stay_literal() {
        assert_eq!(render_cloze("{{Front}} {{c1::x}}", 1, true), "{{Front}} **x**");
    }

    #[test]
    fn all_occurrences_of_target_are_masked() {
        assert_eq!(render_cloze("{{c1::a}} {{c1::b}} {{c2::c}}", 1, false), "[...] [...] c");
    }

    #[test]
    fn marker_parse() {
        let m = ClozeMarker::parse("c12::answer::hint::more").unwrap();
        assert_eq!(m.ordinal, Some(12));
        assert_eq!(m.answer, "answer");
        assert_eq!(m.hint, Some("hint::more"));
        assert!(ClozeMarker::parse("c1:answer").is_none());
        assert!(ClozeMarker::parse("Front").is_none());
    }

    #[test]
    fn cloze_template_substitution_mixes_fields() {
        let fields: FieldMap = [
            ("Text".to_string(), CAPITAL.to_string()),
            ("Extra".to_string(), "geography".to_string()),
        ]
        .into_iter()
        .collect();
        let strategy = ClozeSubstitution {
            plain: FieldSubstitution::new(&fields, None),
            target: 2,
            reveal: false,
        };
        let out = expand("Q: {{cloze:Text}} ({{Extra}})", &strategy);
        assert_eq!(out, "Q: The capital of [...] is Paris (geography)");
    }
}
