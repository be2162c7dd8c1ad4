//! Template tokenizer shared by the plain and cloze-aware renderers.
//!
//! A template is split into literal text and `{{...}}` tags. Rendering walks
//! the tokens once and hands every tag to a [`Substitution`] strategy, so
//! substituted text is never scanned again.

pub mod render;

use regex::Regex;
use std::sync::OnceLock;

pub use render::{render, FieldSubstitution, TYPE_ANSWER_EMPTY, TYPE_ANSWER_PROMPT};

/// Cloze markers end at the first `}}`, so their answers may contain a lone
/// `}`. Every other tag stops at the first `}`.
fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{(c\d+::.*?|[^}]+)\}\}").expect("tag pattern is valid"))
}

/// A piece of a tokenized template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    /// `raw` is the full `{{...}}` text, `inner` what sits between the braces (untrimmed).
    Tag { raw: &'a str, inner: &'a str },
}

impl<'a> Token<'a> {
    /// Trimmed tag key, or `None` for text.
    pub fn key(&self) -> Option<&'a str> {
        match self {
            Token::Tag { inner, .. } => Some(inner.trim()),
            Token::Text(_) => None,
        }
    }
}

/// Split `input` into text and tag tokens. Unterminated `{{` stays literal.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in tag_regex().captures_iter(input) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::Text(&input[last..whole.start()]));
        }
        tokens.push(Token::Tag {
            raw: whole.as_str(),
            inner: inner.as_str(),
        });
        last = whole.end();
    }

    if last < input.len() {
        tokens.push(Token::Text(&input[last..]));
    }
    tokens
}

/// Strategy deciding what a tag expands to.
pub trait Substitution {
    /// Append the expansion of one tag to `out`.
    fn substitute(&self, token: &Token<'_>, out: &mut String);
}

/// Expand every tag in `template` once, using `strategy`.
pub fn expand<S: Substitution + ?Sized>(template: &str, strategy: &S) -> String {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Tag { .. } => strategy.substitute(&token, &mut out),
        }
    }
    out
}

/// Rewrite tags referencing `old` (plain, `type:` or `cloze:`) to reference `new`.
pub fn rename_field_references(template: &str, old: &str, new: &str) -> String {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Tag { raw, inner } => match rewrite_key(inner.trim(), old, new) {
                Some(key) => {
                    out.push_str("{{");
                    out.push_str(&key);
                    out.push_str("}}");
                }
                None => out.push_str(raw),
            },
        }
    }
    out
}

fn rewrite_key(key: &str, old: &str, new: &str) -> Option<String> {
    if key == old {
        return Some(new.to_string());
    }
    for prefix in ["type:", "cloze:"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            if rest.trim() == old {
                return Some(format!("{prefix}{new}"));
            }
        }
    }
    None
}
