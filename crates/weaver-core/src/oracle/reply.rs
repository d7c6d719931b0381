//! Reply parsing
//!
//! Replies are free text. Parsing is strict and finite: an exact vocabulary
//! match first, then a small set of substring heuristics, and otherwise an
//! explicit `UnparseableReply` error that the client treats as a soft failure.

use crate::domain::document::extractor::link_bodies;
use crate::domain::knowledge::RelationshipType;
use crate::error::{Error, Result};

const AFFIRMATIVES: &[&str] = &["同一个概念", "相同概念", "是的", "相同", "一样", "是"];
const NEGATIVES: &[&str] = &["不是", "不同", "不一样", "不相同", "否"];
const ENGLISH_AFFIRMATIVES: &[&str] = &["yes", "same"];
const ENGLISH_NEGATIVES: &[&str] = &["no", "not", "different"];

/// Longest reply excerpt kept in an error message
const EXCERPT_CHARS: usize = 80;

/// Map a reply onto one relationship label
pub fn parse_relation(reply: &str) -> Result<RelationshipType> {
    let stripped = strip_decoration(reply);
    if let Some(found) = RelationshipType::parse(stripped) {
        return Ok(found);
    }

    // Bracketed labels anywhere in the reply
    let bracketed = distinct(
        link_bodies(reply)
            .into_iter()
            .filter_map(|body| RelationshipType::from_label(body.trim())),
    );
    match bracketed.as_slice() {
        [only] => return Ok(*only),
        [] => {}
        _ => return Err(unparseable(reply)),
    }

    // Bare labels anywhere in the reply
    let mentioned = distinct(
        RelationshipType::all()
            .iter()
            .copied()
            .filter(|r| reply.contains(r.label())),
    );
    match mentioned.as_slice() {
        [only] => Ok(*only),
        _ => Err(unparseable(reply)),
    }
}

/// Map a reply onto a yes/no same-concept answer
///
/// Negations are checked first, since "不是" contains "是".
pub fn parse_same_concept(reply: &str) -> Result<bool> {
    let text = strip_decoration(reply).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if NEGATIVES.iter().any(|n| text.contains(n)) || words.iter().any(|w| ENGLISH_NEGATIVES.contains(w)) {
        return Ok(false);
    }
    if AFFIRMATIVES.iter().any(|a| text.contains(a)) || words.iter().any(|w| ENGLISH_AFFIRMATIVES.contains(w)) {
        return Ok(true);
    }
    Err(unparseable(reply))
}

fn strip_decoration(reply: &str) -> &str {
    reply
        .trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '[' | ']' | '"' | '\'' | '`' | '“' | '”' | '。' | '.' | '！' | '!')
        })
}

fn distinct(items: impl Iterator<Item = RelationshipType>) -> Vec<RelationshipType> {
    let mut out: Vec<RelationshipType> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn unparseable(reply: &str) -> Error {
    let excerpt: String = reply.trim().chars().take(EXCERPT_CHARS).collect();
    Error::UnparseableReply(excerpt)
}
