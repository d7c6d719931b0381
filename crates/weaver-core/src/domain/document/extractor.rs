//! Link and keyword extraction
//!
//! Pulls `[[wiki links]]` and free-text keyword candidates out of a document,
//! with byte offsets into the original text and a whitespace-collapsed context
//! window around each occurrence. Fenced code blocks and inline code spans
//! are left alone.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::config::Config;
use crate::domain::knowledge::RelationshipType;

use super::segment::Segmenter;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[(.*?)\]\]").unwrap());

/// Settings that shape extraction
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Characters of context captured around an occurrence
    pub context_window: usize,
    pub extra_stop_words: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            context_window: 100,
            extra_stop_words: Vec::new(),
        }
    }
}

impl From<&Config> for ExtractConfig {
    fn from(config: &Config) -> Self {
        Self {
            context_window: config.scan.context_window,
            extra_stop_words: config.keywords.extra_stop_words.clone(),
        }
    }
}

/// One `[[target]]` or `[[target|display]]` link in a document
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOccurrence {
    pub source_file: PathBuf,
    /// Concept the document stands for (its file stem)
    pub source_concept: String,
    pub raw_target: String,
    pub display: Option<String>,
    /// Byte range of the whole `[[...]]` token
    pub byte_start: usize,
    pub byte_end: usize,
    /// Zero-based line number
    pub line_index: usize,
    /// Byte offset where the line's content ends, before any terminator
    pub line_end: usize,
    pub context: String,
    /// First relationship marker already present on the line
    pub existing_relation: Option<RelationshipType>,
}

/// One keyword candidate in a document
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordOccurrence {
    pub source_file: PathBuf,
    pub normalized: String,
    pub raw_text: String,
    pub line_index: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub links: Vec<LinkOccurrence>,
    pub keywords: Vec<KeywordOccurrence>,
}

/// Concept name of a document: its file stem
pub fn concept_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether a `[[...]]` body is a relationship marker rather than a link
pub fn is_marker(body: &str) -> bool {
    RelationshipType::from_label(body.trim()).is_some()
}

/// First relationship marker on a line
pub fn first_marker(line: &str) -> Option<RelationshipType> {
    LINK_RE
        .captures_iter(line)
        .find_map(|caps| RelationshipType::from_label(caps[1].trim()))
}

/// Whether a line holds any `[[...]]` token
pub fn has_link_token(line: &str) -> bool {
    LINK_RE.is_match(line)
}

/// Bodies of all `[[...]]` tokens in `text`, in order
pub fn link_bodies(text: &str) -> Vec<&str> {
    LINK_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Extractor {
    context_window: usize,
    segmenter: Segmenter,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default())
    }
}

impl Extractor {
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            context_window: config.context_window,
            segmenter: Segmenter::new(&config.extra_stop_words),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&ExtractConfig::from(config))
    }

    /// Links and keywords of `text`, each ordered by byte offset
    pub fn extract(&self, path: &Path, text: &str) -> Extraction {
        let lines = split_lines(text);
        let source_concept = concept_of(path);
        let mut extraction = Extraction::default();
        let mut fences = FenceState::default();

        for (index, line) in lines.iter().enumerate() {
            let raw = &text[line.start..line.end];
            if fences.in_code(raw) {
                continue;
            }
            // Same byte length as `raw`, so offsets carry over unchanged
            let masked = mask_code_spans(raw);
            let content = masked.as_ref();

            if has_link_token(content) {
                let existing_relation = first_marker(content);
                for caps in LINK_RE.captures_iter(content) {
                    let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                        continue;
                    };
                    if is_marker(body.as_str()) {
                        continue;
                    }

                    let (target, display) = match body.as_str().split_once('|') {
                        Some((target, display)) => (target.trim(), Some(display.trim().to_string())),
                        None => (body.as_str().trim(), None),
                    };
                    if target.is_empty() {
                        warn!(
                            path = %path.display(),
                            line = index + 1,
                            "Skipping link with an empty target"
                        );
                        continue;
                    }

                    extraction.links.push(LinkOccurrence {
                        source_file: path.to_path_buf(),
                        source_concept: source_concept.clone(),
                        raw_target: target.to_string(),
                        display: display.filter(|d| !d.is_empty()),
                        byte_start: line.start + whole.start(),
                        byte_end: line.start + whole.end(),
                        line_index: index,
                        line_end: line.end,
                        context: self.context(text, &lines, index, whole.start(), whole.end()),
                        existing_relation,
                    });
                }
                continue;
            }

            for segment in self.segmenter.segments(content) {
                extraction.keywords.push(KeywordOccurrence {
                    source_file: path.to_path_buf(),
                    normalized: segment.normalized,
                    raw_text: segment.text,
                    line_index: index,
                    byte_start: line.start + segment.byte_start,
                    byte_end: line.start + segment.byte_end,
                    context: self.context(text, &lines, index, segment.byte_start, segment.byte_end),
                });
            }
        }

        extraction
    }

    /// Context around bytes `start..end` of line `index`
    ///
    /// Half the window on each side within the line, plus the tail of the
    /// previous line and the head of the next line (a quarter window each).
    fn context(&self, text: &str, lines: &[Line], index: usize, start: usize, end: usize) -> String {
        let half = self.context_window / 2;
        let quarter = self.context_window / 4;
        let content = &text[lines[index].start..lines[index].end];

        let before = &content[..start];
        let after = &content[end..];
        let mut parts: Vec<&str> = Vec::with_capacity(3);

        if index > 0 {
            let prev = &text[lines[index - 1].start..lines[index - 1].end];
            parts.push(tail_chars(prev, quarter));
        }

        let line_from = start - tail_chars(before, half).len();
        let line_to = end + head_chars(after, half).len();
        parts.push(&content[line_from..line_to]);

        if let Some(next) = lines.get(index + 1) {
            parts.push(head_chars(&text[next.start..next.end], quarter));
        }

        collapse_whitespace(&parts.join(" "))
    }
}

/// Extract with a one-off extractor
pub fn extract(path: &Path, text: &str, config: &ExtractConfig) -> Extraction {
    Extractor::new(config).extract(path, text)
}

/// Open fenced code block, if any, as (fence char, fence length)
#[derive(Debug, Default)]
struct FenceState {
    open: Option<(char, usize)>,
}

impl FenceState {
    /// Whether `line` belongs to a fenced block, fence lines included
    fn in_code(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start_matches(' ');
        let fence = if line.len() - trimmed.len() <= 3 {
            fence_run(trimmed)
        } else {
            None
        };

        match (self.open, fence) {
            (None, Some(opening)) => {
                self.open = Some(opening);
                true
            }
            (Some((c, n)), Some((fc, fn_len))) if fc == c && fn_len >= n && trimmed[fn_len..].trim().is_empty() => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

/// Leading run of three or more backticks or tildes
fn fence_run(s: &str) -> Option<(char, usize)> {
    let c = s.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let n = s.chars().take_while(|x| *x == c).count();
    (n >= 3).then_some((c, n))
}

/// Blank out inline code spans, keeping every byte offset in place
///
/// A span opens on a run of backticks and closes on the next run of the same
/// length. An unmatched run is literal text.
fn mask_code_spans(line: &str) -> Cow<'_, str> {
    let bytes = line.as_bytes();
    let run_len = |at: usize| bytes[at..].iter().take_while(|b| **b == b'`').count();

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let n = run_len(i);
        let mut j = i + n;
        let mut close = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let m = run_len(j);
                if m == n {
                    close = Some(j + m);
                    break;
                }
                j += m;
            } else {
                j += 1;
            }
        }
        match close {
            Some(end) => {
                spans.push((i, end));
                i = end;
            }
            None => i += n,
        }
    }

    if spans.is_empty() {
        return Cow::Borrowed(line);
    }

    let mut masked = String::with_capacity(line.len());
    for (offset, c) in line.char_indices() {
        if spans.iter().any(|(start, end)| (*start..*end).contains(&offset)) {
            masked.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            masked.push(c);
        }
    }
    Cow::Owned(masked)
}

/// Byte span of a line's content, terminator excluded
#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    end: usize,
}

fn split_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let content = raw
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(raw);
        lines.push(Line {
            start: offset,
            end: offset + content.len(),
        });
        offset += raw.len();
    }
    lines
}

fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
