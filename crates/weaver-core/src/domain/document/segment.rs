//! Keyword segmentation
//!
//! Splits a line into candidate keywords. Scripts written without spaces
//! between words (Han, Kana, Hangul, Thai) have no reliable word boundary, so
//! long runs are cut into overlapping two- and three-character windows. Other
//! scripts keep whole words.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

/// Stop words for Chinese notes
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "都", "而", "及", "与", "等", "这", "那", "你",
    "他", "她", "它", "我们", "他们", "你们", "这个", "那个", "这些", "那些",
];

/// English function words, dropped only as whole words
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "by", "for", "from", "with", "as", "into",
    "about", "and", "or", "but", "nor", "so", "if", "then", "than", "because", "while", "is", "are",
    "was", "were", "be", "been", "being", "am", "do", "does", "did", "has", "have", "had", "will",
    "would", "can", "could", "should", "may", "might", "must", "not", "no", "it", "its", "this",
    "that", "these", "those", "there", "here", "i", "me", "my", "we", "us", "our", "you", "your",
    "he", "him", "his", "she", "her", "they", "them", "their", "what", "which", "who", "whom",
    "when", "where", "how", "why", "all", "any", "some", "very", "just", "also", "too",
];

/// Longest unbroken run kept whole
const MAX_WHOLE_RUN: usize = 4;

const MIN_KEYWORD_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Han,
    Kana,
    Hangul,
    Thai,
    Other,
}

impl Script {
    fn of(c: char) -> Self {
        match c as u32 {
            0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF => Self::Han,
            0x3040..=0x30FF | 0x31F0..=0x31FF => Self::Kana,
            0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => Self::Hangul,
            0x0E00..=0x0E7F => Self::Thai,
            _ => Self::Other,
        }
    }

    fn is_unbroken(self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// A keyword candidate within one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Text as written in the line
    pub text: String,
    /// NFKC, lowercased
    pub normalized: String,
    /// Byte offsets relative to the start of the line
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    stop_words: Vec<String>,
    stop_chars: HashSet<char>,
    function_words: HashSet<&'static str>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl Segmenter {
    pub fn new(extra_stop_words: &[String]) -> Self {
        let stop_words: Vec<String> = DEFAULT_STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra_stop_words.iter().map(|w| normalize(w)))
            .filter(|w| !w.is_empty())
            .collect();

        let stop_chars = stop_words
            .iter()
            .filter_map(|w| {
                let mut chars = w.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            })
            .collect();

        Self {
            stop_words,
            stop_chars,
            function_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Keyword candidates of `line`, deduplicated by normalized form
    pub fn segments(&self, line: &str) -> Vec<Segment> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for run in word_runs(line) {
            for (start, end) in self.candidates(&run) {
                let text = &line[start..end];
                let normalized = normalize(text);
                if !self.accepts(&normalized) || !seen.insert(normalized.clone()) {
                    continue;
                }
                out.push(Segment {
                    text: text.to_string(),
                    normalized,
                    byte_start: start,
                    byte_end: end,
                });
            }
        }

        out
    }

    fn candidates(&self, run: &Run) -> Vec<(usize, usize)> {
        if !run.script.is_unbroken() || run.chars.len() <= MAX_WHOLE_RUN {
            return vec![(run.chars[0].0, run.end)];
        }

        let chars = &run.chars;
        let char_end = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(run.end);
        let mut windows = Vec::new();
        for i in 0..chars.len() - 1 {
            for len in [2, 3] {
                if i + len > chars.len() {
                    continue;
                }
                let first = chars[i].1;
                let last = chars[i + len - 1].1;
                if self.stop_chars.contains(&first) || self.stop_chars.contains(&last) {
                    continue;
                }
                windows.push((chars[i].0, char_end(i + len)));
            }
        }
        windows
    }

    fn accepts(&self, normalized: &str) -> bool {
        normalized.chars().count() >= MIN_KEYWORD_CHARS
            && !normalized.chars().all(|c| c.is_numeric())
            && !self.function_words.contains(normalized)
            && !self.stop_words.iter().any(|sw| normalized.contains(sw.as_str()))
    }
}

/// NFKC plus lowercase, the form keywords are grouped by
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

struct Run {
    script: Script,
    /// (byte offset, char) pairs
    chars: Vec<(usize, char)>,
    end: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Maximal runs of word characters sharing one script class
fn word_runs(line: &str) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut current: Option<Run> = None;

    for (offset, c) in line.char_indices() {
        if !is_word_char(c) {
            if let Some(run) = current.take() {
                runs.push(run);
            }
            continue;
        }

        let script = Script::of(c);
        match current.as_mut() {
            Some(run) if run.script == script => {
                run.chars.push((offset, c));
                run.end = offset + c.len_utf8();
            }
            _ => {
                if let Some(run) = current.take() {
                    runs.push(run);
                }
                current = Some(Run {
                    script,
                    chars: vec![(offset, c)],
                    end: offset + c.len_utf8(),
                });
            }
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }

    runs
}
