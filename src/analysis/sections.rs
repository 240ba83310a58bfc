//! Grammar for the numbered-section prose dialect.
//!
//! A reply looks like
//!
//! ```text
//! 1. 감정 분석: 피곤함: 40%, 기쁨: 30% ...
//! 총점: 3.5/5
//!
//! 2. 요약: ...
//!
//! 3. 조언: ...
//! ```
//!
//! Each section starts at a marker "digit, optional period, label,
//! optional colon" and runs until the next known marker or end of text.
//! Markers are matched case-insensitively, tolerate markdown bold around
//! the label, and accept every spelling listed in [`SectionLabels`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Label spellings for each section plus the score marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabels {
    pub emotion: Vec<String>,
    pub summary: Vec<String>,
    pub advice: Vec<String>,
    pub score: Vec<String>,
}

impl Default for SectionLabels {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            emotion: v(&["감정 분석", "emotion analysis"]),
            summary: v(&["요약", "summary"]),
            advice: v(&["조언", "advice"]),
            score: v(&["총점", "total score"]),
        }
    }
}

/// Which section a marker opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Emotion = 0,
    Summary = 1,
    Advice = 2,
}

/// Compiled marker and score patterns.
#[derive(Debug, Clone)]
pub struct SectionGrammar {
    markers: [Regex; 3],
    score: Regex,
    share: Regex,
}

static DEFAULT_GRAMMAR: LazyLock<SectionGrammar> = LazyLock::new(|| {
    SectionGrammar::new(&SectionLabels::default()).expect("built-in section labels compile")
});

/// `"감정 분석"` → `감정\s*분석`, so inner spacing is not significant.
fn label_alternation(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| {
            l.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s*")
        })
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("|")
}

/// A marker only counts at the start of a line, after optional heading,
/// quote or bullet marks.
fn marker_regex(number: u8, labels: &[String]) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?im)^[ \t#>*\-]*{number}\s*\.?\s*(?:\*\*)?\s*(?:{})\s*(?:\*\*)?\s*:?(?:\*\*)?",
        label_alternation(labels)
    ))
}

impl SectionGrammar {
    /// Compile a grammar for custom label spellings.
    pub fn new(labels: &SectionLabels) -> Result<Self, regex::Error> {
        let markers = [
            marker_regex(1, &labels.emotion)?,
            marker_regex(2, &labels.summary)?,
            marker_regex(3, &labels.advice)?,
        ];
        let score = Regex::new(&format!(
            r"(?i)(?:{})\s*:?\s*(\d+(?:\.\d+)?)\s*/\s*5(?:\.0+)?(?:\D|$)",
            label_alternation(&labels.score)
        ))?;
        let share = Regex::new(r"([^\s:,][^:,\n]*?)\s*:\s*(\d+(?:\.\d+)?)\s*%")?;
        Ok(Self {
            markers,
            score,
            share,
        })
    }

    /// Grammar for the built-in Korean and English labels.
    pub fn default_grammar() -> &'static SectionGrammar {
        &DEFAULT_GRAMMAR
    }

    /// Raw (untrimmed) body of `section`, or `None` when its marker is
    /// absent.
    pub fn section<'t>(&self, text: &'t str, section: Section) -> Option<&'t str> {
        let opened = self.markers[section as usize].find(text)?;
        let start = opened.end();
        let end = self
            .markers
            .iter()
            .filter_map(|re| re.find_at(text, start))
            .map(|m| m.start())
            .min()
            .unwrap_or(text.len());
        Some(&text[start..end])
    }

    /// The numeral of the first `총점: N/5` marker in `body`.
    pub fn score<'t>(&self, body: &'t str) -> Option<&'t str> {
        self.score
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// All `label: N%` tokens in `body`, label trimmed of list bullets.
    pub fn shares<'t>(&self, body: &'t str) -> Vec<(&'t str, &'t str)> {
        self.share
            .captures_iter(body)
            .filter_map(|c| {
                let label = c
                    .get(1)?
                    .as_str()
                    .trim_start_matches(['-', '*', '•', '·', '('])
                    .trim();
                let value = c.get(2)?.as_str();
                (!label.is_empty()).then_some((label, value))
            })
            .collect()
    }
}

/// Strip surrounding whitespace and dangling markdown heading/bold marks
/// left behind where the next section's marker was cut off.
pub(crate) fn clean_body(body: &str) -> &str {
    body.trim().trim_end_matches(['#', '*']).trim()
}

/// Collapse every whitespace run (newlines included) to one space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split prose into sentences at `.`, `!`, `?` or `。` followed by
/// whitespace or end of text.
pub(crate) fn split_sentences(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let terminator = matches!(c, '.' | '!' | '?' | '。');
        let boundary = chars.peek().map_or(true, |n| n.is_whitespace());
        if terminator && boundary {
            let sentence = collapse_whitespace(&current);
            if !sentence.is_empty() {
                out.push(sentence);
            }
            current.clear();
        }
    }
    let tail = collapse_whitespace(&current);
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
