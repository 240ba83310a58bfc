//! Canonical analysis schema and the reply normalizer.
//!
//! [`AnalysisResult`] is the only shape handed to callers: all four
//! fields are always present, and a field the normalizer could not
//! resolve carries one of the [`sentinel`] strings instead of being
//! omitted.

mod fence;
pub mod normalize;
pub mod sections;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use normalize::{normalize, Analysis, EmotionMode, NormalizeOptions, Normalizer, SummaryMode};
pub use sections::{SectionGrammar, SectionLabels};

/// Placeholder values for fields that could not be resolved.
pub mod sentinel {
    pub const EMOTION_NOT_FOUND: &str = "감정 분석을 찾을 수 없습니다.";
    pub const SCORE_NOT_FOUND: &str = "총점을 찾을 수 없습니다.";
    pub const SUMMARY_NOT_FOUND: &str = "요약을 찾을 수 없습니다.";
    pub const ADVICE_NOT_FOUND: &str = "조언을 찾을 수 없습니다.";
    /// Shared by every field whose value was present but unusable.
    pub const PARSE_ERROR: &str = "파싱 오류";
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// The raw reply shape a normalization took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// A JSON object with the canonical keys.
    Json,
    /// Numbered, labelled prose sections.
    Sectioned,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Json => f.write_str("json"),
            Dialect::Sectioned => f.write_str("sectioned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// A percentage as the model wrote it: a bare number or a string such
/// as `"40%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Percentage {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentage::Number(n) => write!(f, "{n}"),
            Percentage::Text(s) => f.write_str(s.trim().trim_end_matches('%').trim_end()),
        }
    }
}

/// One `{emotion, percentage}` entry of a breakdown.
///
/// Keys beyond the two canonical ones are kept in `extra` so a JSON
/// entry serializes back exactly as the model wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionShare {
    pub emotion: String,
    pub percentage: Percentage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmotionShare {
    pub fn new(emotion: impl Into<String>, percentage: Percentage) -> Self {
        Self {
            emotion: emotion.into(),
            percentage,
            extra: Map::new(),
        }
    }
}

/// Emotion breakdown: display text, structured entries, or any other
/// JSON value the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmotionAnalysis {
    Text(String),
    Breakdown(Vec<EmotionShare>),
    Raw(Value),
}

impl EmotionAnalysis {
    /// Render as `"<emotion>: <percentage>%, ..."`; text passes through.
    ///
    /// A raw `{"<emotion>": <percentage>}` object renders the same way.
    /// Returns `None` for values with no such reading.
    pub fn flattened(&self) -> Option<String> {
        match self {
            EmotionAnalysis::Text(s) => Some(s.clone()),
            EmotionAnalysis::Breakdown(shares) => Some(
                shares
                    .iter()
                    .map(|s| format!("{}: {}%", s.emotion, s.percentage))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            EmotionAnalysis::Raw(v) => {
                let parts = object_shares(v)?
                    .iter()
                    .map(|s| format!("{}: {}%", s.emotion, s.percentage))
                    .collect::<Vec<_>>();
                Some(parts.join(", "))
            }
        }
    }

    /// Structured entries, when this value has a `{emotion, percentage}`
    /// reading that does not come from tokenizing text.
    pub(crate) fn shares(&self) -> Option<Vec<EmotionShare>> {
        match self {
            EmotionAnalysis::Breakdown(shares) => Some(shares.clone()),
            EmotionAnalysis::Raw(v) => object_shares(v),
            EmotionAnalysis::Text(_) => None,
        }
    }
}

/// Read `{"피곤함": "40%", "기쁨": 60}` as breakdown entries.
fn object_shares(v: &Value) -> Option<Vec<EmotionShare>> {
    let map = v.as_object()?;
    if map.is_empty() {
        return None;
    }
    map.iter()
        .map(|(emotion, pct)| {
            let percentage = match pct {
                Value::Number(n) => Percentage::Number(n.clone()),
                Value::String(s) => Percentage::Text(s.clone()),
                _ => return None,
            };
            Some(EmotionShare::new(emotion.as_str(), percentage))
        })
        .collect()
}

/// Day score: a JSON number or the numeral string found in prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(serde_json::Number),
    Text(String),
}

/// Summary as one string, as its individual sentences, or as any other
/// JSON value the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Summary {
    Text(String),
    Sentences(Vec<String>),
    Raw(Value),
}

impl Summary {
    /// Space-join sentences; text passes through.
    ///
    /// A raw array of scalars joins the same way. Returns `None` for
    /// values with no sentence reading.
    pub fn joined(&self) -> Option<String> {
        match self {
            Summary::Text(s) => Some(s.clone()),
            Summary::Sentences(v) => Some(join_sentences(v)),
            Summary::Raw(v) => scalar_items(v).map(|items| join_sentences(&items)),
        }
    }
}

fn join_sentences(v: &[String]) -> String {
    v.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Items of an array holding only strings, numbers and booleans.
pub(crate) fn scalar_items(v: &Value) -> Option<Vec<String>> {
    v.as_array()?
        .iter()
        .map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// The fixed four-field result returned for every analysed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub emotion_analysis: EmotionAnalysis,
    pub total_score: Score,
    pub summary: Summary,
    pub advice: String,
}

#[cfg(test)]
impl AnalysisResult {
    /// All four fields set to the parse-error sentinel.
    pub(crate) fn parse_error() -> Self {
        Self {
            emotion_analysis: EmotionAnalysis::Text(sentinel::PARSE_ERROR.into()),
            total_score: Score::Text(sentinel::PARSE_ERROR.into()),
            summary: Summary::Text(sentinel::PARSE_ERROR.into()),
            advice: sentinel::PARSE_ERROR.into(),
        }
    }
}
