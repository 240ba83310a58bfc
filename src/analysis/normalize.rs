//! Reply normalizer: raw model text → [`AnalysisResult`].
//!
//! The dialect is picked by attempting JSON first (after peeling off a
//! lone fenced block); anything that is not a JSON object goes through
//! the sectioned-prose grammar.  Each field is extracted independently,
//! so one unresolvable field never hides the others.  Only when all four
//! come back "not found" does normalization fail, with
//! [`AnalysisError::AllFieldsMissing`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::fence::unwrap_fenced_json;
use super::sections::{clean_body, collapse_whitespace, split_sentences, Section, SectionGrammar};
use super::{
    scalar_items, sentinel, AnalysisResult, Dialect, EmotionAnalysis, EmotionShare, Percentage,
    Score, Summary,
};
use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Output shape of `emotion_analysis`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionMode {
    /// JSON values as given; prose section text.
    #[default]
    Preserve,
    /// Always a `"<emotion>: <percentage>%, ..."` string.
    Flattened,
    /// `{emotion, percentage}` entries wherever `label: N%` tokens exist.
    Structured,
}

/// Output shape of `summary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    #[default]
    Preserve,
    /// Sentences joined with single spaces.
    Joined,
    /// A list of sentences.
    Sentences,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    #[serde(default)]
    pub emotion: EmotionMode,
    #[serde(default)]
    pub summary: SummaryMode,
}

/// A normalized reply together with the dialect it was read as.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub dialect: Dialect,
    pub result: AnalysisResult,
}

// ---------------------------------------------------------------------------
// Field extraction state
// ---------------------------------------------------------------------------

/// Outcome of extracting one field.
#[derive(Debug, Clone, PartialEq)]
enum Field<T> {
    Found(T),
    Missing,
    Malformed,
}

/// A projection that has no reading is malformed.
impl<T> From<Option<T>> for Field<T> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Field::Malformed, Field::Found)
    }
}

impl<T> Field<T> {
    fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    fn and_then<U>(self, f: impl FnOnce(T) -> Field<U>) -> Field<U> {
        match self {
            Field::Found(v) => f(v),
            Field::Missing => Field::Missing,
            Field::Malformed => Field::Malformed,
        }
    }

    fn resolve(self, not_found: &str, wrap: impl Fn(String) -> T) -> T {
        match self {
            Field::Found(v) => v,
            Field::Missing => wrap(not_found.to_string()),
            Field::Malformed => wrap(sentinel::PARSE_ERROR.to_string()),
        }
    }
}

struct Fields {
    emotion: Field<EmotionAnalysis>,
    score: Field<Score>,
    summary: Field<Summary>,
    advice: Field<String>,
}

impl Fields {
    fn all_missing(&self) -> bool {
        self.emotion.is_missing()
            && self.score.is_missing()
            && self.summary.is_missing()
            && self.advice.is_missing()
    }

    fn missing_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.emotion.is_missing() {
            names.push("emotion_analysis");
        }
        if self.score.is_missing() {
            names.push("total_score");
        }
        if self.summary.is_missing() {
            names.push("summary");
        }
        if self.advice.is_missing() {
            names.push("advice");
        }
        names
    }

    fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            emotion_analysis: self
                .emotion
                .resolve(sentinel::EMOTION_NOT_FOUND, EmotionAnalysis::Text),
            total_score: self.score.resolve(sentinel::SCORE_NOT_FOUND, Score::Text),
            summary: self.summary.resolve(sentinel::SUMMARY_NOT_FOUND, Summary::Text),
            advice: self.advice.resolve(sentinel::ADVICE_NOT_FOUND, |s| s),
        }
    }
}

// ---------------------------------------------------------------------------
// Dialect detection
// ---------------------------------------------------------------------------

enum RawReply<'a> {
    Json(Map<String, Value>),
    Sectioned(&'a str),
}

impl<'a> RawReply<'a> {
    fn detect(raw: &'a str) -> Self {
        let candidate = unwrap_fenced_json(raw);
        let text = candidate.as_deref().unwrap_or(raw).trim();
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => RawReply::Json(map),
            _ => RawReply::Sectioned(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Stateless reply normalizer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    options: NormalizeOptions,
    grammar: SectionGrammar,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizeOptions::default())
    }
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self::with_grammar(options, SectionGrammar::default_grammar().clone())
    }

    /// Normalizer using custom section labels.
    pub fn with_grammar(options: NormalizeOptions, grammar: SectionGrammar) -> Self {
        Self { options, grammar }
    }

    /// Convert `raw` into the canonical schema.
    ///
    /// Fails only with [`AnalysisError::AllFieldsMissing`].
    pub fn normalize(&self, raw: &str) -> Result<Analysis, AnalysisError> {
        let (dialect, fields) = match RawReply::detect(raw) {
            RawReply::Json(map) => (Dialect::Json, self.json_fields(&map)),
            RawReply::Sectioned(text) => (Dialect::Sectioned, self.prose_fields(text)),
        };

        if fields.all_missing() {
            debug!(%dialect, len = raw.len(), "reply has no recognizable fields");
            return Err(AnalysisError::AllFieldsMissing { dialect });
        }

        let missing = fields.missing_names();
        if !missing.is_empty() {
            debug!(%dialect, ?missing, "reply partially parsed");
        }

        Ok(Analysis {
            dialect,
            result: fields.into_result(),
        })
    }

    // -- JSON dialect ---------------------------------------------------

    fn json_fields(&self, map: &Map<String, Value>) -> Fields {
        let emotion = json_value(map, "emotion_analysis").and_then(|v| {
            let e = serde_json::from_value(v.clone()).unwrap_or(EmotionAnalysis::Raw(v));
            self.shape_emotion(e)
        });

        let score = json_value(map, "total_score").and_then(|v| match v {
            Value::Number(n) => Field::Found(Score::Number(n)),
            Value::String(s) => Field::Found(Score::Text(s)),
            _ => Field::Malformed,
        });

        let summary = json_value(map, "summary").and_then(|v| {
            let s = serde_json::from_value(v.clone()).unwrap_or(Summary::Raw(v));
            self.shape_summary(s)
        });

        let advice = json_value(map, "advice").and_then(|v| match v {
            Value::String(s) => Field::Found(s),
            _ => Field::Malformed,
        });

        Fields {
            emotion,
            score,
            summary,
            advice,
        }
    }

    // -- sectioned dialect ----------------------------------------------

    fn prose_fields(&self, text: &str) -> Fields {
        let emotion_body = self.grammar.section(text, Section::Emotion).map(clean_body);

        let score = match emotion_body {
            None => Field::Missing,
            Some(body) => match self.grammar.score(body) {
                None => Field::Missing,
                Some(numeral) if is_valid_score(numeral) => {
                    Field::Found(Score::Text(numeral.to_string()))
                }
                Some(_) => Field::Malformed,
            },
        };

        let emotion = match emotion_body {
            None => Field::Missing,
            Some(body) => Field::Found(self.prose_emotion(body)),
        };

        let summary = match self.grammar.section(text, Section::Summary) {
            None => Field::Missing,
            Some(body) => {
                let joined = collapse_whitespace(clean_body(body));
                self.shape_summary(Summary::Text(joined))
            }
        };

        let advice = match self.grammar.section(text, Section::Advice) {
            None => Field::Missing,
            Some(body) => Field::Found(clean_body(body).to_string()),
        };

        Fields {
            emotion,
            score,
            summary,
            advice,
        }
    }

    fn prose_emotion(&self, body: &str) -> EmotionAnalysis {
        if self.options.emotion == EmotionMode::Structured {
            if let Some(shares) = self.tokenize_shares(body) {
                return EmotionAnalysis::Breakdown(shares);
            }
        }
        EmotionAnalysis::Text(collapse_whitespace(body))
    }

    // -- output shaping -------------------------------------------------

    fn tokenize_shares(&self, body: &str) -> Option<Vec<EmotionShare>> {
        let shares: Vec<EmotionShare> = self
            .grammar
            .shares(body)
            .into_iter()
            .map(|(label, value)| {
                let percentage = match value.parse::<serde_json::Number>() {
                    Ok(n) => Percentage::Number(n),
                    Err(_) => Percentage::Text(value.to_string()),
                };
                EmotionShare::new(label, percentage)
            })
            .collect();
        (!shares.is_empty()).then_some(shares)
    }

    /// Preserve keeps JSON values as given. The other modes project onto
    /// their shape, and a value with no such reading is malformed.
    fn shape_emotion(&self, e: EmotionAnalysis) -> Field<EmotionAnalysis> {
        match (self.options.emotion, e) {
            (EmotionMode::Preserve, e) => Field::Found(e),
            (EmotionMode::Flattened, e) => e.flattened().map(EmotionAnalysis::Text).into(),
            (EmotionMode::Structured, EmotionAnalysis::Text(s)) => {
                Field::Found(match self.tokenize_shares(&s) {
                    Some(shares) => EmotionAnalysis::Breakdown(shares),
                    None => EmotionAnalysis::Text(s),
                })
            }
            (EmotionMode::Structured, e) => e.shares().map(EmotionAnalysis::Breakdown).into(),
        }
    }

    fn shape_summary(&self, s: Summary) -> Field<Summary> {
        match (self.options.summary, s) {
            (SummaryMode::Preserve, s) => Field::Found(s),
            (SummaryMode::Joined, s) => s.joined().map(Summary::Text).into(),
            (SummaryMode::Sentences, Summary::Text(t)) => {
                Field::Found(Summary::Sentences(split_sentences(&t)))
            }
            (SummaryMode::Sentences, Summary::Sentences(v)) => Field::Found(Summary::Sentences(v)),
            (SummaryMode::Sentences, Summary::Raw(v)) => {
                scalar_items(&v).map(Summary::Sentences).into()
            }
        }
    }
}

/// A key's value; absent and `null` both count as missing.
fn json_value(map: &Map<String, Value>, key: &str) -> Field<Value> {
    match map.get(key) {
        None | Some(Value::Null) => Field::Missing,
        Some(v) => Field::Found(v.clone()),
    }
}

/// A score numeral must lie in 0–5 on a half-point step.
fn is_valid_score(numeral: &str) -> bool {
    numeral
        .parse::<f64>()
        .map(|v| (0.0..=5.0).contains(&v) && (v * 2.0).fract() == 0.0)
        .unwrap_or(false)
}

/// Normalize with default options and the built-in grammar.
pub fn normalize(raw: &str) -> Result<Analysis, AnalysisError> {
    Normalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with(emotion: EmotionMode, summary: SummaryMode) -> Normalizer {
        Normalizer::new(NormalizeOptions { emotion, summary })
    }

    #[test]
    fn reference_prose_example() {
        let raw = "1. 감정 분석: 피곤함: 40%\n총점: 3.5/5\n\n2. 요약: 오늘 일했어요.\n\n3. 조언: 잘하셨어요.";
        let a = normalize(raw).unwrap();
        assert_eq!(a.dialect, Dialect::Sectioned);
        assert_eq!(
            serde_json::to_value(&a.result).unwrap(),
            json!({
                "emotion_analysis": "피곤함: 40% 총점: 3.5/5",
                "total_score": "3.5",
                "summary": "오늘 일했어요.",
                "advice": "잘하셨어요."
            })
        );
    }

    #[test]
    fn advice_keeps_internal_newlines() {
        let raw = "1. 감정 분석: 기쁨: 50%\n총점: 4/5\n2. 요약: 좋았어요.\n3. 조언: 첫째,\n푹 자세요.\n\n둘째, 물을 드세요.";
        let a = normalize(raw).unwrap();
        assert_eq!(a.result.advice, "첫째,\n푹 자세요.\n\n둘째, 물을 드세요.");
    }

    #[test]
    fn summary_newlines_collapse() {
        let raw = "2. 요약:\n오늘 출근했어요.\n  점심을 먹었어요.\n\n퇴근했어요.\n3. 조언: 쉬세요.";
        let a = normalize(raw).unwrap();
        assert_eq!(
            a.result.summary,
            Summary::Text("오늘 출근했어요. 점심을 먹었어요. 퇴근했어요.".into())
        );
    }

    #[test]
    fn score_out_of_range_is_parse_error() {
        let raw = "1. 감정 분석: 기쁨: 100%\n총점: 7/5\n2. 요약: a.\n3. 조언: b.";
        let a = normalize(raw).unwrap();
        assert_eq!(a.result.total_score, Score::Text(sentinel::PARSE_ERROR.into()));

        let raw = "1. 감정 분석: 기쁨: 100%\n총점: 3.3/5\n2. 요약: a.\n3. 조언: b.";
        let a = normalize(raw).unwrap();
        assert_eq!(a.result.total_score, Score::Text(sentinel::PARSE_ERROR.into()));
    }

    #[test]
    fn missing_score_marker_is_not_found() {
        let raw = "1. 감정 분석: 기쁨: 100%\n2. 요약: a.\n3. 조언: b.";
        let a = normalize(raw).unwrap();
        assert_eq!(a.result.total_score, Score::Text(sentinel::SCORE_NOT_FOUND.into()));
    }

    #[test]
    fn structured_mode_tokenizes_prose_emotions() {
        let raw = "1. 감정 분석: 피곤함: 40%, 기쁨: 30%, 불안: 30%\n총점: 3/5\n2. 요약: a.\n3. 조언: b.";
        let a = with(EmotionMode::Structured, SummaryMode::Preserve)
            .normalize(raw)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&a.result.emotion_analysis).unwrap(),
            json!([
                { "emotion": "피곤함", "percentage": 40 },
                { "emotion": "기쁨", "percentage": 30 },
                { "emotion": "불안", "percentage": 30 }
            ])
        );
    }

    #[test]
    fn structured_mode_without_tokens_keeps_text() {
        let raw = "1. 감정 분석: 대체로 평온함\n2. 요약: a.\n3. 조언: b.";
        let a = with(EmotionMode::Structured, SummaryMode::Preserve)
            .normalize(raw)
            .unwrap();
        assert_eq!(a.result.emotion_analysis, EmotionAnalysis::Text("대체로 평온함".into()));
    }

    #[test]
    fn json_flattened_and_joined() {
        let raw = json!({
            "emotion_analysis": [
                { "emotion": "피곤함", "percentage": 40 },
                { "emotion": "기쁨", "percentage": 60 }
            ],
            "total_score": 3.5,
            "summary": ["출근했어요.", "퇴근했어요."],
            "advice": "쉬세요."
        })
        .to_string();
        let a = with(EmotionMode::Flattened, SummaryMode::Joined)
            .normalize(&raw)
            .unwrap();
        assert_eq!(a.dialect, Dialect::Json);
        assert_eq!(
            a.result.emotion_analysis,
            EmotionAnalysis::Text("피곤함: 40%, 기쁨: 60%".into())
        );
        assert_eq!(a.result.summary, Summary::Text("출근했어요. 퇴근했어요.".into()));
        assert_eq!(
            serde_json::to_value(&a.result.total_score).unwrap(),
            json!(3.5)
        );
    }

    #[test]
    fn json_wrong_types_become_parse_errors() {
        let raw = json!({
            "emotion_analysis": true,
            "total_score": true,
            "summary": { "morning": "출근" },
            "advice": ["not", "a", "string"]
        })
        .to_string();
        let a = with(EmotionMode::Flattened, SummaryMode::Joined)
            .normalize(&raw)
            .unwrap();
        assert_eq!(a.result, AnalysisResult::parse_error());

        let a = with(EmotionMode::Structured, SummaryMode::Sentences)
            .normalize(&raw)
            .unwrap();
        assert_eq!(a.result, AnalysisResult::parse_error());
    }

    #[test]
    fn preserve_passes_json_values_through() {
        let input = json!({
            "emotion_analysis": [
                { "emotion": "피곤함", "percentage": 40, "reason": "야근" }
            ],
            "total_score": 3,
            "summary": ["출근했어요.", 2, "퇴근했어요."],
            "advice": "쉬세요."
        });
        let a = normalize(&input.to_string()).unwrap();
        assert_eq!(serde_json::to_value(&a.result).unwrap(), input);

        let input = json!({
            "emotion_analysis": { "피곤함": "40%", "기쁨": "60%" },
            "total_score": "4",
            "summary": { "morning": "출근" },
            "advice": "쉬세요."
        });
        let a = normalize(&input.to_string()).unwrap();
        assert_eq!(serde_json::to_value(&a.result).unwrap(), input);
    }

    #[test]
    fn preserve_still_rejects_non_scalar_score_and_advice() {
        let raw = json!({ "total_score": [3], "advice": { "tip": "x" } }).to_string();
        let a = normalize(&raw).unwrap();
        assert_eq!(a.result.total_score, Score::Text(sentinel::PARSE_ERROR.into()));
        assert_eq!(a.result.advice, sentinel::PARSE_ERROR);
    }

    #[test]
    fn object_emotion_projects_in_other_modes() {
        let raw = json!({
            "emotion_analysis": { "기쁨": 60, "피곤함": "40%" },
            "summary": ["출근했어요.", 2]
        })
        .to_string();
        let a = with(EmotionMode::Flattened, SummaryMode::Joined)
            .normalize(&raw)
            .unwrap();
        assert_eq!(
            a.result.emotion_analysis,
            EmotionAnalysis::Text("기쁨: 60%, 피곤함: 40%".into())
        );
        assert_eq!(a.result.summary, Summary::Text("출근했어요. 2".into()));

        let a = with(EmotionMode::Structured, SummaryMode::Sentences)
            .normalize(&raw)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&a.result.emotion_analysis).unwrap(),
            json!([
                { "emotion": "기쁨", "percentage": 60 },
                { "emotion": "피곤함", "percentage": "40%" }
            ])
        );
        assert_eq!(
            a.result.summary,
            Summary::Sentences(vec!["출근했어요.".into(), "2".into()])
        );
    }

    #[test]
    fn json_null_counts_as_missing() {
        let raw = r#"{"emotion_analysis": null, "total_score": null, "summary": null, "advice": null}"#;
        assert!(matches!(
            normalize(raw),
            Err(AnalysisError::AllFieldsMissing { dialect: Dialect::Json })
        ));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"advice\": \"물을 드세요.\"}\n```";
        let a = normalize(raw).unwrap();
        assert_eq!(a.dialect, Dialect::Json);
        assert_eq!(a.result.advice, "물을 드세요.");
        assert_eq!(
            a.result.summary,
            Summary::Text(sentinel::SUMMARY_NOT_FOUND.into())
        );
    }

    #[test]
    fn non_object_json_falls_back_to_prose() {
        assert!(matches!(
            normalize("42"),
            Err(AnalysisError::AllFieldsMissing { dialect: Dialect::Sectioned })
        ));
    }

    #[test]
    fn sentences_mode_splits_prose_summary() {
        let raw = "2. 요약: 출근했어요. 일했어요. 퇴근했어요.\n3. 조언: 쉬세요.";
        let a = with(EmotionMode::Preserve, SummaryMode::Sentences)
            .normalize(raw)
            .unwrap();
        assert_eq!(
            a.result.summary,
            Summary::Sentences(vec![
                "출근했어요.".into(),
                "일했어요.".into(),
                "퇴근했어요.".into()
            ])
        );
    }

    #[test]
    fn half_point_scores() {
        assert!(is_valid_score("0"));
        assert!(is_valid_score("4.5"));
        assert!(is_valid_score("5.0"));
        assert!(!is_valid_score("5.5"));
        assert!(!is_valid_score("2.25"));
    }
}
