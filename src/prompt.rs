//! Built-in assistant instructions.
//!
//! The wording is opaque to the rest of the crate; it only has to make
//! the model answer in one of the two dialects the normalizer reads.
//! `analysis.instructions_file` in the config replaces these entirely.

use serde::{Deserialize, Serialize};

/// Which reply dialect the assistant is instructed to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDialect {
    /// Numbered sections: 감정 분석 / 요약 / 조언.
    #[default]
    Prose,
    /// A single JSON object with the four canonical keys.
    Json,
}

impl PromptDialect {
    pub fn instructions(self) -> &'static str {
        match self {
            PromptDialect::Prose => PROSE_INSTRUCTIONS,
            PromptDialect::Json => JSON_INSTRUCTIONS,
        }
    }
}

pub const PROSE_INSTRUCTIONS: &str = "\
너는 사용자의 일기를 분석하는 역할이야. 다음 세 가지 정보를 제공해야 해:

1. 감정 분석:
   - 주요 감정들을 구체적으로 나열하고 각각의 비율(%)을 제시해. (예: 피곤함: 40%, 기쁨: 30%, 불안: 20%, 기대: 10%)
   - 감정은 '부정', '긍정', '중립' 등의 일반적인 카테고리가 아닌, 구체적인 감정 단어를 사용해야 해.
   - 최소 3개, 최대 5개의 감정을 나열해.
   - 반드시 오늘 하루의 총점(0-5점, 0.5점 단위)을 제시해. (예: 총점: 3.5/5)

2. 요약:
   - 사용자의 하루를 객관적으로 요약해줘.
   - 정확히 3문장으로 작성해.
   - 각 문장은 반드시 '-했어요' 어미로 끝나야 해.
   - '-'나 다른 기호 없이 문장만 작성해.

3. 조언:
   - 사용자의 감정 상태에 맞는 따뜻한 위로나 조언을 제공해.
   - 100-300단어 정도로 작성해.

반드시 위의 순서와 형식을 지켜서 답변해줘. 각 섹션 시작 시 번호와 제목을 명확히 표시해.";

pub const JSON_INSTRUCTIONS: &str = "\
너는 사용자의 일기를 분석하는 역할이야. 답변은 반드시 아래 형식의 JSON 객체 하나로만 작성해. 코드 블록이나 다른 설명은 붙이지 마.

{
  \"emotion_analysis\": [
    { \"emotion\": \"피곤함\", \"percentage\": 40 },
    { \"emotion\": \"기쁨\", \"percentage\": 30 }
  ],
  \"total_score\": 3.5,
  \"summary\": [\"첫 번째 문장.\", \"두 번째 문장.\", \"세 번째 문장.\"],
  \"advice\": \"따뜻한 위로나 조언\"
}

- emotion_analysis: 구체적인 감정 단어 3~5개와 비율(합계 100).
- total_score: 오늘 하루의 총점 (0-5, 0.5 단위 숫자).
- summary: 하루를 객관적으로 요약한 정확히 3문장, 각 문장은 '-했어요'로 끝나.
- advice: 감정 상태에 맞는 따뜻한 위로나 조언, 100-300단어.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SectionGrammar;

    #[test]
    fn prose_prompt_names_every_section_marker() {
        let g = SectionGrammar::default_grammar();
        let text = PromptDialect::Prose.instructions();
        for section in [
            crate::analysis::sections::Section::Emotion,
            crate::analysis::sections::Section::Summary,
            crate::analysis::sections::Section::Advice,
        ] {
            assert!(g.section(text, section).is_some(), "{section:?} marker missing");
        }
    }

    #[test]
    fn json_prompt_example_is_valid_json() {
        let text = PromptDialect::Json.instructions();
        let start = text.find('{').unwrap();
        let end = text.rfind('}').unwrap();
        let v: serde_json::Value = serde_json::from_str(&text[start..=end]).unwrap();
        for key in ["emotion_analysis", "total_score", "summary", "advice"] {
            assert!(v.get(key).is_some(), "{key} missing from example");
        }
    }
}
