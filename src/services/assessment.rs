use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::llm_provider::{strip_code_fence, LLMError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssessmentDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl AssessmentDifficulty {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
        }
    }

    pub const fn grade_band(self) -> &'static str {
        match self {
            Self::Easy => "小學一年級至二年級",
            Self::Medium => "小學三年級至四年級",
            Self::Hard => "小學五年級至六年級",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Easy => "容易",
            Self::Medium => "適中",
            Self::Hard => "困難",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentQuestion {
    pub id: String,
    pub target_word: String,
    pub sentence_parts: [String; 2],
    pub full_sentence: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionPayload {
    id: String,
    target_word: String,
    full_sentence: String,
    sentence_parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionRejection {
    TargetNotInPool,
    PartsNotPair(usize),
    TargetMissingFromSentence,
    PartsDoNotBracket,
    DuplicateSentence,
}

/// Parses a question batch and drops entries that break the generation contract
/// for `pool`.
pub fn parse_questions(raw: &str, pool: &[String]) -> Result<Vec<AssessmentQuestion>, LLMError> {
    let payloads: Vec<QuestionPayload> = serde_json::from_str(strip_code_fence(raw))?;
    let total = payloads.len();

    let pool: HashSet<&str> = pool.iter().map(String::as_str).collect();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut questions = Vec::with_capacity(total);

    for payload in payloads {
        match validate_question(payload, &pool, &mut seen) {
            Ok(question) => questions.push(question),
            Err((id, reason)) => {
                warn!(question_id = %id, ?reason, "dropping assessment question");
            }
        }
    }

    if questions.len() < total {
        warn!(kept = questions.len(), total, "assessment batch had contract violations");
    }

    Ok(questions)
}

fn validate_question(
    payload: QuestionPayload,
    pool: &HashSet<&str>,
    seen: &mut HashSet<(String, String)>,
) -> Result<AssessmentQuestion, (String, QuestionRejection)> {
    if !pool.contains(payload.target_word.as_str()) {
        return Err((payload.id, QuestionRejection::TargetNotInPool));
    }
    if !payload.full_sentence.contains(&payload.target_word) {
        return Err((payload.id, QuestionRejection::TargetMissingFromSentence));
    }
    let parts: [String; 2] = match payload.sentence_parts.try_into() {
        Ok(parts) => parts,
        Err(parts) => return Err((payload.id, QuestionRejection::PartsNotPair(parts.len()))),
    };
    if !brackets_single_blank(&parts, &payload.target_word, &payload.full_sentence) {
        return Err((payload.id, QuestionRejection::PartsDoNotBracket));
    }
    if !seen.insert((payload.target_word.clone(), payload.full_sentence.clone())) {
        return Err((payload.id, QuestionRejection::DuplicateSentence));
    }

    Ok(AssessmentQuestion {
        id: payload.id,
        target_word: payload.target_word,
        sentence_parts: parts,
        full_sentence: payload.full_sentence,
    })
}

/// The blank must sit where the only occurrence of `target` is, so the rendered
/// question reads back as `full_sentence`.
fn brackets_single_blank(parts: &[String; 2], target: &str, full_sentence: &str) -> bool {
    full_sentence.matches(target).count() == 1
        && format!("{}{}{}", parts[0], target, parts[1]) == full_sentence
}

/// Uniform random permutation of a generated batch.
pub fn shuffle_questions<R: Rng + ?Sized>(questions: &mut [AssessmentQuestion], rng: &mut R) {
    questions.shuffle(rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool() -> Vec<String> {
        vec!["打".to_string(), "掃".to_string()]
    }

    fn question(id: &str, target: &str, before: &str, after: &str) -> AssessmentQuestion {
        AssessmentQuestion {
            id: id.to_string(),
            target_word: target.to_string(),
            sentence_parts: [before.to_string(), after.to_string()],
            full_sentence: format!("{before}{target}{after}"),
        }
    }

    #[test]
    fn grade_bands_are_fixed() {
        assert_eq!(AssessmentDifficulty::Easy.grade_band(), "小學一年級至二年級");
        assert_eq!(AssessmentDifficulty::Medium.grade_band(), "小學三年級至四年級");
        assert_eq!(AssessmentDifficulty::Hard.grade_band(), "小學五年級至六年級");
    }

    #[test]
    fn difficulty_serializes_uppercase() {
        let value = serde_json::to_value(AssessmentDifficulty::Medium).unwrap();
        assert_eq!(value, "MEDIUM");
        let parsed: AssessmentDifficulty = serde_json::from_value(serde_json::json!("HARD")).unwrap();
        assert_eq!(parsed, AssessmentDifficulty::Hard);
        assert!(serde_json::from_value::<AssessmentDifficulty>(serde_json::json!("EXTREME")).is_err());
    }

    #[test]
    fn parse_keeps_valid_questions() {
        let raw = r#"[
            {"id":"1","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我","球。"]},
            {"id":"2","targetWord":"掃","fullSentence":"他掃地。","sentenceParts":["他","地。"]}
        ]"#;
        let questions = parse_questions(raw, &pool()).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].sentence_parts[0], "我");
        assert_eq!(questions[1].sentence_parts[1], "地。");
    }

    #[test]
    fn parse_drops_contract_violations() {
        let raw = r#"[
            {"id":"1","targetWord":"跑","fullSentence":"我跑步。","sentenceParts":["我","步。"]},
            {"id":"2","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我打球。"]},
            {"id":"3","targetWord":"掃","fullSentence":"他拖地。","sentenceParts":["他","地。"]},
            {"id":"4","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我","球。"]},
            {"id":"5","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我","球。"]}
        ]"#;
        let questions = parse_questions(raw, &pool()).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "4");
    }

    #[test]
    fn parse_drops_parts_that_do_not_bracket_target() {
        let raw = r#"[
            {"id":"1","targetWord":"打","fullSentence":"我打球。","sentenceParts":["他","地。"]},
            {"id":"2","targetWord":"打","fullSentence":"打打打。","sentenceParts":["","打打。"]},
            {"id":"3","targetWord":"掃","fullSentence":"他掃地。","sentenceParts":["他掃","。"]}
        ]"#;
        let questions = parse_questions(raw, &pool()).unwrap();
        assert!(questions.is_empty());
    }

    #[test]
    fn bracket_check_requires_single_occurrence() {
        let parts = ["我".to_string(), "球。".to_string()];
        assert!(brackets_single_blank(&parts, "打", "我打球。"));
        assert!(!brackets_single_blank(&parts, "打", "我打打球。"));
        let doubled = ["".to_string(), "打打。".to_string()];
        assert!(!brackets_single_blank(&doubled, "打", "打打打。"));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let raw = r#"[{"id":"1","targetWord":"打","sentenceParts":["我","球"]}]"#;
        assert!(parse_questions(raw, &pool()).is_err());
    }

    #[test]
    fn shuffle_is_deterministic_for_seed() {
        let original: Vec<AssessmentQuestion> = (0..6)
            .map(|i| question(&i.to_string(), "打", &format!("第{i}句"), "。"))
            .collect();

        let mut a = original.clone();
        let mut b = original.clone();
        shuffle_questions(&mut a, &mut StdRng::seed_from_u64(7));
        shuffle_questions(&mut b, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);

        let mut ids: Vec<String> = a.iter().map(|q| q.id.clone()).collect();
        ids.sort();
        let mut expected: Vec<String> = original.iter().map(|q| q.id.clone()).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }
}
