use serde::{Deserialize, Serialize};

use crate::services::llm_provider::{strip_code_fence, LLMError};

pub const PLACEHOLDER_DEFINITION: &str = "暫無詳細解釋";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleSentence {
    pub text: String,
    pub part_of_speech_in_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordExplanation {
    pub word: String,
    pub definition: String,
    pub sentences: Vec<ExampleSentence>,
    pub parts_of_speech: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etymology: Option<String>,
    pub radical: String,
}

impl WordExplanation {
    pub fn placeholder(word: &str) -> Self {
        Self {
            word: word.to_string(),
            definition: PLACEHOLDER_DEFINITION.to_string(),
            sentences: Vec::new(),
            parts_of_speech: Vec::new(),
            etymology: None,
            radical: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.definition == PLACEHOLDER_DEFINITION && self.sentences.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentencePayload {
    text: String,
    pos_in_sentence: String,
}

#[derive(Debug, Deserialize)]
struct ExplanationPayload {
    word: String,
    definition: String,
    sentences: Vec<SentencePayload>,
    pos: Vec<String>,
    #[serde(default)]
    etymology: Option<String>,
    radical: String,
}

/// Parses the model's explanation object. Missing required fields or a blank
/// definition are an error; the caller substitutes the placeholder.
pub fn parse_explanation(raw: &str) -> Result<WordExplanation, LLMError> {
    let payload: ExplanationPayload = serde_json::from_str(strip_code_fence(raw))?;
    if payload.definition.trim().is_empty() {
        return Err(LLMError::SchemaMismatch("blank definition".to_string()));
    }

    Ok(WordExplanation {
        word: payload.word,
        definition: payload.definition,
        sentences: payload
            .sentences
            .into_iter()
            .map(|s| ExampleSentence { text: s.text, part_of_speech_in_context: s.pos_in_sentence })
            .collect(),
        parts_of_speech: payload.pos,
        etymology: payload.etymology.filter(|e| !e.trim().is_empty()),
        radical: payload.radical,
    })
}

pub fn parse_radical_examples(raw: &str) -> Result<Vec<String>, LLMError> {
    let characters: Vec<String> = serde_json::from_str(strip_code_fence(raw))?;
    Ok(characters
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}
