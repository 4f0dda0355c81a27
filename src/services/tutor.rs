use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::services::assessment::{self, AssessmentDifficulty, AssessmentQuestion};
use crate::services::explanation::{self, WordExplanation};
use crate::services::llm_provider::{GenerateRequest, GenerativeModel, LLMError};
use crate::services::prompts;
use crate::services::segmentation;

/// Result of a lesson generation. A failed model call still yields a usable value.
#[derive(Debug, Clone, PartialEq)]
pub enum AiOutcome<T> {
    Generated(T),
    Fallback { value: T, reason: String },
}

impl<T> AiOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Generated(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Generated(value) | Self::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn source(&self) -> OutcomeSource {
        match self {
            Self::Generated(_) => OutcomeSource::Model,
            Self::Fallback { .. } => OutcomeSource::Fallback,
        }
    }

    fn fallback(value: T, error: &LLMError) -> Self {
        Self::Fallback { value, reason: error.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSource {
    Model,
    Fallback,
}

/// The four lesson generations, each absorbing model failures into a fallback.
#[derive(Clone)]
pub struct LessonTutor {
    model: Arc<dyn GenerativeModel>,
}

impl LessonTutor {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub fn model_available(&self) -> bool {
        self.model.is_available()
    }

    async fn call(&self, request: GenerateRequest) -> Result<String, LLMError> {
        self.model.generate_json(&request).await
    }

    pub async fn segment(&self, text: &str) -> AiOutcome<Vec<String>> {
        let result = match self.call(prompts::segmentation_request(text)).await {
            Ok(raw) => segmentation::parse_segments(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(words) => {
                debug!(count = words.len(), "segmentation generated");
                AiOutcome::Generated(words)
            }
            Err(e) => {
                warn!(error = %e, "segmentation failed, splitting on punctuation");
                AiOutcome::fallback(segmentation::fallback_split(text), &e)
            }
        }
    }

    pub async fn explain(&self, word: &str) -> AiOutcome<WordExplanation> {
        let result = match self.call(prompts::explanation_request(word)).await {
            Ok(raw) => explanation::parse_explanation(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(explanation) => AiOutcome::Generated(explanation),
            Err(e) => {
                warn!(error = %e, word, "explanation failed, using placeholder");
                AiOutcome::fallback(WordExplanation::placeholder(word), &e)
            }
        }
    }

    pub async fn radical_examples(&self, radical: &str) -> AiOutcome<Vec<String>> {
        let result = match self.call(prompts::radical_examples_request(radical)).await {
            Ok(raw) => explanation::parse_radical_examples(&raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(characters) => AiOutcome::Generated(characters),
            Err(e) => {
                warn!(error = %e, radical, "radical examples failed");
                AiOutcome::fallback(Vec::new(), &e)
            }
        }
    }

    /// Generates a question batch in model order; callers shuffle before presenting.
    pub async fn generate_assessment(
        &self,
        words: &[String],
        count: NonZeroUsize,
        difficulty: AssessmentDifficulty,
    ) -> AiOutcome<Vec<AssessmentQuestion>> {
        let request = prompts::assessment_request(words, count.get(), difficulty);
        let result = match self.call(request).await {
            Ok(raw) => assessment::parse_questions(&raw, words),
            Err(e) => Err(e),
        };

        match result {
            Ok(questions) => {
                if questions.len() != count.get() {
                    warn!(requested = count.get(), received = questions.len(), "assessment count differs");
                }
                AiOutcome::Generated(questions)
            }
            Err(e) => {
                warn!(error = %e, difficulty = difficulty.as_str(), "assessment generation failed");
                AiOutcome::fallback(Vec::new(), &e)
            }
        }
    }
}
