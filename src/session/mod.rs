//! Lesson session state machine.
//!
//! A `LessonSession` is the single source of truth for one learner's lesson:
//! word pool, stars, display mode, explanation cache and the assessment loop.
//! It only changes through the named transition methods below, which keeps
//! every rule testable without HTTP or a model.

pub mod flow;
pub mod store;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::assessment::{AssessmentDifficulty, AssessmentQuestion};
use crate::services::deep_link;
use crate::services::explanation::WordExplanation;
use crate::services::segmentation;
use crate::services::tutor::AiOutcome;

pub use store::SessionStore;

pub const EMPTY_TEXT_MESSAGE: &str = "請輸入生字或詞語";
pub const NON_POSITIVE_COUNT_MESSAGE: &str = "題目數量必須大於 0";
pub const EMPTY_POOL_MESSAGE: &str = "請先在主頁面輸入並生成生詞";
pub const NON_CJK_WORD_MESSAGE: &str = "只可加入中文字詞";
pub const NON_CJK_QUERY_MESSAGE: &str = "只可查詢中文字詞";
pub const EMPTY_RADICAL_MESSAGE: &str = "請提供部首";
const NO_QUESTIONS_NOTICE: &str = "暫時未能生成題目，請稍後再試";
const COMPLETED_NOTICE: &str = "恭喜！已完成所有評估題目。";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
    #[error("session {0} not found")]
    NotFound(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LessonPhase {
    Idle,
    Segmenting { text: String },
    Ready,
}

impl LessonPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonPhase::Idle => "IDLE",
            LessonPhase::Segmenting { .. } => "SEGMENTING",
            LessonPhase::Ready => "READY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayMode {
    #[default]
    Normal,
    Overview,
    Assessment,
    Worksheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerFeedback {
    None,
    Correct,
    Wrong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentPhase {
    Setup,
    Generating,
    Running { index: usize, feedback: AnswerFeedback },
}

impl AssessmentPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            AssessmentPhase::Setup => "SETUP",
            AssessmentPhase::Generating => "GENERATING",
            AssessmentPhase::Running { .. } => "RUNNING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Next { index: usize },
    Completed,
}

/// Snapshot handed to the generator once `begin_assessment` succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentRequest {
    pub words: Vec<String>,
    pub count: NonZeroUsize,
    pub difficulty: AssessmentDifficulty,
}

/// Ordered, duplicate-free list of study words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordPool(Vec<String>);

impl WordPool {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pool = Vec::new();
        for word in segmentation::filter_words(words) {
            if !pool.contains(&word) {
                pool.push(word);
            }
        }
        Self(pool)
    }

    /// Puts `word` at the front, moving it there if already present.
    pub fn prepend(&mut self, word: String) {
        self.0.retain(|w| *w != word);
        self.0.insert(0, word);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AssessmentState {
    phase: AssessmentPhase,
    difficulty: AssessmentDifficulty,
    question_count: i64,
    questions: Vec<AssessmentQuestion>,
    notice: Option<&'static str>,
    completed_rounds: u32,
}

impl AssessmentState {
    fn for_pool(pool_len: usize, completed_rounds: u32) -> Self {
        Self {
            phase: AssessmentPhase::Setup,
            difficulty: AssessmentDifficulty::default(),
            question_count: pool_len as i64,
            questions: Vec::new(),
            notice: None,
            completed_rounds,
        }
    }

    pub fn phase(&self) -> AssessmentPhase {
        self.phase
    }

    pub fn difficulty(&self) -> AssessmentDifficulty {
        self.difficulty
    }

    pub fn question_count(&self) -> i64 {
        self.question_count
    }

    pub fn questions(&self) -> &[AssessmentQuestion] {
        &self.questions
    }

    pub fn notice(&self) -> Option<&'static str> {
        self.notice
    }

    pub fn completed_rounds(&self) -> u32 {
        self.completed_rounds
    }

    pub fn current_question(&self) -> Option<&AssessmentQuestion> {
        match self.phase {
            AssessmentPhase::Running { index, .. } => self.questions.get(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LessonSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_active: Instant,
    input_text: String,
    phase: LessonPhase,
    words: WordPool,
    stars: u32,
    mode: DisplayMode,
    fragment: Option<String>,
    explanations: HashMap<String, WordExplanation>,
    assessment: AssessmentState,
}

impl LessonSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            last_active: Instant::now(),
            input_text: String::new(),
            phase: LessonPhase::Idle,
            words: WordPool::default(),
            stars: 0,
            mode: DisplayMode::Normal,
            fragment: None,
            explanations: HashMap::new(),
            assessment: AssessmentState::for_pool(0, 0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn input_text(&self) -> &str {
        &self.input_text
    }

    pub fn phase(&self) -> &LessonPhase {
        &self.phase
    }

    pub fn words(&self) -> &WordPool {
        &self.words
    }

    pub fn stars(&self) -> u32 {
        self.stars
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn assessment(&self) -> &AssessmentState {
        &self.assessment
    }

    pub fn begin_segmentation(&mut self, text: &str) -> Result<String, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::Validation(EMPTY_TEXT_MESSAGE));
        }

        self.input_text = text.to_string();
        self.phase = LessonPhase::Segmenting { text: text.to_string() };
        Ok(self.input_text.clone())
    }

    /// Applies a segmentation result. Returns the new deep-link fragment, or
    /// `None` when the result is stale (reset or superseded meanwhile).
    pub fn finish_segmentation(&mut self, text: &str, words: Vec<String>) -> Option<String> {
        match &self.phase {
            LessonPhase::Segmenting { text: pending } if pending == text => {}
            _ => return None,
        }

        self.words = WordPool::from_words(words);
        self.phase = LessonPhase::Ready;
        self.assessment = AssessmentState::for_pool(self.words.len(), self.assessment.completed_rounds);

        let fragment = deep_link::build_fragment(text);
        self.fragment = Some(fragment.clone());
        Some(fragment)
    }

    /// Adds a character chosen from a radical family to the front of the pool.
    pub fn add_word(&mut self, word: &str) -> Result<(), SessionError> {
        if !segmentation::is_valid_word(word) {
            return Err(SessionError::Validation(NON_CJK_WORD_MESSAGE));
        }

        self.words.prepend(word.trim().to_string());
        if self.phase == LessonPhase::Idle {
            self.phase = LessonPhase::Ready;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.input_text.clear();
        self.words.clear();
        self.stars = 0;
        self.fragment = None;
        self.mode = DisplayMode::Normal;
        self.phase = LessonPhase::Idle;
        self.assessment = AssessmentState::for_pool(0, self.assessment.completed_rounds);
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    /// Selecting the active mode again returns to `Normal`.
    pub fn toggle_mode(&mut self, mode: DisplayMode) -> DisplayMode {
        self.mode = if self.mode == mode { DisplayMode::Normal } else { mode };
        self.mode
    }

    pub fn award_star(&mut self) -> u32 {
        self.stars = self.stars.saturating_add(1);
        self.stars
    }

    pub fn cached_explanation(&self, word: &str) -> Option<&WordExplanation> {
        self.explanations.get(word)
    }

    /// Caches model-generated explanations under the requested word;
    /// placeholders are left uncached so the next display retries.
    pub fn store_explanation(&mut self, word: &str, outcome: &AiOutcome<WordExplanation>) -> bool {
        match outcome {
            AiOutcome::Generated(explanation) => {
                self.explanations.insert(word.to_string(), explanation.clone());
                true
            }
            AiOutcome::Fallback { .. } => false,
        }
    }

    pub fn configure_assessment(
        &mut self,
        difficulty: AssessmentDifficulty,
        question_count: i64,
    ) -> Result<(), SessionError> {
        self.require_assessment_setup("configure assessment")?;
        self.assessment.difficulty = difficulty;
        self.assessment.question_count = question_count;
        Ok(())
    }

    pub fn begin_assessment(&mut self) -> Result<AssessmentRequest, SessionError> {
        self.require_assessment_setup("start assessment")?;

        let count = usize::try_from(self.assessment.question_count)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or(SessionError::Validation(NON_POSITIVE_COUNT_MESSAGE))?;
        if self.words.is_empty() {
            return Err(SessionError::Validation(EMPTY_POOL_MESSAGE));
        }

        self.assessment.phase = AssessmentPhase::Generating;
        self.assessment.notice = None;
        self.assessment.questions.clear();

        Ok(AssessmentRequest {
            words: self.words.as_slice().to_vec(),
            count,
            difficulty: self.assessment.difficulty,
        })
    }

    /// Applies a shuffled question batch. Returns `false` if the assessment
    /// left `Generating` meanwhile and the batch was discarded.
    pub fn finish_assessment(&mut self, questions: Vec<AssessmentQuestion>) -> bool {
        if self.assessment.phase != AssessmentPhase::Generating {
            return false;
        }

        if questions.is_empty() {
            self.assessment.phase = AssessmentPhase::Setup;
            self.assessment.notice = Some(NO_QUESTIONS_NOTICE);
        } else {
            self.assessment.questions = questions;
            self.assessment.phase = AssessmentPhase::Running { index: 0, feedback: AnswerFeedback::None };
        }
        true
    }

    /// Checks a dropped word against the current blank.
    pub fn submit_answer(&mut self, payload: &str) -> Result<AnswerFeedback, SessionError> {
        let AssessmentPhase::Running { index, feedback } = self.assessment.phase else {
            return Err(self.invalid_assessment("submit answer"));
        };
        if feedback == AnswerFeedback::Correct {
            return Ok(AnswerFeedback::Correct);
        }

        let feedback = if self.assessment.questions[index].target_word == payload {
            AnswerFeedback::Correct
        } else {
            AnswerFeedback::Wrong
        };
        self.assessment.phase = AssessmentPhase::Running { index, feedback };
        Ok(feedback)
    }

    pub fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        let AssessmentPhase::Running { index, feedback } = self.assessment.phase else {
            return Err(self.invalid_assessment("advance"));
        };
        if feedback != AnswerFeedback::Correct {
            return Err(SessionError::InvalidTransition { action: "advance", state: "UNANSWERED" });
        }

        if index + 1 < self.assessment.questions.len() {
            let next = index + 1;
            self.assessment.phase = AssessmentPhase::Running { index: next, feedback: AnswerFeedback::None };
            return Ok(AdvanceOutcome::Next { index: next });
        }

        let rounds = self.assessment.completed_rounds.saturating_add(1);
        let mut state = AssessmentState::for_pool(self.words.len(), rounds);
        state.difficulty = self.assessment.difficulty;
        state.question_count = self.assessment.question_count;
        state.notice = Some(COMPLETED_NOTICE);
        self.assessment = state;
        Ok(AdvanceOutcome::Completed)
    }

    fn require_assessment_setup(&self, action: &'static str) -> Result<(), SessionError> {
        if self.assessment.phase == AssessmentPhase::Setup {
            Ok(())
        } else {
            Err(self.invalid_assessment(action))
        }
    }

    fn invalid_assessment(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition { action, state: self.assessment.phase.as_str() }
    }

    pub fn view(&self) -> SessionView {
        let assessment = &self.assessment;
        let (question_index, feedback) = match assessment.phase {
            AssessmentPhase::Running { index, feedback } => (Some(index), Some(feedback)),
            _ => (None, None),
        };
        let current = assessment.current_question().map(|q| {
            let answered = feedback == Some(AnswerFeedback::Correct);
            QuestionView {
                id: q.id.clone(),
                sentence_parts: q.sentence_parts.clone(),
                full_sentence: answered.then(|| q.full_sentence.clone()),
                answer: answered.then(|| q.target_word.clone()),
            }
        });

        SessionView {
            id: self.id,
            created_at: self.created_at,
            input_text: self.input_text.clone(),
            phase: self.phase.as_str(),
            words: self.words.as_slice().to_vec(),
            stars: self.stars,
            mode: self.mode,
            fragment: self.fragment.clone(),
            assessment: AssessmentView {
                phase: assessment.phase.as_str(),
                difficulty: assessment.difficulty,
                difficulty_label: assessment.difficulty.label(),
                grade_band: assessment.difficulty.grade_band(),
                question_count: assessment.question_count,
                total_questions: assessment.questions.len(),
                question_index,
                feedback,
                current,
                notice: assessment.notice,
                completed_rounds: assessment.completed_rounds,
            },
        }
    }
}

impl Default for LessonSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub input_text: String,
    pub phase: &'static str,
    pub words: Vec<String>,
    pub stars: u32,
    pub mode: DisplayMode,
    pub fragment: Option<String>,
    pub assessment: AssessmentView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub phase: &'static str,
    pub difficulty: AssessmentDifficulty,
    pub difficulty_label: &'static str,
    pub grade_band: &'static str,
    pub question_count: i64,
    pub total_questions: usize,
    pub question_index: Option<usize>,
    pub feedback: Option<AnswerFeedback>,
    pub current: Option<QuestionView>,
    pub notice: Option<&'static str>,
    pub completed_rounds: u32,
}

/// The blank as shown to the learner; the answer is revealed once matched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub sentence_parts: [String; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_sentence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}
