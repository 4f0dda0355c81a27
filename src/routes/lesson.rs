//! Stateless lesson generations. Each call stands alone; session-scoped
//! variants live in `sessions`.

use std::num::NonZeroUsize;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::response::{ok, AppError};
use crate::services::assessment::{shuffle_questions, AssessmentDifficulty, AssessmentQuestion};
use crate::services::explanation::WordExplanation;
use crate::services::segmentation;
use crate::services::tutor::OutcomeSource;
use crate::session::{
    WordPool, EMPTY_POOL_MESSAGE, EMPTY_RADICAL_MESSAGE, EMPTY_TEXT_MESSAGE,
    NON_CJK_QUERY_MESSAGE, NON_POSITIVE_COUNT_MESSAGE,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/segment", post(segment))
        .route("/api/words/:word/explanation", get(explain))
        .route("/api/radicals/:radical/examples", get(radical_examples))
        .route("/api/assessments", post(generate_assessment))
}

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    text: String,
}

#[derive(Serialize)]
struct SegmentData {
    words: Vec<String>,
    source: OutcomeSource,
}

async fn segment(
    State(state): State<AppState>,
    Json(body): Json<SegmentRequest>,
) -> Result<Response, AppError> {
    let text = body.text.trim();
    if text.is_empty() {
        return Err(AppError::validation(EMPTY_TEXT_MESSAGE));
    }

    let outcome = state.tutor().segment(text).await;
    let source = outcome.source();
    Ok(ok(SegmentData { words: outcome.into_value(), source }))
}

#[derive(Serialize)]
struct ExplanationData {
    explanation: WordExplanation,
    source: OutcomeSource,
}

async fn explain(
    State(state): State<AppState>,
    Path(word): Path<String>,
) -> Result<Response, AppError> {
    if !segmentation::is_valid_word(&word) {
        return Err(AppError::validation(NON_CJK_QUERY_MESSAGE));
    }

    let outcome = state.tutor().explain(word.trim()).await;
    let source = outcome.source();
    Ok(ok(ExplanationData { explanation: outcome.into_value(), source }))
}

#[derive(Serialize)]
struct RadicalExamplesData {
    radical: String,
    characters: Vec<String>,
    source: OutcomeSource,
}

async fn radical_examples(
    State(state): State<AppState>,
    Path(radical): Path<String>,
) -> Result<Response, AppError> {
    let radical = radical.trim().to_string();
    if radical.is_empty() {
        return Err(AppError::validation(EMPTY_RADICAL_MESSAGE));
    }

    let outcome = state.tutor().radical_examples(&radical).await;
    let source = outcome.source();
    Ok(ok(RadicalExamplesData { radical, characters: outcome.into_value(), source }))
}

#[derive(Debug, Deserialize)]
struct AssessmentRequestBody {
    words: Vec<String>,
    count: i64,
    #[serde(default)]
    difficulty: AssessmentDifficulty,
}

#[derive(Serialize)]
struct AssessmentData {
    difficulty: AssessmentDifficulty,
    questions: Vec<AssessmentQuestion>,
    source: OutcomeSource,
}

async fn generate_assessment(
    State(state): State<AppState>,
    Json(body): Json<AssessmentRequestBody>,
) -> Result<Response, AppError> {
    let count = usize::try_from(body.count)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| AppError::validation(NON_POSITIVE_COUNT_MESSAGE))?;
    let pool = WordPool::from_words(&body.words);
    if pool.is_empty() {
        return Err(AppError::validation(EMPTY_POOL_MESSAGE));
    }

    let outcome = state
        .tutor()
        .generate_assessment(pool.as_slice(), count, body.difficulty)
        .await;
    let source = outcome.source();
    let mut questions = outcome.into_value();
    shuffle_questions(&mut questions, &mut StdRng::from_os_rng());

    Ok(ok(AssessmentData { difficulty: body.difficulty, questions, source }))
}
