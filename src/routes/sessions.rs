use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::{created, ok, AppError};
use crate::services::assessment::AssessmentDifficulty;
use crate::services::deep_link;
use crate::services::tutor::OutcomeSource;
use crate::session::flow;
use crate::session::{AdvanceOutcome, AnswerFeedback, DisplayMode, SessionView, EMPTY_TEXT_MESSAGE};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/segment", post(segment))
        .route("/api/sessions/:id/words", post(add_word))
        .route("/api/sessions/:id/reset", post(reset))
        .route("/api/sessions/:id/mode", put(set_mode))
        .route("/api/sessions/:id/stars", post(award_star))
        .route("/api/sessions/:id/words/:word/explanation", get(explain))
        .route("/api/sessions/:id/radicals/:radical/examples", get(radical_examples))
        .route("/api/sessions/:id/assessment", put(configure_assessment))
        .route("/api/sessions/:id/assessment/start", post(start_assessment))
        .route("/api/sessions/:id/assessment/answer", post(submit_answer))
        .route("/api/sessions/:id/assessment/next", post(advance))
        .route("/api/sessions/:id/share", get(share))
        .route("/api/sessions/:id/worksheet", get(worksheet))
}

#[derive(Debug, Default, Deserialize)]
struct OpenSessionRequest {
    fragment: Option<String>,
}

#[derive(Serialize)]
struct SessionData {
    session: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<OutcomeSource>,
}

async fn open_session(
    State(state): State<AppState>,
    body: Option<Json<OpenSessionRequest>>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let sessions = state.sessions();
    let tutor = state.tutor();

    let (session, source) = flow::open_session(&sessions, &tutor, body.fragment.as_deref()).await?;
    tracing::info!(session_id = %session.id, sessions = sessions.len(), "session opened");
    Ok(created(SessionData { session, source }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    Ok(ok(state.sessions().view(id)?))
}

#[derive(Serialize)]
struct DeletedData {
    deleted: bool,
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if !state.sessions().remove(id) {
        return Err(AppError::not_found("學習階段不存在"));
    }
    Ok(ok(DeletedData { deleted: true }))
}

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    text: String,
}

async fn segment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SegmentRequest>,
) -> Result<Response, AppError> {
    let result = flow::segment(&state.sessions(), &state.tutor(), id, &body.text).await?;
    Ok(ok(SessionData { session: result.session, source: Some(result.source) }))
}

#[derive(Debug, Deserialize)]
struct AddWordRequest {
    word: String,
}

async fn add_word(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddWordRequest>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    sessions.try_update(id, |s| s.add_word(&body.word))?;
    Ok(ok(sessions.view(id)?))
}

async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    sessions.update(id, |s| s.reset())?;
    Ok(ok(sessions.view(id)?))
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: DisplayMode,
    #[serde(default)]
    toggle: bool,
}

async fn set_mode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ModeRequest>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    sessions.update(id, |s| {
        if body.toggle {
            s.toggle_mode(body.mode);
        } else {
            s.set_mode(body.mode);
        }
    })?;
    Ok(ok(sessions.view(id)?))
}

async fn award_star(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    sessions.update(id, |s| s.award_star())?;
    Ok(ok(sessions.view(id)?))
}

async fn explain(
    State(state): State<AppState>,
    Path((id, word)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let result = flow::explain(&state.sessions(), &state.tutor(), id, &word).await?;
    Ok(ok(result))
}

#[derive(Serialize)]
struct RadicalExamplesData {
    radical: String,
    characters: Vec<String>,
    source: OutcomeSource,
}

async fn radical_examples(
    State(state): State<AppState>,
    Path((id, radical)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    let outcome = flow::radical_examples(&state.sessions(), &state.tutor(), id, &radical).await?;
    let source = outcome.source();
    Ok(ok(RadicalExamplesData {
        radical: radical.trim().to_string(),
        characters: outcome.into_value(),
        source,
    }))
}

#[derive(Debug, Deserialize)]
struct ConfigureAssessmentRequest {
    #[serde(default)]
    difficulty: AssessmentDifficulty,
    count: i64,
}

async fn configure_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfigureAssessmentRequest>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    sessions.try_update(id, |s| s.configure_assessment(body.difficulty, body.count))?;
    Ok(ok(sessions.view(id)?))
}

async fn start_assessment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let rng = StdRng::from_os_rng();
    let result = flow::start_assessment(state.sessions(), state.tutor(), id, rng).await?;
    Ok(ok(SessionData { session: result.session, source: Some(result.source) }))
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    payload: String,
}

#[derive(Serialize)]
struct AnswerData {
    feedback: AnswerFeedback,
    session: SessionView,
}

async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AnswerRequest>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    let feedback = sessions.try_update(id, |s| s.submit_answer(&body.payload))?;
    Ok(ok(AnswerData { feedback, session: sessions.view(id)? }))
}

#[derive(Serialize)]
struct AdvanceData {
    completed: bool,
    session: SessionView,
}

async fn advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    let outcome = sessions.try_update(id, |s| s.advance())?;
    if outcome == AdvanceOutcome::Completed {
        tracing::info!(session_id = %id, "assessment round completed");
    }
    Ok(ok(AdvanceData {
        completed: outcome == AdvanceOutcome::Completed,
        session: sessions.view(id)?,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareData {
    fragment: String,
    share_url: String,
}

async fn share(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let text = state.sessions().read(id, |s| s.input_text().to_string())?;
    if text.is_empty() {
        return Err(AppError::validation(EMPTY_TEXT_MESSAGE));
    }

    let config = state.config();
    Ok(ok(ShareData {
        fragment: deep_link::build_fragment(&text),
        share_url: deep_link::share_url(&config.public_base_url, &text),
    }))
}

async fn worksheet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let sheet = flow::worksheet(&state.sessions(), &state.strokes(), id).await?;
    Ok(ok(sheet))
}
