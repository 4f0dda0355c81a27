//! Async steps that drive model calls into session transitions.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{SessionError, SessionStore, SessionView, EMPTY_RADICAL_MESSAGE, NON_CJK_QUERY_MESSAGE};
use crate::services::assessment::shuffle_questions;
use crate::services::deep_link;
use crate::services::explanation::WordExplanation;
use crate::services::segmentation;
use crate::services::stroke_data::StrokeDataClient;
use crate::services::tutor::{AiOutcome, LessonTutor, OutcomeSource};
use crate::services::worksheet::{self, Worksheet};

#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub session: SessionView,
    pub source: OutcomeSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplanationResult {
    pub explanation: WordExplanation,
    pub source: OutcomeSource,
    pub cached: bool,
}

/// Creates a session; a fragment carrying `q` segments it straight away.
pub async fn open_session(
    store: &SessionStore,
    tutor: &LessonTutor,
    fragment: Option<&str>,
) -> Result<(SessionView, Option<OutcomeSource>), SessionError> {
    let created = store.create();
    let Some(text) = fragment.and_then(deep_link::parse_fragment) else {
        return Ok((created, None));
    };

    info!(session_id = %created.id, "opening session from shared link");
    let result = segment(store, tutor, created.id, &text).await?;
    Ok((result.session, Some(result.source)))
}

pub async fn segment(
    store: &SessionStore,
    tutor: &LessonTutor,
    id: Uuid,
    text: &str,
) -> Result<FlowResult, SessionError> {
    let text = store.try_update(id, |s| s.begin_segmentation(text))?;

    let outcome = tutor.segment(&text).await;
    let source = outcome.source();
    let words = outcome.into_value();

    let applied = store.update(id, |s| s.finish_segmentation(&text, words))?;
    if applied.is_none() {
        debug!(session_id = %id, "segmentation result superseded, discarded");
    }

    Ok(FlowResult { session: store.view(id)?, source })
}

pub async fn explain(
    store: &SessionStore,
    tutor: &LessonTutor,
    id: Uuid,
    word: &str,
) -> Result<ExplanationResult, SessionError> {
    if !segmentation::is_valid_word(word) {
        return Err(SessionError::Validation(NON_CJK_QUERY_MESSAGE));
    }
    let word = word.trim();

    if let Some(explanation) = store.read(id, |s| s.cached_explanation(word).cloned())? {
        return Ok(ExplanationResult { explanation, source: OutcomeSource::Model, cached: true });
    }

    let outcome = tutor.explain(word).await;
    if let Err(SessionError::NotFound(_)) = store.update(id, |s| s.store_explanation(word, &outcome)) {
        debug!(session_id = %id, word, "session closed before explanation arrived");
    }

    let source = outcome.source();
    Ok(ExplanationResult { explanation: outcome.into_value(), source, cached: false })
}

pub async fn radical_examples(
    store: &SessionStore,
    tutor: &LessonTutor,
    id: Uuid,
    radical: &str,
) -> Result<AiOutcome<Vec<String>>, SessionError> {
    let radical = radical.trim();
    if radical.is_empty() {
        return Err(SessionError::Validation(EMPTY_RADICAL_MESSAGE));
    }
    store.read(id, |_| ())?;
    Ok(tutor.radical_examples(radical).await)
}

/// Generates, shuffles and installs a question batch. `rng` is only used after
/// the model returns.
///
/// Generation runs on its own task, so the session still leaves `Generating`
/// when the caller goes away mid-request.
pub async fn start_assessment<R>(
    store: Arc<SessionStore>,
    tutor: Arc<LessonTutor>,
    id: Uuid,
    mut rng: R,
) -> Result<FlowResult, SessionError>
where
    R: Rng + Send + 'static,
{
    let request = store.try_update(id, |s| s.begin_assessment())?;

    let task_store = Arc::clone(&store);
    let generation = tokio::spawn(async move {
        let outcome = tutor.generate_assessment(&request.words, request.count, request.difficulty).await;
        let source = outcome.source();
        let mut questions = outcome.into_value();
        shuffle_questions(&mut questions, &mut rng);

        let count = questions.len();
        match task_store.update(id, |s| s.finish_assessment(questions)) {
            Ok(true) => info!(session_id = %id, questions = count, "assessment started"),
            Ok(false) => debug!(session_id = %id, "assessment batch superseded, discarded"),
            Err(_) => debug!(session_id = %id, "session closed before assessment arrived"),
        }
        source
    });

    let source = match generation.await {
        Ok(source) => source,
        Err(e) => {
            error!(session_id = %id, error = %e, "assessment generation task failed");
            store.update(id, |s| s.finish_assessment(Vec::new()))?;
            OutcomeSource::Fallback
        }
    };

    Ok(FlowResult { session: store.view(id)?, source })
}

pub async fn worksheet(
    store: &SessionStore,
    strokes: &StrokeDataClient,
    id: Uuid,
) -> Result<Worksheet, SessionError> {
    let words = store.read(id, |s| s.words().as_slice().to_vec())?;
    Ok(worksheet::build_worksheet(&words, strokes).await)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::services::llm_provider::{GenerateRequest, GenerativeModel, LLMError};
    use crate::services::assessment::AssessmentDifficulty;
    use crate::session::AssessmentPhase;

    const EXPLANATION: &str = r#"{"word":"打掃","definition":"清除污垢。","sentences":[{"text":"我們打掃課室。","posInSentence":"動詞"}],"pos":["動詞"],"radical":"扌"}"#;

    struct Scripted {
        replies: Mutex<VecDeque<Option<&'static str>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn with(replies: &[Option<&'static str>]) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.iter().copied().collect()), calls: Mutex::new(0) })
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl GenerativeModel for Scripted {
        async fn generate_json(&self, _request: &GenerateRequest) -> Result<String, LLMError> {
            *self.calls.lock() += 1;
            let reply = self.replies.lock().pop_front().flatten();
            reply.map(str::to_string).ok_or(LLMError::EmptyCandidates)
        }
    }

    fn tutor(model: &Arc<Scripted>) -> LessonTutor {
        LessonTutor::new(model.clone())
    }

    /// Answers every request with `reply` after `delay`.
    struct Delayed {
        delay: Duration,
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl GenerativeModel for Delayed {
        async fn generate_json(&self, _request: &GenerateRequest) -> Result<String, LLMError> {
            tokio::time::sleep(self.delay).await;
            self.reply.map(str::to_string).ok_or(LLMError::EmptyCandidates)
        }
    }

    fn ready_store(words: &[&str]) -> (Arc<SessionStore>, Uuid) {
        let store = Arc::new(SessionStore::new());
        let id = store.create().id;
        let text = words.join(" ");
        store
            .update(id, |s| {
                s.begin_segmentation(&text).unwrap();
                s.finish_segmentation(&text, words.iter().map(|w| w.to_string()).collect());
            })
            .unwrap();
        (store, id)
    }

    async fn wait_while_generating(store: &SessionStore, id: Uuid) -> AssessmentPhase {
        for _ in 0..100 {
            let phase = store.read(id, |s| s.assessment().phase()).unwrap();
            if phase != AssessmentPhase::Generating {
                return phase;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("assessment stuck in GENERATING");
    }

    #[tokio::test]
    async fn open_session_segments_shared_text() {
        let model = Scripted::with(&[Some(r#"["打掃"]"#)]);
        let store = SessionStore::new();

        let (view, source) = open_session(&store, &tutor(&model), Some("#q=%E6%89%93%E6%8E%83"))
            .await
            .unwrap();
        assert_eq!(source, Some(OutcomeSource::Model));
        assert_eq!(view.words, vec!["打掃"]);
        assert_eq!(view.input_text, "打掃");
        assert_eq!(view.fragment.as_deref(), Some("q=%E6%89%93%E6%8E%83"));
    }

    #[tokio::test]
    async fn open_session_without_query_skips_model() {
        let model = Scripted::with(&[]);
        let store = SessionStore::new();

        let (view, source) = open_session(&store, &tutor(&model), Some("#other=1")).await.unwrap();
        assert!(source.is_none());
        assert_eq!(view.phase, "IDLE");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn segment_failure_splits_text() {
        let model = Scripted::with(&[None]);
        let store = SessionStore::new();
        let id = store.create().id;

        let result = segment(&store, &tutor(&model), id, "熱烈、努力").await.unwrap();
        assert_eq!(result.source, OutcomeSource::Fallback);
        assert_eq!(result.session.words, vec!["熱烈", "努力"]);
        assert_eq!(result.session.phase, "READY");
    }

    #[tokio::test]
    async fn segment_unknown_session_is_not_found() {
        let model = Scripted::with(&[Some(r#"["打掃"]"#)]);
        let store = SessionStore::new();
        let id = Uuid::new_v4();

        let err = segment(&store, &tutor(&model), id, "打掃").await.unwrap_err();
        assert_eq!(err, SessionError::NotFound(id));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn explanation_is_cached_after_success() {
        let model = Scripted::with(&[Some(EXPLANATION)]);
        let store = SessionStore::new();
        let id = store.create().id;
        let tutor = tutor(&model);

        let first = explain(&store, &tutor, id, "打掃").await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.explanation.definition, "清除污垢。");

        let second = explain(&store, &tutor, id, " 打掃 ").await.unwrap();
        assert!(second.cached);
        assert_eq!(second.explanation, first.explanation);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn placeholder_explanation_retries_next_time() {
        let model = Scripted::with(&[None, Some(EXPLANATION)]);
        let store = SessionStore::new();
        let id = store.create().id;
        let tutor = tutor(&model);

        let first = explain(&store, &tutor, id, "打掃").await.unwrap();
        assert_eq!(first.source, OutcomeSource::Fallback);
        assert!(first.explanation.is_placeholder());

        let second = explain(&store, &tutor, id, "打掃").await.unwrap();
        assert_eq!(second.source, OutcomeSource::Model);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn explain_rejects_non_cjk_word() {
        let model = Scripted::with(&[]);
        let store = SessionStore::new();
        let id = store.create().id;

        let err = explain(&store, &tutor(&model), id, "hello").await.unwrap_err();
        assert_eq!(err, SessionError::Validation(NON_CJK_QUERY_MESSAGE));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn assessment_runs_generated_batch() {
        let questions = r#"[
            {"id":"1","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我","球。"]},
            {"id":"2","targetWord":"掃","fullSentence":"他掃地。","sentenceParts":["他","地。"]}
        ]"#;
        let model = Scripted::with(&[Some(r#"["打","掃"]"#), Some(questions)]);
        let store = Arc::new(SessionStore::new());
        let id = store.create().id;
        let tutor = Arc::new(tutor(&model));

        segment(&store, &tutor, id, "打 掃").await.unwrap();
        let result = start_assessment(store.clone(), tutor, id, StdRng::seed_from_u64(7)).await.unwrap();

        assert_eq!(result.source, OutcomeSource::Model);
        assert_eq!(result.session.assessment.phase, "RUNNING");
        assert_eq!(result.session.assessment.total_questions, 2);
        let phase = store.read(id, |s| s.assessment().phase()).unwrap();
        assert!(matches!(phase, AssessmentPhase::Running { index: 0, .. }));
    }

    #[tokio::test]
    async fn assessment_with_empty_pool_never_calls_model() {
        let model = Scripted::with(&[]);
        let store = Arc::new(SessionStore::new());
        let id = store.create().id;

        let err = start_assessment(store, Arc::new(tutor(&model)), id, StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn failed_assessment_returns_to_setup() {
        let model = Scripted::with(&[Some(r#"["打掃"]"#), None]);
        let store = Arc::new(SessionStore::new());
        let id = store.create().id;
        let tutor = Arc::new(tutor(&model));

        segment(&store, &tutor, id, "打掃").await.unwrap();
        let result = start_assessment(store.clone(), tutor, id, StdRng::seed_from_u64(3)).await.unwrap();
        assert_eq!(result.source, OutcomeSource::Fallback);
        assert_eq!(result.session.assessment.phase, "SETUP");
        assert!(result.session.assessment.notice.is_some());
    }

    #[tokio::test]
    async fn abandoned_request_still_installs_batch() {
        let questions = r#"[
            {"id":"1","targetWord":"打","fullSentence":"我打球。","sentenceParts":["我","球。"]}
        ]"#;
        let model = Arc::new(Delayed { delay: Duration::from_millis(100), reply: Some(questions) });
        let (store, id) = ready_store(&["打", "掃"]);
        let tutor = Arc::new(LessonTutor::new(model));

        let request = start_assessment(store.clone(), tutor, id, StdRng::seed_from_u64(5));
        assert!(tokio::time::timeout(Duration::from_millis(10), request).await.is_err());

        let phase = wait_while_generating(&store, id).await;
        assert!(matches!(phase, AssessmentPhase::Running { index: 0, .. }));
        assert_eq!(store.view(id).unwrap().assessment.total_questions, 1);
    }

    #[tokio::test]
    async fn abandoned_failed_request_allows_retry() {
        let model = Arc::new(Delayed { delay: Duration::from_millis(100), reply: None });
        let (store, id) = ready_store(&["打"]);
        let tutor = Arc::new(LessonTutor::new(model));

        let request = start_assessment(store.clone(), tutor.clone(), id, StdRng::seed_from_u64(5));
        assert!(tokio::time::timeout(Duration::from_millis(10), request).await.is_err());

        assert_eq!(wait_while_generating(&store, id).await, AssessmentPhase::Setup);
        store
            .try_update(id, |s| s.configure_assessment(AssessmentDifficulty::Medium, 2))
            .unwrap();
        let retry = start_assessment(store.clone(), tutor, id, StdRng::seed_from_u64(6)).await.unwrap();
        assert_eq!(retry.session.assessment.phase, "SETUP");
    }

    #[tokio::test]
    async fn blank_radical_is_rejected_before_model_call() {
        let model = Scripted::with(&[Some(r#"["打"]"#)]);
        let store = SessionStore::new();
        let id = store.create().id;

        let err = radical_examples(&store, &tutor(&model), id, " ").await.unwrap_err();
        assert_eq!(err, SessionError::Validation(EMPTY_RADICAL_MESSAGE));
        assert_eq!(model.calls(), 0);
    }
}
