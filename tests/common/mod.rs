#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;

use shizi_backend_rust::config::Config;
use shizi_backend_rust::services::llm_provider::{GenerateRequest, GenerativeModel, LLMError};
use shizi_backend_rust::services::stroke_data::StrokeDataClient;
use shizi_backend_rust::services::tutor::LessonTutor;
use shizi_backend_rust::state::AppState;

pub const PUBLIC_BASE_URL: &str = "http://lesson.test";

/// Replays queued replies in order; `None` or an exhausted queue fails the call.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(Some(reply.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate_json(&self, request: &GenerateRequest) -> Result<String, LLMError> {
        self.prompts.lock().push(request.prompt.clone());
        let reply = self.replies.lock().pop_front().flatten();
        reply.ok_or(LLMError::EmptyCandidates)
    }
}

pub fn tutor(model: &Arc<ScriptedModel>) -> LessonTutor {
    LessonTutor::new(model.clone())
}

pub fn test_config() -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        log_level: "warn".to_string(),
        public_base_url: PUBLIC_BASE_URL.to_string(),
        session_idle_ttl: Duration::from_secs(60),
    }
}

pub fn create_app_with(model: Arc<ScriptedModel>) -> Router {
    // Nothing listens on the discard port, so stroke lookups fail fast.
    let strokes = StrokeDataClient::new("http://127.0.0.1:9");
    shizi_backend_rust::build_app(AppState::new(test_config(), model, strokes))
}

pub fn create_test_app() -> Router {
    create_app_with(ScriptedModel::failing())
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
