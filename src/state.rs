use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::config::Config;
use crate::services::llm_provider::{GenerativeModel, LLMProvider};
use crate::services::stroke_data::StrokeDataClient;
use crate::services::tutor::LessonTutor;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    tutor: Arc<LessonTutor>,
    sessions: Arc<SessionStore>,
    strokes: Arc<StrokeDataClient>,
}

impl AppState {
    pub fn new(config: Config, model: Arc<dyn GenerativeModel>, strokes: StrokeDataClient) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            tutor: Arc::new(LessonTutor::new(model)),
            sessions: Arc::new(SessionStore::new()),
            strokes: Arc::new(strokes),
        }
    }

    pub fn from_env(config: Config) -> Self {
        let provider = LLMProvider::from_env();
        if !provider.is_available() {
            tracing::warn!("GEMINI_API_KEY not set, lesson generation will use fallbacks");
        }
        Self::new(config, Arc::new(provider), StrokeDataClient::from_env())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn tutor(&self) -> Arc<LessonTutor> {
        Arc::clone(&self.tutor)
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn strokes(&self) -> Arc<StrokeDataClient> {
        Arc::clone(&self.strokes)
    }
}
