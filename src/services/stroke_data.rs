use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://cdn.jsdelivr.net/npm/hanzi-writer-data@2.0";

#[derive(Debug, Error)]
pub enum StrokeDataError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    HttpStatus(reqwest::StatusCode),
}

/// Stroke outlines and medians for one character, as served by hanzi-writer-data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterStrokes {
    #[serde(default)]
    pub character: String,
    pub strokes: Vec<String>,
    #[serde(default)]
    pub medians: Vec<Vec<[f64; 2]>>,
}

impl CharacterStrokes {
    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }
}

#[derive(Clone)]
pub struct StrokeDataClient {
    base_url: String,
    client: reqwest::Client,
}

impl StrokeDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("STROKE_DATA_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn url_for(&self, character: char) -> String {
        let mut buf = [0u8; 4];
        format!("{}/{}.json", self.base_url, urlencoding::encode(character.encode_utf8(&mut buf)))
    }

    pub async fn fetch(&self, character: char) -> Result<CharacterStrokes, StrokeDataError> {
        let resp = self.client.get(self.url_for(character)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StrokeDataError::HttpStatus(status));
        }

        let mut data: CharacterStrokes = resp.json().await?;
        data.character = character.to_string();
        Ok(data)
    }

    /// Lookup for the worksheet; a failed character renders without strokes.
    pub async fn lookup(&self, character: char) -> Option<CharacterStrokes> {
        match self.fetch(character).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, %character, "stroke data lookup failed");
                None
            }
        }
    }
}
