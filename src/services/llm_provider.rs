use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_API_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Option<Duration>,
}

impl LLMConfig {
    pub fn from_env() -> Self {
        let api_key = env_string("GEMINI_API_KEY").or_else(|| env_string("API_KEY"));
        let model = env_string("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("GEMINI_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = env_u64("GEMINI_TIMEOUT_MS").map(Duration::from_millis);

        Self { api_key, model, api_endpoint, timeout }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Structured output constraint sent as `generationConfig.responseSchema`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSchema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ResponseSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ResponseSchema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ResponseSchema {
    fn scalar(kind: SchemaType) -> Self {
        Self { kind, description: None, items: None, properties: None, required: Vec::new() }
    }

    pub fn string() -> Self {
        Self::scalar(SchemaType::String)
    }

    pub fn array_of(items: ResponseSchema) -> Self {
        Self { items: Some(Box::new(items)), ..Self::scalar(SchemaType::Array) }
    }

    pub fn object<I, K>(properties: I, required: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, ResponseSchema)>,
        K: Into<String>,
    {
        Self {
            properties: Some(properties.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            required: required.iter().map(|s| s.to_string()).collect(),
            ..Self::scalar(SchemaType::Object)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One schema-constrained generation: a prompt plus the shape the model must emit.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub schema: ResponseSchema,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyCandidates,
    #[error("response does not match schema: {0}")]
    SchemaMismatch(String),
}

/// Seam between the lesson contract and whatever hosts the model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Returns the raw JSON text produced for `request`.
    async fn generate_json(&self, request: &GenerateRequest) -> Result<String, LLMError>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a ResponseSchema,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<i64>,
    pub candidates_token_count: Option<i64>,
    pub total_token_count: Option<i64>,
}

#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn new(config: LLMConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(LLMConfig::from_env())
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, LLMError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("GEMINI_API_KEY"))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_endpoint.trim_end_matches('/'),
            self.config.model
        );
        let body = GenerateContentBody {
            contents: [Content { role: "user", parts: [TextPart { text: &request.prompt }] }],
            generation_config: GenerationConfig {
                response_mime_type: JSON_MIME_TYPE,
                response_schema: &request.schema,
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LLMError::HttpStatus { status, body });
        }

        let bytes = resp.bytes().await?;
        let parsed: GenerateContentResponse = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                let body_str = String::from_utf8_lossy(&bytes);
                error!("Failed to parse LLM response JSON: {}. Body: {}", e, body_str);
                return Err(LLMError::Json(e));
            }
        };

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                model = %self.config.model,
                prompt_tokens = usage.prompt_token_count,
                total_tokens = usage.total_token_count,
                "LLM generation finished"
            );
        }

        parsed.first_text().ok_or(LLMError::EmptyCandidates)
    }
}

#[async_trait]
impl GenerativeModel for LLMProvider {
    async fn generate_json(&self, request: &GenerateRequest) -> Result<String, LLMError> {
        self.generate(request).await
    }

    fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }
}

/// Strips a Markdown code fence if the model wrapped its JSON in one.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .and_then(|s| s.strip_suffix("```"))
        .or_else(|| trimmed.strip_prefix("```").and_then(|s| s.strip_suffix("```")))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_array_schema_shape() {
        let schema = ResponseSchema::array_of(ResponseSchema::string());
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "ARRAY", "items": { "type": "STRING" } }));
    }

    #[test]
    fn object_schema_keeps_required_list() {
        let schema = ResponseSchema::object(
            [("text", ResponseSchema::string()), ("note", ResponseSchema::string().with_description("d"))],
            &["text"],
        );
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], "OBJECT");
        assert_eq!(value["required"], serde_json::json!(["text"]));
        assert_eq!(value["properties"]["note"]["description"], "d");
    }

    #[test]
    fn request_body_uses_generation_config() {
        let schema = ResponseSchema::string();
        let body = GenerateContentBody {
            contents: [Content { role: "user", parts: [TextPart { text: "hi" }] }],
            generation_config: GenerationConfig { response_mime_type: JSON_MIME_TYPE, response_schema: &schema },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "STRING");
    }

    #[test]
    fn first_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"[\"打"},{"text":"掃\"]"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("[\"打掃\"]"));
    }

    #[test]
    fn first_text_empty_when_no_candidates() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(parsed.first_text().is_none());
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[tokio::test]
    async fn generate_without_key_is_not_configured() {
        let provider = LLMProvider::new(LLMConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: None,
        });
        let request = GenerateRequest { prompt: "x".into(), schema: ResponseSchema::string() };
        let err = provider.generate(&request).await.unwrap_err();
        assert!(matches!(err, LLMError::NotConfigured(_)));
        assert!(!provider.is_available());
    }
}
