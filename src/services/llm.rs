use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::core::config::Config;
use crate::core::error::{GenerationError, GenerationResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// Falls back to `OPENAI_API_KEY`, then to an interactive prompt.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            text_model: default_text_model(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_text_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Credential for the generation services. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// A service that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    /// Model identifier shown in diagnostics.
    fn model(&self) -> &str;

    async fn generate_text(&self, system: &str, prompt: &str) -> GenerationResult<String>;
}

pub fn create_text_generator(config: &Config, api_key: ApiKey) -> Box<dyn TextGenerator> {
    Box::new(OpenAIClient::new(
        api_key,
        &config.llm.text_model,
        &config.llm.base_url,
    ))
}

// --- OpenAI ---

pub struct OpenAIClient {
    api_key: ApiKey,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl Debug for OpenAIClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAIClient {
    pub fn new(api_key: ApiKey, model: &str, base_url: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAIClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_text(&self, system: &str, prompt: &str) -> GenerationResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} (model {})", url, self.model);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: system.to_string() },
                OpenAIMessage { role: "user".to_string(), content: prompt.to_string() },
            ],
        };

        let body = post_json(&self.client, &url, &self.api_key, &request_body).await?;

        let result: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::Service(format!(
                "Failed to parse OpenAI response: {}. Body: {}",
                e, body
            ))
        })?;

        result
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                GenerationError::Service("OpenAI response empty or missing content".to_string())
            })
    }
}

/// Sends one authenticated JSON request and returns the raw success body.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &ApiKey,
    body: &T,
) -> GenerationResult<String> {
    let resp = client
        .post(url)
        .header("Authorization", api_key.bearer())
        .json(body)
        .send()
        .await
        .map_err(|e| GenerationError::Service(format!("HTTP request failed: {}", e)))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| GenerationError::Service(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(error_for_status(status, &text));
    }
    Ok(text)
}

pub(crate) fn error_for_status(status: StatusCode, body: &str) -> GenerationError {
    let message = extract_error_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            body.to_string()
        }
    });

    if status == StatusCode::UNAUTHORIZED {
        GenerationError::Authentication(message)
    } else {
        GenerationError::Service(message)
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(ToOwned::to_owned)
}
