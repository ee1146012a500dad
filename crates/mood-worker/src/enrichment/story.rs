//! Story generation through an OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

const SYSTEM_PROMPT: &str = "You are a poetic storyteller.";
const DEFAULT_THEME: &str = "everyday life";

/// Text generation capability: `(prompt, max_tokens, temperature) -> text`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32)
        -> WorkerResult<String>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Build the story prompt.
///
/// `labels` should already be distinct; an empty list reads `none`.
pub fn build_prompt(
    emotion: &str,
    labels: &[String],
    keyword: Option<&str>,
    max_words: u32,
) -> String {
    let objects = if labels.is_empty() {
        "none".to_string()
    } else {
        labels.join(", ")
    };
    let theme = keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or(DEFAULT_THEME);

    format!(
        "Write a cinematic and emotional story of about {max_words} words.\n\
         Emotion: {emotion}\n\
         Objects in scene: {objects}\n\
         Theme: {theme}\n\n\
         Make it descriptive and reflective."
    )
}

/// OpenAI client settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API base including the version segment, `https://api.openai.com/v1`
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_API_BASE` and `OPENAI_MODEL`.
    ///
    /// Returns `None` without an API key.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        Some(config)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat completions client.
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> WorkerResult<String> {
        let url = format!("{}/chat/completions", self.config.api_base);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::text_generation(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::text_generation(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            WorkerError::text_generation(format!("Failed to parse response: {}", e))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WorkerError::text_generation("No content in response"))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
