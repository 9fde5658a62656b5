//! OpenAI-compatible chat-completions oracle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use paperflow_core::config::AiConfig;

use crate::error::{AiError, Result};
use crate::oracle::{Classification, ClassificationOracle, ClassificationRequest};
use crate::response::parse_classification;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub keywords_max_len: usize,
    /// Document text beyond this many characters is not sent.
    pub max_text_chars: usize,
    pub timeout_seconds: u64,
}

impl OpenAiConfig {
    pub fn from_app_config(ai: &AiConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: ai.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: ai.model.clone(),
            max_tokens: ai.max_tokens,
            temperature: ai.temperature,
            keywords_max_len: ai.keywords_max_len,
            max_text_chars: ai.max_text_chars,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiOracle {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey("empty API key".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn system_prompt(&self, request: &ClassificationRequest) -> String {
        format!(
            "You are a metadata extraction assistant specialized in quantum computing and quantum cybersecurity. \
             Generate a JSON object containing only the requested fields. \
             Valid keys are 'Keywords' (string) and 'Tags' (array of strings). \
             Tags must be chosen only from the list of {} tags given; select only the relevant ones. \
             Keywords must be short and concise (total length must not exceed {} characters). \
             Respond with pure JSON and no additional text.",
            request.allowed_tags.len(),
            self.config.keywords_max_len
        )
    }

    fn user_prompt(&self, request: &ClassificationRequest) -> String {
        let text: String = request.text.chars().take(self.config.max_text_chars).collect();
        let tags_line = if request.want_tags {
            format!(
                "Include Tags: true. Available tags: {}",
                serde_json::to_string(&request.allowed_tags).unwrap_or_default()
            )
        } else {
            "Include Tags: false".to_string()
        };
        format!(
            "Include Keywords: {}\n{tags_line}\n\nText to analyze:\n{text}",
            request.want_keywords
        )
    }
}

#[async_trait]
impl ClassificationOracle for OpenAiOracle {
    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt(request),
                },
                ChatMessage {
                    role: "user",
                    content: self.user_prompt(request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)?;

        debug!(model = %self.config.model, len = content.len(), "classification received");
        parse_classification(&content, self.config.keywords_max_len)
    }
}
