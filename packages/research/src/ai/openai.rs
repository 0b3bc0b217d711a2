//! OpenAI chat-completions implementation of [`TextGenerator`].
//!
//! ```rust,ignore
//! use research::ai::OpenAiGenerator;
//!
//! let generator = OpenAiGenerator::new("sk-...").with_model("gpt-4o-mini");
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::security::SecretString;
use crate::traits::searcher::classify_status;
use crate::traits::TextGenerator;

const PROVIDER: &str = "openai";

#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: SecretString::new(api_key),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.4,
            max_tokens: 4096,
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::Configuration("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::transient(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::permanent(PROVIDER, format!("malformed response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::permanent(PROVIDER, "no completion in response"))
    }

    fn provider(&self) -> &str {
        PROVIDER
    }
}
