use crate::apis::llm::{LlmClient, SYSTEM_PROMPT};
use crate::apis::retry::with_linear_backoff;
use crate::config::Config;
use crate::constants::PERPLEXITY_BASE_URL;
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Perplexity chat completions (`sonar-pro`), which search the web before answering.
pub struct PerplexityClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl PerplexityClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, PERPLEXITY_BASE_URL)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.perplexity_key()?.to_string(),
            model: config.perplexity_model.clone(),
            max_retries: config.max_retries,
            retry_delay: config.request_delay(),
        })
    }

    async fn send(&self, prompt: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.2
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EtlError::Api {
                service: "perplexity",
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| EtlError::MissingField("perplexity response content".to_string()))
    }
}

#[async_trait]
impl LlmClient for PerplexityClient {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn query(&self, prompt: &str) -> Result<String> {
        debug!("Querying Perplexity ({} chars)", prompt.len());
        with_linear_backoff("perplexity query", self.max_retries, self.retry_delay, |_| self.send(prompt)).await
    }
}
