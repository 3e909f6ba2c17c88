use crate::apis::llm::{LlmClient, SYSTEM_PROMPT};
use crate::apis::retry::with_linear_backoff;
use crate::config::Config;
use crate::constants::{GEMINI_BASE_URL, GEMINI_FALLBACK_MODEL};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{instrument, warn};

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Generation and safety knobs sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub safety_threshold: String,
    /// Adds the `google_search` tool so answers are grounded in search results.
    pub grounding: bool,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 8192,
            safety_threshold: "BLOCK_NONE".to_string(),
            grounding: true,
        }
    }
}

impl GeminiSettings {
    fn request_body(&self, prompt: &str) -> Value {
        let safety: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": self.safety_threshold}))
            .collect();
        let mut body = json!({
            "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]},
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            },
            "safetySettings": safety
        });
        if self.grounding {
            body["tools"] = json!([{"google_search": {}}]);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    settings: GeminiSettings,
    max_retries: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, GEMINI_BASE_URL)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.gemini_key()?.to_string(),
            model: config.gemini_model.clone(),
            settings: GeminiSettings::default(),
            max_retries: config.max_retries,
            retry_delay: config.request_delay(),
        })
    }

    pub fn with_settings(mut self, settings: GeminiSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.settings.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EtlError::Api {
                service: "gemini",
                status: status.as_u16(),
                message,
            });
        }

        let generated: GenerateResponse = response.json().await?;
        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(EtlError::MissingField("gemini candidate text".to_string()));
        }
        Ok(text)
    }

    async fn generate_with_retry(&self, model: &str, prompt: &str) -> Result<String> {
        with_linear_backoff("gemini query", self.max_retries, self.retry_delay, |_| self.generate(model, prompt)).await
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn query(&self, prompt: &str) -> Result<String> {
        match self.generate_with_retry(&self.model, prompt).await {
            Err(EtlError::Api { status: 404, .. }) if self.model != GEMINI_FALLBACK_MODEL => {
                warn!("Gemini model {} unavailable, falling back to {}", self.model, GEMINI_FALLBACK_MODEL);
                self.generate_with_retry(GEMINI_FALLBACK_MODEL, prompt).await
            }
            other => other,
        }
    }
}
