use crate::apis::gemini::GeminiClient;
use crate::apis::perplexity::PerplexityClient;
use crate::config::Config;
use crate::error::Result;
use crate::parser::{is_not_found_response, parse_llm_json};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SYSTEM_PROMPT: &str = "You are a research assistant for a Korean concert information service. \
Search the web before answering, answer in Korean unless asked otherwise, and never invent facts. \
If the information cannot be found, say so plainly.";

const JSON_ONLY_INSTRUCTION: &str = "Respond with pure JSON only: no markdown, no code fences, no commentary. \
Use empty strings or empty arrays for anything you cannot find.";

/// A chat model reached over HTTP that answers with web-search grounding.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn query(&self, prompt: &str) -> Result<String>;

    /// Pause between attempts when an answer does not parse.
    fn retry_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Asks for pure JSON and parses it, retrying unparseable answers up to
    /// `max_retries` times. "Not found" answers and exhausted retries yield `{}`.
    async fn query_json(&self, prompt: &str, max_retries: u32) -> Result<Value> {
        let prompt = format!("{prompt}\n\n{JSON_ONLY_INSTRUCTION}");
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            let text = self.query(&prompt).await?;
            if is_not_found_response(&text) {
                debug!("{} reported no information", self.name());
                return Ok(empty_object());
            }
            match parse_llm_json(&text) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("{} answer was not JSON (attempt {}/{}): {}", self.name(), attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.retry_delay()).await;
            }
        }

        warn!("{} gave no parseable JSON after {} attempts", self.name(), attempts);
        Ok(empty_object())
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub fn build_llm_client(config: &Config) -> Result<Arc<dyn LlmClient>> {
    if config.use_gemini {
        info!("Using Gemini model {}", config.gemini_model);
        Ok(Arc::new(GeminiClient::new(config)?))
    } else {
        info!("Using Perplexity model {}", config.perplexity_model);
        Ok(Arc::new(PerplexityClient::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        answers: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            let mut answers: Vec<String> = answers.iter().map(|s| s.to_string()).collect();
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl LlmClient for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn retry_delay(&self) -> Duration {
            self.delay
        }

        async fn query(&self, _prompt: &str) -> Result<String> {
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| EtlError::Validation("script exhausted".to_string()))
        }
    }

    #[tokio::test]
    async fn retries_until_json_parses() {
        let llm = Scripted::new(&["Sorry, let me think.", "```json\n{\"a\": 1}\n```"]);
        assert_eq!(llm.query_json("q", 3).await.unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn unparseable_answers_wait_before_asking_again() {
        let llm = Scripted::new(&["Sorry, let me think.", "{\"a\": 1}"]).with_delay(Duration::from_millis(30));
        let started = std::time::Instant::now();
        assert_eq!(llm.query_json("q", 3).await.unwrap(), json!({"a": 1}));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn exhausted_retries_yield_empty_object() {
        let llm = Scripted::new(&["nope", "still nope"]);
        assert_eq!(llm.query_json("q", 2).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn not_found_answers_yield_empty_object() {
        let llm = Scripted::new(&["해당 정보를 찾을 수 없습니다."]);
        assert_eq!(llm.query_json("q", 3).await.unwrap(), json!({}));
    }
}
