//! `Generator` backed by an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use caselaw_core::config::GenerationSettings;
use caselaw_core::traits::{GenerationError, Generator};

pub struct RemoteGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl RemoteGenerator {
    /// Reads the API key from the environment variable named in `settings`.
    pub fn from_settings(settings: &GenerationSettings) -> anyhow::Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} is not set; export an API key for {}", settings.api_key_env, settings.endpoint))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self { client, endpoint: settings.endpoint.clone(), model: settings.model.clone(), api_key })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Map a non-success HTTP status to a generation error.
pub fn parse_http_error(status: u16, body: &str) -> GenerationError {
    match status {
        408 | 504 => GenerationError::Timeout,
        429 => GenerationError::RateLimited,
        401 | 403 => GenerationError::ServiceError(format!("authentication failed (HTTP {status})")),
        _ => GenerationError::ServiceError(format!("HTTP {status}: {}", body.trim())),
    }
}

fn map_transport(e: &reqwest::Error) -> GenerationError {
    if e.is_timeout() { GenerationError::Timeout } else { GenerationError::ServiceError(e.to_string()) }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &text));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ServiceError(format!("invalid completion payload: {e}")))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GenerationError::ServiceError("empty completion".into()))?;
        debug!(model = %self.model, chars = text.chars().count(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert_eq!(parse_http_error(429, "quota"), GenerationError::RateLimited);
        assert_eq!(parse_http_error(504, ""), GenerationError::Timeout);
        assert!(matches!(parse_http_error(503, " overloaded "), GenerationError::ServiceError(m) if m == "HTTP 503: overloaded"));
        assert!(matches!(parse_http_error(401, "bad key"), GenerationError::ServiceError(m) if !m.contains("bad key")));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let settings = GenerationSettings { api_key_env: "CASELAW_TEST_KEY_THAT_IS_NOT_SET".into(), ..GenerationSettings::default() };
        let err = RemoteGenerator::from_settings(&settings).err().unwrap();
        assert!(err.to_string().contains("CASELAW_TEST_KEY_THAT_IS_NOT_SET"));
    }
}
