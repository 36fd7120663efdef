use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Settings;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("HTTP request to generation service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

/// Prompt in, continuation text out. Blocking; callers own any retry policy.
pub trait Generator: Send + Sync {
    fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        stop_sequences: &[String],
    ) -> Result<String, GenerateError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for an OpenAI-compatible `/v1/completions` endpoint
/// (llama.cpp server, vLLM, and similar).
pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    model_name: String,
}

impl HttpGenerator {
    pub fn new(endpoint: &str, model_name: &str, timeout: Duration) -> Result<Self, GenerateError> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Generation client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, GenerateError> {
        Self::new(
            &settings.generator_url,
            &settings.generator_model,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Generator for HttpGenerator {
    fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        stop_sequences: &[String],
    ) -> Result<String, GenerateError> {
        let request = CompletionRequest {
            model: &self.model_name,
            prompt,
            max_tokens,
            stop: stop_sequences,
        };

        let start = std::time::Instant::now();
        let response: CompletionResponse = self
            .client
            .post(format!("{}/v1/completions", self.endpoint))
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;
        debug!("Completion took {:?}", start.elapsed());

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| GenerateError::InvalidResponse("no choices returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_omits_empty_stop() {
        let request = CompletionRequest {
            model: "m",
            prompt: "p",
            max_tokens: 10,
            stop: &[],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_completion_response_parses() {
        let response: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"text":" Yes.","index":0}]}"#).unwrap();
        assert_eq!(response.choices[0].text, " Yes.");
    }

    #[test]
    fn test_generator_trims_trailing_slash() {
        let generator =
            HttpGenerator::new("http://localhost:8081/", "mistral", Duration::from_secs(1)).unwrap();
        assert_eq!(generator.endpoint, "http://localhost:8081");
        assert_eq!(generator.model_name(), "mistral");
    }
}
