//! Client for the Gemini `generateContent` REST endpoint, with the bounded
//! backoff policy the service's overload behavior calls for.

use base64::Engine;
use base64::engine::general_purpose;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ImageProcessingInstruction, parse_instruction};
use crate::constants::{GEMINI_API_BASE, INSTRUCTION_INITIAL_BACKOFF, INSTRUCTION_MAX_RETRIES};
use crate::error::ThumbsmithError;

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Retries `operation` while it fails with a retryable error, doubling the
/// delay between attempts. Non-retryable errors surface immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    initial_delay: std::time::Duration,
    mut operation: F,
) -> Result<T, ThumbsmithError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ThumbsmithError>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt < max_retries {
                    debug!(
                        "Instruction attempt {} failed, retrying in {}ms: {}",
                        attempt,
                        delay.as_millis(),
                        err
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ThumbsmithError::Instruction("retry budget exhausted".to_string())
    }))
}

/// Thin client around the Gemini REST API.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Builds a client for the hosted endpoint.
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            base_url: GEMINI_API_BASE.to_string(),
            model,
            api_key,
        }
    }

    /// Points the client at a different endpoint; used by tests.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Sends the prompt plus the source photo and returns the parsed
    /// instruction, retrying on transient overload.
    pub async fn generate_instructions(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ImageProcessingInstruction, ThumbsmithError> {
        retry_with_backoff(INSTRUCTION_MAX_RETRIES, INSTRUCTION_INITIAL_BACKOFF, || {
            self.request_once(prompt, image, mime_type)
        })
        .await
    }

    async fn request_once(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<ImageProcessingInstruction, ThumbsmithError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    {"text": prompt},
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": general_purpose::STANDARD.encode(image),
                        }
                    }
                ]
            }]
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| ThumbsmithError::Instruction(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ThumbsmithError::Instruction(err.to_string()))?;

        if !status.is_success() {
            return Err(ThumbsmithError::Instruction(format!(
                "instruction service returned {status}: {text}"
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|err| {
            ThumbsmithError::InvalidInstruction(format!("unexpected reply envelope: {err}"))
        })?;
        if let Some(err) = parsed.error {
            return Err(ThumbsmithError::Instruction(format!(
                "instruction service returned an error: {err}"
            )));
        }

        let reply = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| {
                content
                    .parts
                    .into_iter()
                    .find_map(|part| part.text)
            })
            .ok_or_else(|| {
                ThumbsmithError::InvalidInstruction("reply contained no text part".to_string())
            })?;

        parse_instruction(&reply)
    }
}
