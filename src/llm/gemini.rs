//! Gemini `generateContent` client.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ChatModel;
use crate::config::Settings;
use crate::embedder::gemini::model_path;
use crate::retry::{CallError, RetryPolicy};

/// Temperature used for answers; zero keeps decoding deterministic.
pub const ANSWER_TEMPERATURE: f32 = 0.0;

/// Blocking client for `models/*:generateContent`.
pub struct GeminiChat {
    client: Client,
    endpoint: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl GeminiChat {
    /// Builds a chat client for `model` with a fixed sampling temperature.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Google API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing chat model name");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Google API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Gemini HTTP client")?;
        let model = model_path(model);
        info!(%model, temperature, "initialised chat model");
        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            temperature,
            retry,
        })
    }

    /// Builds the answering client from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.google_api_key,
            &settings.google_base_url,
            &settings.chat_model,
            ANSWER_TEMPERATURE,
            settings.request_timeout,
            settings.retry,
        )
    }
}

impl ChatModel for GeminiChat {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };
        let parsed: GenerateResponse = self.retry.run("gemini chat", || {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .map_err(CallError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                return Err(CallError::from_status("Gemini generateContent", status, text));
            }
            resp.json::<GenerateResponse>()
                .context("failed to parse Gemini response")
                .map_err(CallError::Fatal)
        })?;
        extract_answer(parsed)
    }
}

fn extract_answer(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        bail!("Gemini returned no answer: {}", reason);
    };
    let answer: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if answer.is_empty() {
        bail!(
            "Gemini response missing text content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(answer)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
