//! Gemini embedding client for the Generative Language API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Embedder;
use crate::config::Settings;
use crate::retry::{CallError, RetryPolicy};

/// Largest batch accepted by `batchEmbedContents`.
pub const MAX_BATCH_SIZE: usize = 100;

/// Blocking embeddings client that talks to `models/*:batchEmbedContents`.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    /// Builds a new Gemini embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
        batch_size: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Google API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
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
        let endpoint = format!(
            "{}/{}:batchEmbedContents",
            base_url.trim_end_matches('/'),
            model
        );
        info!(%model, "initialised embedding client");
        Ok(Self {
            client,
            endpoint,
            model,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            retry,
        })
    }

    /// Builds the client from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.google_api_key,
            &settings.google_base_url,
            &settings.embedding_model,
            settings.request_timeout,
            settings.retry,
            settings.embed_batch_size,
        )
    }

    fn embed_batch(&self, inputs: &[&str], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            inputs.len() <= self.batch_size,
            "batch of {} exceeds configured max {}",
            inputs.len(),
            self.batch_size
        );
        let request = BatchRequest {
            requests: inputs
                .iter()
                .map(|&text| EmbedRequest {
                    model: &self.model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type: task,
                })
                .collect(),
        };

        let parsed: BatchResponse = self.retry.run("gemini embeddings", || {
            let resp = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .map_err(CallError::from_reqwest)?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                return Err(CallError::from_status("Gemini embeddings", status, body));
            }
            resp.json::<BatchResponse>()
                .context("failed to parse Gemini embedding response")
                .map_err(CallError::Fatal)
        })?;
        anyhow::ensure!(
            parsed.embeddings.len() == inputs.len(),
            "Gemini returned {} embeddings for {} inputs",
            parsed.embeddings.len(),
            inputs.len()
        );
        Ok(parsed
            .embeddings
            .into_iter()
            .map(|entry| entry.values)
            .collect())
    }
}

impl Embedder for GeminiEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch, TaskType::RetrievalDocument)?);
            debug!(embedded = vectors.len(), total = texts.len(), "embedded batch");
        }
        Ok(vectors)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text], TaskType::RetrievalQuery)?
            .pop()
            .context("Gemini returned no embedding for the query")
    }
}

/// Normalizes a model identifier to the `models/<name>` resource form.
pub fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[derive(Serialize, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn model_names_gain_resource_prefix() {
        assert_eq!(model_path("text-embedding-004"), "models/text-embedding-004");
        assert_eq!(model_path("models/embedding-001"), "models/embedding-001");
        assert_eq!(model_path(" gemini-embedding-001 "), "models/gemini-embedding-001");
    }

    #[test]
    fn batch_request_matches_wire_format() {
        let request = BatchRequest {
            requests: vec![EmbedRequest {
                model: "models/text-embedding-004",
                content: Content {
                    parts: vec![Part { text: "olá" }],
                },
                task_type: TaskType::RetrievalQuery,
            }],
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "requests": [{
                    "model": "models/text-embedding-004",
                    "content": {"parts": [{"text": "olá"}]},
                    "taskType": "RETRIEVAL_QUERY"
                }]
            })
        );
    }

    #[test]
    fn parses_batch_response() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let parsed: BatchResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn rejects_blank_credentials() {
        let err = GeminiEmbedder::new(
            " ",
            "https://example.invalid",
            "text-embedding-004",
            Duration::from_secs(1),
            RetryPolicy::none(),
            10,
        )
        .err()
        .expect("blank key rejected");
        assert!(err.to_string().contains("API key"));
    }
}
