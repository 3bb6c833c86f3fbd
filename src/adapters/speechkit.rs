//! Yandex SpeechKit long-running recognition client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use super::Recognizer;
use crate::recognition::{Operation, PollOutcome, RecognitionMode};

pub const DEFAULT_SUBMIT_URL: &str =
    "https://transcribe.api.cloud.yandex.net/speech/stt/v2/longRunningRecognize";
pub const DEFAULT_OPERATION_URL: &str = "https://operation.api.cloud.yandex.net/operations";

/// SpeechKit v2 client authenticated with an API key
pub struct SpeechKitRecognizer {
    api_key: String,
    language: String,
    submit_url: String,
    operation_url: String,
    client: reqwest::Client,
}

impl SpeechKitRecognizer {
    pub fn new(api_key: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            language: language.into(),
            submit_url: DEFAULT_SUBMIT_URL.to_string(),
            operation_url: DEFAULT_OPERATION_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_urls(mut self, submit_url: impl Into<String>, operation_url: impl Into<String>) -> Self {
        self.submit_url = submit_url.into();
        self.operation_url = operation_url.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Api-Key {}", self.api_key)
    }

    fn request_body(&self, artifact_uri: &str, mode: RecognitionMode) -> Value {
        json!({
            "config": {
                "specification": {
                    "languageCode": self.language,
                    "model": mode.model(),
                },
                "audioEncoding": "OGG_OPUS",
            },
            "audio": {
                "uri": artifact_uri,
            },
        })
    }
}

#[async_trait]
impl Recognizer for SpeechKitRecognizer {
    fn name(&self) -> &str {
        "speechkit"
    }

    async fn submit(&self, artifact_uri: &str, duration_secs: f64, mode: RecognitionMode) -> Result<String> {
        debug!(uri = artifact_uri, duration_secs, %mode, "Submitting recognition");

        let response = self
            .client
            .post(&self.submit_url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&self.request_body(artifact_uri, mode))
            .send()
            .await
            .context("Failed to send recognition request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Recognition request failed with {}: {}", status, body.trim());
        }

        let operation: Operation = response
            .json()
            .await
            .context("Failed to parse recognition response")?;

        operation
            .id
            .filter(|id| !id.is_empty())
            .context("Recognition response carried no operation id")
    }

    async fn poll(&self, operation_id: &str) -> Result<PollOutcome> {
        let response = self
            .client
            .get(format!("{}/{}", self.operation_url, operation_id))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await
            .with_context(|| format!("Failed to query operation {}", operation_id))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PollOutcome::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Operation {} query failed with {}: {}", operation_id, status, body.trim());
        }

        let operation: Operation = response
            .json()
            .await
            .with_context(|| format!("Failed to parse operation {}", operation_id))?;

        Ok(PollOutcome::Operation(operation))
    }
}
