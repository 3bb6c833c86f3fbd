//! Long-running operation payloads and transcript assembly.

use serde::{Deserialize, Serialize};

/// Status of a long-running recognition operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub done: bool,

    #[serde(default)]
    pub error: Option<OperationError>,

    #[serde(default)]
    pub response: Option<OperationResponse>,
}

impl Operation {
    /// A finished operation carrying result chunks
    pub fn completed(chunks: Vec<RecognitionChunk>) -> Self {
        Self {
            done: true,
            response: Some(OperationResponse {
                chunks: Some(chunks),
            }),
            ..Default::default()
        }
    }

    /// An operation still in progress
    pub fn running() -> Self {
        Self::default()
    }

    /// A finished operation that reports an error
    pub fn failed(code: i64, message: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(OperationError {
                code,
                message: message.into(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(default)]
    pub chunks: Option<Vec<RecognitionChunk>>,
}

/// One recognized span of audio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionChunk {
    /// Hypotheses ordered best first
    #[serde(default)]
    pub alternatives: Vec<Alternative>,

    #[serde(default, rename = "channelTag", skip_serializing_if = "Option::is_none")]
    pub channel_tag: Option<String>,
}

impl RecognitionChunk {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            alternatives: vec![Alternative {
                text: text.into(),
                confidence: None,
            }],
            channel_tag: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Reply to a status poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Operation(Operation),

    /// The recognizer asked us to back off
    RateLimited,
}

/// Join the best alternative of each chunk, in chunk order.
///
/// Chunks without alternatives are skipped.
pub fn assemble_transcript(chunks: &[RecognitionChunk]) -> String {
    chunks
        .iter()
        .filter_map(|chunk| chunk.alternatives.first())
        .map(|alt| alt.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
