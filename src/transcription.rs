//! The records we write to our result channel.

use schemars::JsonSchema;

use crate::{orientation::search::CandidateResult, prelude::*};

/// One line of recognized text in our output.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TranscriptionEntry {
    /// The recognized text.
    pub text: String,

    /// The OCR engine's confidence in this text, from 0.0 to 1.0.
    pub confidence: f64,
}

/// Our successful output: the confidently recognized text of the upright
/// image, in the order the OCR engine reported it. May be empty.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcription(pub Vec<TranscriptionEntry>);

/// Our output when anything goes wrong.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ErrorOutput {
    /// A human-readable description of the error.
    pub error: String,
}

impl ErrorOutput {
    /// Describe an error, including everything in its context chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            error: format!("{err:#}"),
        }
    }
}

/// Keep only the detections with at least `min_confidence`.
pub fn filter_and_format(
    candidate: &CandidateResult,
    min_confidence: f64,
) -> Transcription {
    Transcription(
        candidate
            .detections
            .iter()
            .filter(|d| d.confidence >= min_confidence)
            .map(|d| TranscriptionEntry {
                text: d.text.clone(),
                confidence: d.confidence,
            })
            .collect(),
    )
}
