//! Text recognition.
//!
//! The OCR engine itself is a black box. We hand it an image and get back a
//! list of text fragments, each with the engine's own confidence estimate.

use schemars::JsonSchema;

use crate::prelude::*;

pub mod engines;

/// One text fragment recognized by an OCR engine.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Detection {
    /// The recognized text.
    pub text: String,

    /// The engine's confidence in this fragment, from 0.0 to 1.0.
    pub confidence: f64,
}

impl Detection {
    /// Create a new detection.
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}
