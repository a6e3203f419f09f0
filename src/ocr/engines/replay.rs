//! An "OCR" engine that plays back recorded results.
//!
//! Useful for testing the orientation search end to end without installing a
//! real OCR engine, and for re-running a search against OCR output captured
//! elsewhere.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;
use schemars::JsonSchema;

use crate::{async_utils::io::read_json_or_toml, ocr::Detection, prelude::*};

use super::RecognitionEngine;

/// A recorded series of OCR responses.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ReplayScript {
    /// The response to the first call, the second call, and so on.
    pub responses: Vec<Vec<Detection>>,
}

/// OCR engine which returns the Nth recorded response on the Nth call.
///
/// Calls past the end of the script find no text.
pub struct ReplayEngine {
    script: ReplayScript,
    calls: AtomicUsize,
}

impl ReplayEngine {
    /// Create a new replay engine.
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Load a [`ReplayScript`] from a JSON or TOML file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let script = read_json_or_toml::<ReplayScript>(path)
            .await
            .context("failed to load replay script")?;
        Ok(Self::new(script))
    }

    /// How many times have we been called?
    #[cfg(test)]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for ReplayEngine {
    #[instrument(level = "debug", skip_all)]
    async fn recognize(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .script
            .responses
            .get(call)
            .cloned()
            .unwrap_or_default();
        trace!(call, detections = response.len(), "Replaying OCR response");
        Ok(response)
    }
}
