//! OCR engine interface.

use std::sync::Arc;

use clap::ValueEnum;
use image::DynamicImage;

use crate::prelude::*;

use super::Detection;

pub mod replay;
pub mod tesseract;

/// Interface to an OCR engine.
///
/// Engines are created once per process and reused for every image. Callers
/// must not issue overlapping calls to the same engine.
#[async_trait]
pub trait RecognitionEngine: Send + Sync + 'static {
    /// Recognize the text in an image, which has already been rotated.
    ///
    /// Returns an empty list if no text was found.
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// The OCR engines we support.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Run the `tesseract` command-line tool.
    #[default]
    Tesseract,
    /// Play back recorded OCR results, one per call.
    Replay,
}

/// Options used to construct an engine.
#[derive(Clone, Debug)]
pub struct EngineOpts {
    /// Which engine to use.
    pub kind: EngineKind,
    /// Tesseract language code(s), such as `eng` or `eng+fra`.
    pub lang: String,
    /// Recorded responses for the replay engine.
    pub replay_path: Option<PathBuf>,
}

/// Create the OCR engine described by `opts`.
pub async fn engine_for_opts(opts: &EngineOpts) -> Result<Arc<dyn RecognitionEngine>> {
    match opts.kind {
        EngineKind::Tesseract => Ok(Arc::new(tesseract::TesseractEngine::new(
            opts.lang.clone(),
        ))),
        EngineKind::Replay => {
            let path = opts
                .replay_path
                .as_deref()
                .ok_or_else(|| anyhow!("the replay engine requires --replay PATH"))?;
            Ok(Arc::new(replay::ReplayEngine::from_path(path).await?))
        }
    }
}
