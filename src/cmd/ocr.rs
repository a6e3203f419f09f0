//! The `ocr` subcommand.

use clap::Args;

use crate::{
    async_utils::io::write_json_line,
    config::OrientConfig,
    image_source::load_image,
    ocr::engines::{EngineKind, EngineOpts, RecognitionEngine, engine_for_opts},
    orientation::search::OrientationSearch,
    prelude::*,
    transcription::{Transcription, filter_and_format},
    ui::Ui,
};

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The image to OCR.
    #[clap(value_name = "IMAGE")]
    pub image_path: PathBuf,

    /// Score every primary rotation instead of stopping at the first good
    /// one. Fallback rotations are never tried in this mode.
    #[clap(long)]
    pub exhaustive: bool,

    /// A JSON or TOML file overriding our keywords and thresholds.
    #[clap(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The OCR engine to use.
    #[clap(long, value_enum, default_value_t = EngineKind::Tesseract)]
    pub engine: EngineKind,

    /// Language(s) for tesseract, such as `eng` or `eng+fra`.
    #[clap(long, default_value = "eng")]
    pub lang: String,

    /// Recorded OCR responses, for `--engine replay`.
    #[clap(long = "replay", value_name = "PATH")]
    pub replay_path: Option<PathBuf>,

    /// Write our result here instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

impl OcrOpts {
    fn engine_opts(&self) -> EngineOpts {
        EngineOpts {
            kind: self.engine,
            lang: self.lang.clone(),
            replay_path: self.replay_path.clone(),
        }
    }
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(image = %opts.image_path.display()))]
pub async fn cmd_ocr(ui: &Ui, opts: &OcrOpts) -> Result<()> {
    let config = OrientConfig::load(opts.config.as_deref()).await?;
    let engine = engine_for_opts(&opts.engine_opts()).await?;
    let transcription = orient_and_transcribe(
        ui,
        engine.as_ref(),
        &config,
        &opts.image_path,
        opts.exhaustive,
    )
    .await?;
    write_json_line(opts.output_path.as_deref(), &transcription).await
}

/// Find the upright rotation of the image at `path`, and return its
/// confidently recognized text.
pub async fn orient_and_transcribe(
    ui: &Ui,
    engine: &dyn RecognitionEngine,
    config: &OrientConfig,
    path: &Path,
    exhaustive: bool,
) -> Result<Transcription> {
    let vocabulary = config.vocabulary()?;
    let policy = config.search_policy()?;

    // Nothing gets searched if we can't decode the image.
    let image = load_image(path).await?;

    let pb = ui.new_search_progress(policy.max_attempts(exhaustive));
    let outcome = OrientationSearch::new(engine, &vocabulary, &policy)
        .with_progress(pb.clone())
        .search(&image, exhaustive)
        .await;
    pb.finish_and_clear();
    let outcome = outcome?;

    let tried = outcome
        .attempts
        .iter()
        .map(|a| format!("{} ({:?}): {}", a.angle, a.phase, a.score))
        .collect::<Vec<_>>()
        .join(", ");
    let transcription = filter_and_format(&outcome.best, config.min_confidence);
    info!(
        %tried,
        angle = %outcome.best_angle(),
        score = outcome.best_score(),
        kept = transcription.0.len(),
        dropped = outcome.best.detections.len() - transcription.0.len(),
        "Transcribed image"
    );
    Ok(transcription)
}
