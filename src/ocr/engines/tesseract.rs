//! Tesseract OCR engine.

use image::{DynamicImage, ImageFormat};
use tokio::process::Command;

use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    ocr::Detection,
    prelude::*,
};

use super::RecognitionEngine;

/// TSV `level` value for individual words.
const WORD_LEVEL: u32 = 5;

/// OCR engine wrapping the `tesseract` CLI tool.
#[non_exhaustive]
pub struct TesseractEngine {
    /// Language code(s) passed to `-l`.
    lang: String,
}

impl TesseractEngine {
    /// Create a new `tesseract` engine.
    pub fn new(lang: String) -> Self {
        Self { lang }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")?;
        let input_path = tmpdir.path().join("input.png");
        {
            let image = encodable_image(image);
            let input_path = input_path.clone();
            spawn_blocking_propagating_panics(move || {
                image.save_with_format(&input_path, ImageFormat::Png)
            })
            .await
            .context("cannot write tesseract input file")?;
        }

        // Run tesseract, asking for TSV output on stdout.
        let output = Command::new("tesseract")
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("tsv")
            .output()
            .await
            .context("cannot run tesseract")?;
        check_for_command_failure("tesseract", &output)?;

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// One row of `tesseract`'s TSV output. We ignore the layout columns.
#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u32,
    page_num: u32,
    block_num: u32,
    par_num: u32,
    line_num: u32,
    conf: f64,
    /// Missing or empty for everything but words.
    #[serde(default)]
    text: String,
}

impl TsvRow {
    /// Which line of text this row belongs to.
    fn line_key(&self) -> (u32, u32, u32, u32) {
        (self.page_num, self.block_num, self.par_num, self.line_num)
    }
}

/// Words which tesseract placed on the same line.
struct LineAccumulator {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    confidence_sum: f64,
}

impl LineAccumulator {
    fn into_detection(self) -> Detection {
        let confidence = self.confidence_sum / (self.words.len() as f64) / 100.0;
        Detection::new(self.words.join(" "), confidence.clamp(0.0, 1.0))
    }
}

/// PNG can't hold floating point pixels, so narrow those to 8 bits.
fn encodable_image(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
        other => other.clone(),
    }
}

/// Parse `tesseract`'s TSV output into one [`Detection`] per line of text.
///
/// A line's confidence is the mean of its words' confidences.
fn parse_tsv(tsv: &str) -> Result<Vec<Detection>> {
    // Tesseract doesn't quote its output, and a word may contain `"`.
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv.as_bytes());
    if reader
        .headers()
        .context("cannot read tesseract TSV header")?
        .is_empty()
    {
        return Err(anyhow!("tesseract produced no TSV output"));
    }

    let mut detections = vec![];
    let mut current: Option<LineAccumulator> = None;
    for row in reader.deserialize::<TsvRow>() {
        let row = row.context("cannot parse tesseract TSV row")?;
        let text = row.text.trim();
        if row.level != WORD_LEVEL || text.is_empty() || row.conf < 0.0 {
            continue;
        }

        match &mut current {
            Some(line) if line.key == row.line_key() => {
                line.words.push(text.to_owned());
                line.confidence_sum += row.conf;
            }
            _ => {
                if let Some(line) = current.take() {
                    detections.push(line.into_detection());
                }
                current = Some(LineAccumulator {
                    key: row.line_key(),
                    words: vec![text.to_owned()],
                    confidence_sum: row.conf,
                });
            }
        }
    }
    if let Some(line) = current {
        detections.push(line.into_detection());
    }
    Ok(detections)
}
