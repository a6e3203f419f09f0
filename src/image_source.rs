//! Loading and rotating images.

use image::{DynamicImage, ImageReader};

use crate::{
    async_utils::spawn_blocking_propagating_panics, orientation::Angle, prelude::*,
};

/// Image types we can decode.
const SUPPORTED_IMAGE_TYPES: &[&str] =
    &["image/png", "image/jpeg", "image/tiff", "image/webp"];

/// Get the MIME type of a file by sniffing its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to read {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown image type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

/// Decode an image from a path. Blocking.
fn load_image_blocking(path: &Path) -> Result<DynamicImage> {
    let mime_type = get_mime_type(path)?;
    if !SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        return Err(anyhow!(
            "unsupported image type {} for {:?}",
            mime_type,
            path.display()
        ));
    }
    ImageReader::open(path)
        .with_context(|| format!("failed to open {:?}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to detect format of {:?}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {:?}", path.display()))
}

/// Decode an image from a path, on a background thread.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_image(path: &Path) -> Result<DynamicImage> {
    let path = path.to_owned();
    let image = spawn_blocking_propagating_panics(move || load_image_blocking(&path))
        .await
        .context("failed to open image")?;
    debug!(
        width = image.width(),
        height = image.height(),
        "Decoded image"
    );
    Ok(image)
}

/// Rotate an image clockwise.
///
/// Quarter turns never clip anything. For 90° and 270°, the output has the
/// input's width and height swapped.
pub fn rotate_clockwise(image: &DynamicImage, angle: Angle) -> DynamicImage {
    match angle {
        Angle::DEG_90 => image.rotate90(),
        Angle::DEG_180 => image.rotate180(),
        Angle::DEG_270 => image.rotate270(),
        _ => image.clone(),
    }
}
