//! I/O utilities.
//!
//! This module reads JSON or TOML configuration files, and writes our single
//! JSON result to either a file or standard output. Standard output is the
//! result channel, so nothing else in the program may write to it.

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _},
};

use crate::prelude::*;

/// Does this path look like it contains JSON?
fn is_json_like(path: &Path) -> bool {
    let ext = path.extension().unwrap_or_default();
    ext == "json" || ext == "jsonl"
}

/// Read TOML or JSON from a file.
///
/// Files ending in `.json` or `.jsonl` are parsed as JSON. Everything else is
/// parsed as TOML.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    // Read all at once because our parsing libraries don't do async I/O.
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if is_json_like(path) {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a single value as one line of compact JSON to either standard output
/// or a file.
pub async fn write_json_line<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let mut json =
        serde_json::to_string(value).context("Failed to serialize JSON output")?;
    json.push('\n');
    let mut writer = create_writer(path).await?;
    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write JSON to output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}
