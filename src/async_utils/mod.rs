//! Asynchronous utilities for use with Tokio.
//!
//! The search loop is strictly sequential, but decoding, rotating and
//! shelling out to an OCR engine are all slow. These helpers keep that work
//! off the async executor without changing the order in which it happens.

use crate::prelude::*;

pub mod io;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        // Propagate any panics from the blocking task.
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

/// Report any command failures, and include any error output.
///
/// Standard output is logged at `trace`, since OCR engines tend to write
/// their results there. Standard error is logged at `debug`, because many
/// engines print progress chatter there even on success.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %String::from_utf8_lossy(&output.stdout),
        "Standard output from command"
    );
    debug!(
        command_name = command_name,
        output = %stderr,
        "Standard error from command",
    );

    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}
