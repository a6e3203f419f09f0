use std::{process::ExitCode, str::FromStr};

use clap::{CommandFactory as _, Parser, Subcommand, error::ErrorKind};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{
    async_utils::io::write_json_line, prelude::*, transcription::ErrorOutput, ui::Ui,
};

mod async_utils;
mod cmd;
mod config;
mod image_source;
mod ocr;
mod orientation;
mod prelude;
mod transcription;
mod ui;

/// Find the upright rotation of a scanned document, and OCR it.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Output:
  Results are written to standard output (or `--out`) as a single line of
  JSON. Failures are written to the same place as `{"error": "..."}`, with a
  non-zero exit status. Logs go to standard error, filtered by RUST_LOG.

Environment Variables:
  - RUST_LOG (optional): Log filter, such as `debug` or `orient_ocr=trace`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR an image, trying rotations until the text looks right.
    Ocr(cmd::ocr::OcrOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Where should our result go? `None` means stdout.
    fn output_path(&self) -> Option<&Path> {
        match self {
            Cmd::Ocr(opts) => opts.output_path.as_deref(),
            Cmd::Schema(opts) => opts.output_path.as_deref(),
        }
    }
}

/// Our entry point. Every failure is reported as a JSON error object, so we
/// never let an error escape from here.
#[tokio::main]
async fn main() -> ExitCode {
    let ui = Ui::init();

    // Load environment variables from a `.env` file, if it exists. We do
    // this first so that it can set `RUST_LOG`.
    dotenvy::dotenv().ok();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Parse command-line arguments. Help and version requests are not errors.
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(err)
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            err.exit()
        }
        Err(err) => {
            let err = anyhow!("{}", clap_error_message(&err));
            report_error(None, &err).await;
            return ExitCode::FAILURE;
        }
    };
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.output_path().is_none() {
        ui.hide_progress_bars();
    }

    match real_main(&ui, &opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(opts.subcmd.output_path(), &err).await;
            ExitCode::FAILURE
        }
    }
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: &Ui, opts: &Opts) -> Result<()> {
    match &opts.subcmd {
        Cmd::Ocr(ocr_opts) => cmd::ocr::cmd_ocr(ui, ocr_opts).await,
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await,
    }
}

/// Log an error, and write it to our result channel as [`ErrorOutput`].
async fn report_error(output_path: Option<&Path>, err: &anyhow::Error) {
    error!("{:?}", err);
    if let Err(write_err) =
        write_json_line(output_path, &ErrorOutput::from_error(err)).await
    {
        error!("Could not write error output: {:?}", write_err);
    }
}

/// Turn a `clap` error into a one-line message, without the "error: "
/// prefix or the usage text.
fn clap_error_message(err: &clap::Error) -> String {
    if err.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
        // `clap` renders our whole help text for this one.
        let subcommands = Opts::command()
            .get_subcommands()
            .map(|subcmd| subcmd.get_name().to_owned())
            .collect::<Vec<_>>();
        return format!("a subcommand is required: {}", subcommands.join(", "));
    }
    let rendered = err.render().to_string();
    let message = rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    message
        .strip_prefix("error: ")
        .unwrap_or(&message)
        .to_owned()
}
