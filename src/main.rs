//! aac-transcode
//!
//! Command-line front end: `aac-transcode <input> <output> [config.toml]`.
//! Transcodes the single audio stream of `input` to AAC in `output`.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aac_transcode::{LogFormat, LoggingConfig, Result, TranscodeConfig, TranscodeError};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "aac-transcode";

/// Positional command-line arguments
#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let result = run(&args);
    if let Some(line) = error_line(&result) {
        eprintln!("{}", line);
    }
    ExitCode::from(exit_status(&result))
}

/// Process exit status for a run: 0 on success, 1 on any error.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// The single line printed to stderr for a failed run.
fn error_line(result: &Result<()>) -> Option<String> {
    let e = result.as_ref().err()?;
    if e.is_defect() {
        Some(format!("{}: internal error: {}", APP_NAME, e))
    } else {
        Some(format!("{}: {}", APP_NAME, e))
    }
}

fn run(args: &[String]) -> Result<()> {
    let args = parse_args(args)?;

    let config = match &args.config {
        Some(path) => TranscodeConfig::from_file(path)?,
        None => TranscodeConfig::default(),
    };

    init_logging(&config.logging)?;

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    aac_transcode::init()?;
    aac_transcode::install_log_filter();
    tracing::info!("FFmpeg version: {}", aac_transcode::ffmpeg_version_info());

    aac_transcode::transcode_file(&args.input, &args.output, &config)?;
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args> {
    let program = args.first().map(String::as_str).unwrap_or(APP_NAME);
    match args {
        [_, input, output] => Ok(Args {
            input: input.into(),
            output: output.into(),
            config: None,
        }),
        [_, input, output, config] => Ok(Args {
            input: input.into(),
            output: output.into(),
            config: Some(config.into()),
        }),
        _ => Err(TranscodeError::Usage(format!(
            "usage: {} <input file> <output file> [config.toml]",
            program
        ))),
    }
}

/// Initialize logging with tracing. Logs go to stderr.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level).map_err(|e| {
        TranscodeError::Config(format!("invalid logging.level {:?}: {}", config.level, e))
    })?;

    let (json, pretty) = match config.format {
        LogFormat::Json => (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
    Ok(())
}
