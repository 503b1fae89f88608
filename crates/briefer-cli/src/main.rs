//! Command line interface for the `briefer` report summarization pipeline.
//!
//! Three commands are provided:
//! - `bulk` selects documents through a filter preset (or the legacy days-back mode), then
//!   downloads, summarizes and stores each one while recording progress to a session file
//! - `single` runs one document by id and prints its summary
//! - `presets` lists the presets in the filter file
//!
//! # Usage
//!
//! ```bash
//! # Summaries of last fortnight's quarterly reports into Notion
//! briefer bulk
//!
//! # A preset with an override, stored in Google Sheets only
//! briefer bulk --preset recent_uploads --document-type "Annual Report" --sheets-only
//!
//! # Pick up where an interrupted run stopped
//! briefer bulk --resume
//!
//! # One document, keeping the PDF
//! briefer single --document-id 12345 --save-pdf report.pdf
//! ```
//!
//! Credentials come from the Bitwarden vault when it can be unlocked, otherwise from environment
//! variables (a `.env` file in the working directory is loaded first). Logs go to stderr at a
//! level chosen by `-v` and to a daily file under the configured log directory.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use briefer::{
  client::{CanoeClient, ClaudeClient},
  credential::{CredentialItem, CredentialResolver},
  filter::{FilterRequest, PresetStore},
  pipeline::Pipeline,
  prelude::*,
  progress::ProgressTracker,
  store::{NotionStore, SheetsStore},
  Config,
};
use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

pub mod commands;
pub mod error;
pub mod interaction;

use crate::{commands::*, error::*, interaction::*};

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Summarize Canoe report PDFs into Notion and Google Sheets")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv) for different levels of logging detail
  #[arg(short, long, action = ArgAction::Count, global = true, help = "Increase logging verbosity")]
  verbose: u8,

  /// Path to the configuration file. Defaults to the platform config directory.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

/// Configures console and file logging.
///
/// `RUST_LOG` takes precedence over the verbosity count for the console. The verbosity levels
/// are:
/// - 0: warn (default)
/// - 1: info
/// - 2: debug for briefer, info otherwise
/// - 3: debug
/// - 4+: trace
///
/// The file under `log_dir` always receives debug output. The returned guard flushes it on drop.
fn setup_logging(verbosity: u8, log_dir: &Path) -> Option<WorkerGuard> {
  let level = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "info,briefer=debug,briefer_cli=debug",
    3 => "debug",
    _ => "trace",
  };
  let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let console = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(verbosity >= 3)
    .with_filter(console_filter);

  let appender = std::fs::create_dir_all(log_dir).ok().and_then(|_| {
    tracing_appender::rolling::RollingFileAppender::builder()
      .rotation(tracing_appender::rolling::Rotation::DAILY)
      .filename_prefix("briefer")
      .filename_suffix("log")
      .build(log_dir)
      .ok()
  });

  match appender {
    Some(appender) => {
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .with_filter(LevelFilter::DEBUG);
      tracing_subscriber::registry().with(console).with(file).init();
      Some(guard)
    },
    None => {
      tracing_subscriber::registry().with(console).init();
      warn!("Could not open log directory {}, logging to the console only", log_dir.display());
      None
    },
  }
}

/// Entry point for the briefer CLI.
///
/// Loads `.env` and the configuration, sets up logging and runs the requested command. Errors are
/// printed with their kind and turn into a non-zero exit status.
#[tokio::main]
async fn main() -> std::process::ExitCode {
  let cli = Cli::parse();
  let dotenv = dotenvy::dotenv();

  let config = match load_config(cli.config.as_deref()) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{} {}", style(ERROR_PREFIX).red(), e);
      return std::process::ExitCode::FAILURE;
    },
  };
  let _guard = setup_logging(cli.verbose, &config.log_dir);
  match dotenv {
    Ok(path) => debug!("Loaded environment from {}", path.display()),
    Err(e) => debug!("No .env file loaded: {}", e),
  }

  let terminal = Terminal::new();
  let outcome = match cli.command {
    Commands::Bulk(args) => bulk(&terminal, &config, args).await,
    Commands::Single(args) => single(&terminal, &config, args).await,
    Commands::Presets(args) => presets(&terminal, &config, args),
  };

  match outcome {
    Ok(()) => std::process::ExitCode::SUCCESS,
    Err(e) => {
      // Reporting is best effort once the command itself has failed
      let _ = terminal.reply(ResponseContent::Error(&e));
      std::process::ExitCode::FAILURE
    },
  }
}

/// Reads the configuration from `path`, or from the default location.
fn load_config(path: Option<&Path>) -> Result<Config> {
  let path = match path {
    Some(path) => path.to_path_buf(),
    None => Config::default_path()?,
  };
  Ok(Config::load(path)?)
}
