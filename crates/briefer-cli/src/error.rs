//! Error types for the briefer CLI.

use briefer::error::BrieferError;
use thiserror::Error;

/// Error type alias used for the CLI.
pub type Result<T> = core::result::Result<T, BrieferdError>;

/// Errors that end a CLI command.
#[derive(Error, Debug)]
pub enum BrieferdError {
  /// Error from the briefer library.
  #[error(transparent)]
  Briefer(#[from] BrieferError),

  /// File system error in the CLI itself (saving a PDF, for instance).
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Writing to the terminal failed.
  #[error("Console output failed: {0}")]
  Console(std::io::Error),

  /// Arguments that parse but cannot be used together or have the wrong shape.
  #[error("Invalid arguments: {0}")]
  Usage(String),
}

impl BrieferdError {
  /// Short name of the error kind shown next to the message.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Briefer(e) => e.kind(),
      Self::Io(_) => "Io",
      Self::Console(_) => "Console",
      Self::Usage(_) => "Usage",
    }
  }
}
