//! Error types for the briefer library.
//!
//! Errors fall into three groups:
//! - Configuration errors (bad filter file, unknown preset, missing credentials) that abort a run
//!   before any document is touched
//! - Recoverable conditions (malformed dates, unknown override keys) that are logged and worked
//!   around
//! - Per-document failures (download, extraction, summarization, store writes) that are recorded
//!   against one document while the batch moves on
//!
//! # Examples
//!
//! ```
//! use briefer::error::BrieferError;
//!
//! let err = BrieferError::PresetNotFound("monthly".into());
//! assert!(err.is_fatal());
//!
//! let err = BrieferError::ExtractionFailure { document_id: "abc".into(), reason: "empty".into() };
//! assert!(!err.is_fatal());
//! ```

use thiserror::Error;

/// Error type alias used for the [`briefer`](crate) crate.
pub type Result<T> = core::result::Result<T, BrieferError>;

/// Errors that can occur while resolving filters, credentials or processing documents.
#[derive(Error, Debug)]
pub enum BrieferError {
  /// A preset named on the command line does not exist in the loaded filter file.
  #[error("Filter preset \"{0}\" not found")]
  PresetNotFound(String),

  /// The filter modes supplied cannot be combined into one query.
  ///
  /// Raised when both a preset and a legacy days-back value are given, or when neither is given
  /// and the overrides alone do not describe a query.
  #[error("Conflicting filter mode: {0}")]
  ConflictingFilterMode(String),

  /// A date value is neither an `auto:<n><unit>` expression nor an ISO `YYYY-MM-DD` date.
  ///
  /// Callers log this and pass the value through unchanged.
  #[error("Malformed date expression \"{0}\"")]
  MalformedDateExpression(String),

  /// An override key outside the recognized filter parameters. Dropped with a warning.
  #[error("Unrecognized override parameter \"{0}\"")]
  UnrecognizedOverrideParameter(String),

  /// The filter file could not be parsed into presets.
  #[error("Invalid filter file: {0}")]
  InvalidFilterFile(String),

  /// No backend could supply every required field of a credential item.
  #[error("Credential item \"{item}\" not found (missing: {})", missing.join(", "))]
  CredentialNotFound {
    /// The credential item that was requested
    item:    String,
    /// Logical field names that no backend could supply
    missing: Vec<String>,
  },

  /// The secret manager could not be used at all (not installed, not logged in, locked).
  ///
  /// Credential resolution falls through to the next provider on this error.
  #[error("Secret backend unavailable: {0}")]
  SecretBackendUnavailable(String),

  /// Unlocking the vault did not finish within the allowed time.
  #[error("Vault unlock timed out after {0} seconds")]
  UnlockTimeout(u64),

  /// A session token failed validation. The vault has to be unlocked again outside the pipeline.
  #[error("Invalid or expired vault session: {0}")]
  SessionInvalid(String),

  /// Downloading a document failed after all retries.
  #[error("Failed to download document {document_id}: {reason}")]
  DownloadFailure {
    /// Canoe document id
    document_id: String,
    /// Last error seen
    reason:      String,
  },

  /// Text could not be extracted from a downloaded PDF.
  #[error("Failed to extract text from document {document_id}: {reason}")]
  ExtractionFailure {
    /// Canoe document id
    document_id: String,
    /// Underlying failure
    reason:      String,
  },

  /// The summarization API failed for a document.
  #[error("Failed to summarize document {document_id}: {reason}")]
  SummarizationFailure {
    /// Canoe document id
    document_id: String,
    /// Underlying failure
    reason:      String,
  },

  /// Writing a summary to a destination store failed after all retries.
  #[error("Failed to write document {document_id} to {store}: {reason}")]
  StoreWriteFailure {
    /// Canoe document id
    document_id: String,
    /// Name of the destination store
    store:       String,
    /// Last error seen
    reason:      String,
  },

  /// An API returned a non-success response.
  #[error("API error ({status}): {message}")]
  ApiError {
    /// HTTP status code
    status:  u16,
    /// Response body or message
    message: String,
  },

  /// A network request failed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// A file system or subprocess operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// JSON (de)serialization failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The TOML configuration could not be parsed.
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// The configuration could not be written back as TOML.
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),

  /// PDF parsing errors from lopdf.
  #[error(transparent)]
  Lopdf(#[from] lopdf::Error),

  /// Signing the Google service-account assertion failed.
  #[error(transparent)]
  Jwt(#[from] jsonwebtoken::errors::Error),

  /// A URL could not be built.
  #[error(transparent)]
  Url(#[from] url::ParseError),

  /// Generic configuration problem.
  #[error("{0}")]
  Config(String),
}

impl BrieferError {
  /// Whether this error must abort the whole run rather than a single document.
  pub fn is_fatal(&self) -> bool {
    !matches!(
      self,
      Self::MalformedDateExpression(_)
        | Self::UnrecognizedOverrideParameter(_)
        | Self::DownloadFailure { .. }
        | Self::ExtractionFailure { .. }
        | Self::SummarizationFailure { .. }
        | Self::StoreWriteFailure { .. }
    )
  }

  /// Short name of this error kind, as written to failure records.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::PresetNotFound(_) => "PresetNotFound",
      Self::ConflictingFilterMode(_) => "ConflictingFilterMode",
      Self::MalformedDateExpression(_) => "MalformedDateExpression",
      Self::UnrecognizedOverrideParameter(_) => "UnrecognizedOverrideParameter",
      Self::InvalidFilterFile(_) => "InvalidFilterFile",
      Self::CredentialNotFound { .. } => "CredentialNotFound",
      Self::SecretBackendUnavailable(_) => "SecretBackendUnavailable",
      Self::UnlockTimeout(_) => "UnlockTimeout",
      Self::SessionInvalid(_) => "SessionInvalid",
      Self::DownloadFailure { .. } => "DownloadFailure",
      Self::ExtractionFailure { .. } => "ExtractionFailure",
      Self::SummarizationFailure { .. } => "SummarizationFailure",
      Self::StoreWriteFailure { .. } => "StoreWriteFailure",
      Self::ApiError { .. } => "ApiError",
      Self::Network(_) => "Network",
      Self::Path(_) => "Io",
      Self::Json(_) => "Json",
      Self::TomlDe(_) | Self::TomlSer(_) => "Toml",
      Self::Lopdf(_) => "Pdf",
      Self::Jwt(_) => "Jwt",
      Self::Url(_) => "Url",
      Self::Config(_) => "Config",
    }
  }

  /// Whether a credential provider chain should move on to the next provider.
  pub fn allows_fallback(&self) -> bool {
    matches!(self, Self::CredentialNotFound { .. } | Self::SecretBackendUnavailable(_))
  }

  /// Whether retrying the same call later might succeed.
  ///
  /// Connection problems, timeouts, `429` and `5xx` responses are transient.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
      Self::ApiError { status, .. } => *status == 429 || *status >= 500,
      _ => false,
    }
  }
}
