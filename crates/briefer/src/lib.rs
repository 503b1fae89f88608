//! Financial report summarization pipeline.
//!
//! `briefer` pulls PDF reports out of the Canoe document API, extracts their text, asks Claude for
//! a short summary and files that summary in Notion and/or Google Sheets. It provides:
//!
//! - Named filter presets with relative date expressions (`auto:7d`, `auto:6m`, ...)
//! - Credential lookup from a Bitwarden vault with environment-variable fallback
//! - Thin clients for Canoe, Claude, Notion and Google Sheets
//! - PDF text extraction
//! - Sequential bulk processing with resumable progress tracking
//!
//! # Getting Started
//!
//! ```no_run
//! use briefer::{
//!   credential::CredentialResolver,
//!   filter::{FilterRequest, PresetStore},
//!   prelude::*,
//!   Config,
//! };
//!
//! # async fn example() -> Result<(), BrieferError> {
//! let config = Config::load(Config::default_path()?)?;
//!
//! // Turn a preset into a concrete Canoe query
//! let store = PresetStore::from_file(&config.filter_file)?;
//! let filters = store.resolve(&FilterRequest::preset("quarterly_reports"))?;
//!
//! // Credentials come from Bitwarden when it is unlocked, otherwise from the environment
//! let mut credentials = CredentialResolver::standard(&config);
//! let canoe = credentials.resolve(briefer::credential::CredentialItem::Canoe).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`date`]: Relative date expressions
//! - [`filter`]: Filter presets, overrides and the resolved query
//! - [`credential`]: Credential items, providers and the in-memory cache
//! - [`client`]: Canoe and Claude API clients
//! - [`store`]: Destinations for finished summaries
//! - [`pdf`]: PDF text extraction
//! - [`pipeline`]: The per-document download, extract, summarize, store sequence
//! - [`progress`]: Session files for resuming and retrying bulk runs
//! - [`retry`]: Bounded exponential backoff and call pacing

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::BTreeMap,
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};
use url::Url;
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod client;
pub mod credential;
pub mod date;
pub mod error;
pub mod filter;
pub mod pdf;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod store;

mod configuration;

pub use configuration::Config;

use crate::error::*;

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use briefer::prelude::*;
///
/// fn example() -> Result<(), BrieferError> { Ok(()) }
/// ```
pub mod prelude {
  pub use crate::{
    credential::CredentialProvider,
    error::BrieferError,
    pipeline::{DocumentSource, Summarizer},
    store::SummaryStore,
  };
}

/// Shortens `value` to at most `max` characters, appending `...` when anything was cut.
///
/// Works on character boundaries so multi-byte text never panics.
pub fn truncate(value: &str, max: usize) -> String {
  if value.chars().count() <= max {
    return value.to_string();
  }
  let keep = max.saturating_sub(3);
  let mut out: String = value.chars().take(keep).collect();
  out.push_str("...");
  out
}

/// Fails with [`BrieferError::ApiError`] carrying the response body unless `response` succeeded.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let message = response.text().await.unwrap_or_default();
  Err(BrieferError::ApiError { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly ten", 11), "exactly ten");
    assert_eq!(truncate("a much longer sentence", 10), "a much ...");
    assert_eq!(truncate("ééééééé", 5), "éé...");
  }
}
