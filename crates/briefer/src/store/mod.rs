//! Destinations for finished summaries.
//!
//! A [`SummaryStore`] receives one [`SummaryRecord`] per processed document. Stores run in the
//! order they were added to the pipeline; a URL returned by one store (the Notion page) is passed on
//! to the stores after it so the spreadsheet row can link to the page.

use super::*;
use crate::{
  credential::{CredentialField, Credentials},
  pipeline::DocumentDescriptor,
  retry::{RateLimiter, RetryPolicy},
};

mod notion;
mod sheets;

pub use notion::NotionStore;
pub use sheets::{SheetRow, SheetStatistics, SheetsStore, SHEET_HEADERS};

/// What a store receives for one document.
#[derive(Debug, Clone)]
pub struct SummaryRecord {
  /// The document as listed by the source
  pub document:     DocumentDescriptor,
  /// Generated summary, absent when summarization was skipped
  pub summary:      Option<String>,
  /// When processing finished
  pub processed_at: NaiveDateTime,
  /// Page URL from an earlier store, if any
  pub notion_url:   Option<String>,
}

impl SummaryRecord {
  /// A record stamped with the current local time.
  pub fn new(document: DocumentDescriptor, summary: Option<String>) -> Self {
    Self { document, summary, processed_at: Local::now().naive_local(), notion_url: None }
  }
}

/// A place summaries are written to.
#[async_trait]
pub trait SummaryStore: Send {
  /// Short name used in logs and failure records.
  fn name(&self) -> &'static str;

  /// Writes one record, retrying transient failures internally.
  ///
  /// Returns a URL for the written entry when the store has one.
  async fn write(&mut self, record: &SummaryRecord) -> Result<Option<String>>;
}
