//! The per-document sequence: download, extract, summarize, store.
//!
//! A [`Pipeline`] owns one [`DocumentSource`], an optional [`Summarizer`] and any number of
//! [`SummaryStore`]s. Documents are handled strictly one after another. A failure in any step is
//! recorded against that document and the batch moves on; only errors that are fatal to the run
//! (see [`BrieferError::is_fatal`]) stop it.
//!
//! ```no_run
//! use briefer::{
//!   client::{CanoeClient, ClaudeClient},
//!   pipeline::Pipeline,
//!   progress::ProgressTracker,
//! };
//! # use briefer::{credential::Credentials, filter::ResolvedFilterSet, Config};
//!
//! # async fn example(
//! #   config: &Config,
//! #   canoe: &Credentials,
//! #   claude: &Credentials,
//! #   filters: &ResolvedFilterSet,
//! # ) -> Result<(), briefer::error::BrieferError> {
//! let mut pipeline = Pipeline::new(CanoeClient::new(canoe, config)?)
//!   .with_summarizer(ClaudeClient::new(claude, config)?);
//!
//! let documents = pipeline.list_documents(filters).await?;
//! let mut tracker = ProgressTracker::start(&config.progress_dir, documents, Default::default())?;
//! pipeline.run(&mut tracker).await?;
//! println!("{}", tracker.summary());
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use serde::Deserializer;

use super::*;
use crate::{
  filter::ResolvedFilterSet,
  pdf::PdfAnalyzer,
  progress::ProgressTracker,
  store::{SummaryRecord, SummaryStore},
};

/// A document as listed by the document source.
///
/// Only the fields the pipeline uses are typed; everything else the API returns is kept in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
  /// Document id
  #[serde(deserialize_with = "string_or_number")]
  pub id:                 String,
  /// Document name
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:               Option<String>,
  /// Document type, e.g. `Quarterly Report`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub document_type:      Option<String>,
  /// Reporting date of the document's data
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_date:          Option<String>,
  /// File name the document was uploaded with
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub original_file_name: Option<String>,
  /// Remaining fields from the API
  #[serde(flatten)]
  pub extra:              BTreeMap<String, Value>,
}

/// Accepts ids sent as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where D: Deserializer<'de> {
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!("expected a string or number id, got {other}"))),
  }
}

impl DocumentDescriptor {
  /// A descriptor carrying only an id.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id:                 id.into(),
      name:               None,
      document_type:      None,
      data_date:          None,
      original_file_name: None,
      extra:              BTreeMap::new(),
    }
  }

  /// Name to show for this document: its name, its file name, or `Document_<id>.pdf`.
  pub fn display_name(&self) -> String {
    self
      .name
      .clone()
      .or_else(|| self.original_file_name.clone())
      .unwrap_or_else(|| format!("Document_{}.pdf", self.id))
  }

  /// Investment (fund) the document belongs to, from its first allocation.
  pub fn investment(&self) -> Option<String> {
    let investment = self.extra.get("allocations")?.as_array()?.first()?.get("investment")?;
    match investment {
      Value::String(name) => Some(name.clone()),
      Value::Object(fields) => fields.get("name").and_then(Value::as_str).map(str::to_string),
      _ => None,
    }
  }
}

/// Where documents come from.
#[async_trait]
pub trait DocumentSource: Send {
  /// Lists the documents matching `filters`.
  async fn list_documents(&mut self, filters: &ResolvedFilterSet) -> Result<Vec<DocumentDescriptor>>;

  /// Looks up a single document by id.
  async fn describe(&mut self, document_id: &str) -> Result<DocumentDescriptor>;

  /// Downloads the PDF of a document.
  ///
  /// Implementations retry transient failures and report a [`BrieferError::DownloadFailure`] once
  /// retries are exhausted.
  async fn download(&mut self, document_id: &str) -> Result<Vec<u8>>;
}

/// Turns extracted text into a summary.
#[async_trait]
pub trait Summarizer: Send {
  /// Summarizes `text` taken from the document called `document_name`.
  async fn summarize(&mut self, document_name: &str, text: &str) -> Result<String>;
}

/// Result of running one document through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
  /// The document
  pub document: DocumentDescriptor,
  /// Raw PDF bytes
  pub pdf:      Vec<u8>,
  /// Extracted text with page separators
  pub text:     String,
  /// Summary, when a summarizer is configured
  pub summary:  Option<String>,
  /// URLs returned by stores, keyed by store name
  pub urls:     BTreeMap<&'static str, String>,
  /// Time spent on the document
  pub elapsed:  Duration,
}

/// Download, extract, summarize and store, one document at a time.
pub struct Pipeline {
  /// Where documents come from
  source:     Box<dyn DocumentSource>,
  /// Summary generator; `None` skips summarization
  summarizer: Option<Box<dyn Summarizer>>,
  /// Destinations, written in order
  stores:     Vec<Box<dyn SummaryStore>>,
  /// Text extraction
  analyzer:   PdfAnalyzer,
}

impl Pipeline {
  /// A pipeline with no summarizer and no stores.
  pub fn new(source: impl DocumentSource + 'static) -> Self {
    Self {
      source:     Box::new(source),
      summarizer: None,
      stores:     Vec::new(),
      analyzer:   PdfAnalyzer::new(),
    }
  }

  /// Summarizes every document with `summarizer`.
  pub fn with_summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
    self.summarizer = Some(Box::new(summarizer));
    self
  }

  /// Adds a destination after the existing ones.
  pub fn with_store(mut self, store: impl SummaryStore + 'static) -> Self {
    self.stores.push(Box::new(store));
    self
  }

  /// Names of the configured stores, in write order.
  pub fn store_names(&self) -> Vec<&'static str> { self.stores.iter().map(|s| s.name()).collect() }

  /// Lists the documents matching `filters`.
  pub async fn list_documents(
    &mut self,
    filters: &ResolvedFilterSet,
  ) -> Result<Vec<DocumentDescriptor>> {
    let documents = self.source.list_documents(filters).await?;
    info!("Found {} documents", documents.len());
    Ok(documents)
  }

  /// Looks up a single document by id.
  pub async fn describe(&mut self, document_id: &str) -> Result<DocumentDescriptor> {
    self.source.describe(document_id).await
  }

  /// Runs one document through every step.
  ///
  /// # Errors
  ///
  /// One of the per-document kinds: [`BrieferError::DownloadFailure`],
  /// [`BrieferError::ExtractionFailure`], [`BrieferError::SummarizationFailure`] or
  /// [`BrieferError::StoreWriteFailure`]. Every store is attempted even if an earlier one fails;
  /// the first store failure is returned.
  pub async fn process_document(
    &mut self,
    document: &DocumentDescriptor,
  ) -> Result<ProcessedDocument> {
    let started = Instant::now();
    let id = document.id.as_str();
    let name = document.display_name();

    debug!("Downloading {}", id);
    let pdf = self.source.download(id).await.map_err(|e| match e {
      BrieferError::DownloadFailure { .. } => e,
      other => BrieferError::DownloadFailure { document_id: id.to_string(), reason: other.to_string() },
    })?;

    let text = self.analyzer.extract_text(id, &pdf)?;

    let summary = match self.summarizer.as_mut() {
      Some(summarizer) => {
        debug!("Summarizing {}", id);
        let summary = summarizer.summarize(&name, &text).await.map_err(|e| match e {
          BrieferError::SummarizationFailure { .. } => e,
          other => BrieferError::SummarizationFailure {
            document_id: id.to_string(),
            reason:      other.to_string(),
          },
        })?;
        Some(summary)
      },
      None => None,
    };

    let mut record = SummaryRecord::new(document.clone(), summary.clone());
    let mut urls = BTreeMap::new();
    let mut first_failure = None;
    for store in self.stores.iter_mut() {
      match store.write(&record).await {
        Ok(url) => {
          debug!("Stored {} in {}", id, store.name());
          if let Some(url) = url {
            if store.name() == "notion" {
              record.notion_url = Some(url.clone());
            }
            urls.insert(store.name(), url);
          }
        },
        Err(e) => {
          error!("Writing {} to {} failed: {}", id, store.name(), e);
          if first_failure.is_none() {
            first_failure = Some(BrieferError::StoreWriteFailure {
              document_id: id.to_string(),
              store:       store.name().to_string(),
              reason:      e.to_string(),
            });
          }
        },
      }
    }
    if let Some(failure) = first_failure {
      return Err(failure);
    }

    Ok(ProcessedDocument { document: document.clone(), pdf, text, summary, urls, elapsed: started.elapsed() })
  }

  /// Processes the remaining documents of `tracker` in order.
  ///
  /// Per-document failures are recorded in the tracker and the loop continues. A fatal error marks
  /// the session interrupted and is returned.
  pub async fn run(&mut self, tracker: &mut ProgressTracker) -> Result<()> {
    let queue = tracker.remaining().to_vec();
    let total = queue.len();

    for (index, document) in queue.iter().enumerate() {
      info!("[{}/{}] Processing {} ({})", index + 1, total, document.display_name(), document.id);
      match self.process_document(document).await {
        Ok(processed) => {
          info!("Finished {} in {:.1}s", document.id, processed.elapsed.as_secs_f64());
          tracker.mark_processed(document, processed.elapsed)?;
        },
        Err(e) if !e.is_fatal() => {
          warn!("{}", e);
          tracker.mark_failed(document, &e)?;
        },
        Err(e) => {
          error!("Stopping the run: {}", e);
          tracker.interrupt()?;
          return Err(e);
        },
      }
    }

    tracker.finish()
  }
}
