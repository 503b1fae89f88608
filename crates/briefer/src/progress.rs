//! Session files for resuming and retrying bulk runs.
//!
//! Every bulk run keeps a session file `session_<YYYYmmdd_HHMMSS>.json` in the progress directory.
//! It is rewritten after each document, so an interrupted run can pick up the documents it had not
//! reached yet. Documents that fail are also merged into `failed_documents.json` (one entry per
//! document id) so a later run can retry just those.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use briefer::{pipeline::DocumentDescriptor, progress::ProgressTracker};
//!
//! # fn example() -> Result<(), briefer::error::BrieferError> {
//! let documents = vec![DocumentDescriptor::new("doc-1"), DocumentDescriptor::new("doc-2")];
//! let mut tracker = ProgressTracker::start("data/progress", documents, BTreeMap::new())?;
//! // ... process documents, calling mark_processed / mark_failed ...
//! tracker.finish()?;
//! println!("{}", tracker.summary());
//! # Ok(())
//! # }
//! ```

use crate::pipeline::DocumentDescriptor;

use super::*;

/// File in the progress directory that accumulates failed documents across runs.
pub const FAILED_LOG: &str = "failed_documents.json";

/// How many failures the summary report lists.
const REPORTED_FAILURES: usize = 5;

/// Lifecycle of a session file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  /// Documents are still being processed
  Running,
  /// Every document was attempted
  Completed,
  /// The run stopped with documents left
  Interrupted,
}

/// A document that made it through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
  /// Document id
  pub document_id:  String,
  /// Display name
  pub name:         String,
  /// When it finished
  pub processed_at: NaiveDateTime,
  /// Wall time spent on it
  pub seconds:      f64,
}

/// A document that failed, with enough detail to retry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDocument {
  /// The document as originally listed
  pub document:   DocumentDescriptor,
  /// Error kind, e.g. `DownloadFailure`
  pub error_kind: String,
  /// Error message
  pub error:      String,
  /// When it failed
  pub failed_at:  NaiveDateTime,
}

/// Contents of a session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
  /// File stem, `session_<timestamp>`
  pub session_id:      String,
  /// When the session started
  pub started_at:      NaiveDateTime,
  /// Last time the file was written
  pub updated_at:      NaiveDateTime,
  /// Current status
  pub status:          SessionStatus,
  /// Documents selected for this session
  pub total_documents: usize,
  /// Query parameters the documents were selected with
  #[serde(default)]
  pub filters:         BTreeMap<String, String>,
  /// Documents processed so far
  pub processed:       Vec<ProcessedEntry>,
  /// Documents that failed so far
  pub failed:          Vec<FailedDocument>,
  /// Documents not yet attempted, in processing order
  pub remaining:       Vec<DocumentDescriptor>,
}

/// Figures for the end-of-run report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
  /// Session the figures belong to
  pub session_id:      String,
  /// Documents selected
  pub total:           usize,
  /// Documents processed
  pub processed:       usize,
  /// Documents failed
  pub failed:          usize,
  /// Documents never attempted
  pub remaining:       usize,
  /// Mean seconds per processed document
  pub average_seconds: Option<f64>,
  /// Fastest processed document
  pub min_seconds:     Option<f64>,
  /// Slowest processed document
  pub max_seconds:     Option<f64>,
  /// The first few failures as `(id, name, error)`
  pub first_failures:  Vec<(String, String, String)>,
}

impl ProgressSummary {
  /// Share of attempted documents that succeeded, as a percentage.
  pub fn success_rate(&self) -> f64 {
    let attempted = self.processed + self.failed;
    if attempted == 0 {
      return 0.0;
    }
    self.processed as f64 * 100.0 / attempted as f64
  }
}

impl Display for ProgressSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let percent = |n: usize| if self.total == 0 { 0.0 } else { n as f64 * 100.0 / self.total as f64 };

    writeln!(f, "Session {}", self.session_id)?;
    writeln!(f, "  Total documents: {}", self.total)?;
    writeln!(f, "  Processed:       {} ({:.1}%)", self.processed, percent(self.processed))?;
    writeln!(f, "  Failed:          {} ({:.1}%)", self.failed, percent(self.failed))?;
    writeln!(f, "  Remaining:       {}", self.remaining)?;
    writeln!(f, "  Success rate:    {:.1}%", self.success_rate())?;
    if let (Some(avg), Some(min), Some(max)) =
      (self.average_seconds, self.min_seconds, self.max_seconds)
    {
      writeln!(f, "  Time per document: avg {avg:.2}s, min {min:.2}s, max {max:.2}s")?;
    }
    if !self.first_failures.is_empty() {
      writeln!(f, "  Failures:")?;
      for (id, name, error) in &self.first_failures {
        writeln!(f, "    - {name} ({id}): {error}")?;
      }
      if self.failed > self.first_failures.len() {
        writeln!(f, "    ... and {} more", self.failed - self.first_failures.len())?;
      }
    }
    Ok(())
  }
}

/// Keeps the session file of one bulk run up to date.
#[derive(Debug)]
pub struct ProgressTracker {
  /// Progress directory
  dir:    PathBuf,
  /// This session's file
  path:   PathBuf,
  /// Current contents
  record: SessionRecord,
}

impl ProgressTracker {
  /// Starts a new session over `documents` and writes its file.
  pub fn start(
    dir: impl AsRef<Path>,
    documents: Vec<DocumentDescriptor>,
    filters: BTreeMap<String, String>,
  ) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir)?;

    let now = Local::now().naive_local();
    let stem = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
    let mut session_id = stem.clone();
    let mut suffix = 2;
    while dir.join(format!("{session_id}.json")).exists() {
      session_id = format!("{stem}_{suffix}");
      suffix += 1;
    }

    let record = SessionRecord {
      session_id: session_id.clone(),
      started_at: now,
      updated_at: now,
      status: SessionStatus::Running,
      total_documents: documents.len(),
      filters,
      processed: Vec::new(),
      failed: Vec::new(),
      remaining: documents,
    };
    let tracker = Self { path: dir.join(format!("{session_id}.json")), dir, record };
    tracker.save()?;
    info!("Started progress session {} with {} documents", session_id, tracker.record.total_documents);
    Ok(tracker)
  }

  /// Reopens a session file to continue with its remaining documents.
  pub fn resume(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let mut record: SessionRecord = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    record.status = SessionStatus::Running;
    record.updated_at = Local::now().naive_local();

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let tracker = Self { dir, path, record };
    tracker.save()?;
    info!(
      "Resuming session {}: {} processed, {} failed, {} remaining",
      tracker.record.session_id,
      tracker.record.processed.len(),
      tracker.record.failed.len(),
      tracker.record.remaining.len()
    );
    Ok(tracker)
  }

  /// Finds the most recently modified session file in `dir`.
  pub fn latest_session(dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
      return Ok(None);
    }

    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
      let path = entry?.path();
      let is_session = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("session_") && n.ends_with(".json"));
      if !is_session {
        continue;
      }
      let modified = std::fs::metadata(&path)?.modified()?;
      if latest.as_ref().map_or(true, |(time, _)| modified > *time) {
        latest = Some((modified, path));
      }
    }
    Ok(latest.map(|(_, path)| path))
  }

  /// Picks a session file: `latest`, a path, or a file name inside `dir`.
  pub fn locate_session(dir: impl AsRef<Path>, selector: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if selector == "latest" {
      return Self::latest_session(dir)?.ok_or_else(|| {
        BrieferError::Config(format!("No session files found in {}", dir.display()))
      });
    }

    let direct = PathBuf::from(selector);
    if direct.exists() {
      return Ok(direct);
    }
    let inside = dir.join(selector);
    if inside.exists() {
      return Ok(inside);
    }
    Err(BrieferError::Config(format!("Session file {selector} not found")))
  }

  /// Documents accumulated in the failure log of `dir`.
  pub fn load_failed(dir: impl AsRef<Path>) -> Result<Vec<FailedDocument>> {
    let path = dir.as_ref().join(FAILED_LOG);
    if !path.exists() {
      return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
  }

  /// Writes `failures` into the failure log of `dir`, replacing entries with the same id.
  fn merge_failed(dir: &Path, failures: &[FailedDocument]) -> Result<()> {
    let mut merged = Self::load_failed(dir)?;
    for failure in failures {
      merged.retain(|f| f.document.id != failure.document.id);
      merged.push(failure.clone());
    }
    std::fs::write(dir.join(FAILED_LOG), serde_json::to_string_pretty(&merged)?)?;
    Ok(())
  }

  /// Drops `document_id` from the failure log of `dir`, if present.
  fn forget_failed(dir: &Path, document_id: &str) -> Result<()> {
    let mut failures = Self::load_failed(dir)?;
    let before = failures.len();
    failures.retain(|f| f.document.id != document_id);
    if failures.len() != before {
      debug!("Removing {} from the failure log", document_id);
      std::fs::write(dir.join(FAILED_LOG), serde_json::to_string_pretty(&failures)?)?;
    }
    Ok(())
  }

  /// Path of this session's file.
  pub fn path(&self) -> &Path { &self.path }

  /// Current contents of the session.
  pub fn record(&self) -> &SessionRecord { &self.record }

  /// Documents not yet attempted.
  pub fn remaining(&self) -> &[DocumentDescriptor] { &self.record.remaining }

  /// Records a successful document.
  pub fn mark_processed(&mut self, document: &DocumentDescriptor, elapsed: Duration) -> Result<()> {
    let now = Local::now().naive_local();
    self.record.remaining.retain(|d| d.id != document.id);
    self.record.processed.push(ProcessedEntry {
      document_id:  document.id.clone(),
      name:         document.display_name(),
      processed_at: now,
      seconds:      elapsed.as_secs_f64(),
    });
    self.record.updated_at = now;
    self.save()?;
    Self::forget_failed(&self.dir, &document.id)
  }

  /// Records a failed document here and in the failure log.
  pub fn mark_failed(&mut self, document: &DocumentDescriptor, error: &BrieferError) -> Result<()> {
    let now = Local::now().naive_local();
    let failure = FailedDocument {
      document:   document.clone(),
      error_kind: error.kind().to_string(),
      error:      error.to_string(),
      failed_at:  now,
    };
    self.record.remaining.retain(|d| d.id != document.id);
    self.record.failed.push(failure.clone());
    self.record.updated_at = now;
    self.save()?;
    Self::merge_failed(&self.dir, &[failure])
  }

  /// Closes the session: completed when nothing remains, interrupted otherwise.
  pub fn finish(&mut self) -> Result<()> {
    self.record.status = if self.record.remaining.is_empty() {
      SessionStatus::Completed
    } else {
      SessionStatus::Interrupted
    };
    self.record.updated_at = Local::now().naive_local();
    self.save()
  }

  /// Marks the session interrupted so it can be resumed.
  pub fn interrupt(&mut self) -> Result<()> {
    self.record.status = SessionStatus::Interrupted;
    self.record.updated_at = Local::now().naive_local();
    self.save()
  }

  /// Figures for the end-of-run report.
  pub fn summary(&self) -> ProgressSummary {
    let times: Vec<f64> = self.record.processed.iter().map(|p| p.seconds).collect();
    let average_seconds =
      (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);

    ProgressSummary {
      session_id: self.record.session_id.clone(),
      total: self.record.total_documents,
      processed: self.record.processed.len(),
      failed: self.record.failed.len(),
      remaining: self.record.remaining.len(),
      average_seconds,
      min_seconds: times.iter().copied().reduce(f64::min),
      max_seconds: times.iter().copied().reduce(f64::max),
      first_failures: self
        .record
        .failed
        .iter()
        .take(REPORTED_FAILURES)
        .map(|f| (f.document.id.clone(), f.document.display_name(), f.error.clone()))
        .collect(),
    }
  }

  fn save(&self) -> Result<()> {
    trace!("Writing session file {}", self.path.display());
    std::fs::write(&self.path, serde_json::to_string_pretty(&self.record)?)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::SystemTime;

  use super::*;

  fn documents(ids: &[&str]) -> Vec<DocumentDescriptor> {
    ids.iter().map(|id| DocumentDescriptor::new(*id)).collect()
  }

  fn download_error(id: &str) -> BrieferError {
    BrieferError::DownloadFailure { document_id: id.to_string(), reason: "503".to_string() }
  }

  #[test]
  fn test_session_lifecycle() {
    let dir = tempdir().unwrap();
    let mut tracker =
      ProgressTracker::start(dir.path(), documents(&["a", "b", "c"]), BTreeMap::new()).unwrap();
    assert!(tracker.path().exists());
    assert!(tracker.record().session_id.starts_with("session_"));

    tracker.mark_processed(&DocumentDescriptor::new("a"), Duration::from_secs(2)).unwrap();
    tracker.mark_failed(&DocumentDescriptor::new("b"), &download_error("b")).unwrap();
    assert_eq!(tracker.remaining(), &documents(&["c"])[..]);

    tracker.interrupt().unwrap();
    let resumed = ProgressTracker::resume(tracker.path()).unwrap();
    assert_eq!(resumed.remaining().len(), 1);
    assert_eq!(resumed.record().processed[0].document_id, "a");
    assert_eq!(resumed.record().failed[0].error_kind, "DownloadFailure");
    assert_eq!(resumed.record().status, SessionStatus::Running);
  }

  #[test]
  fn test_finish_status() {
    let dir = tempdir().unwrap();
    let mut tracker =
      ProgressTracker::start(dir.path(), documents(&["a"]), BTreeMap::new()).unwrap();
    tracker.finish().unwrap();
    assert_eq!(tracker.record().status, SessionStatus::Interrupted);

    tracker.mark_processed(&DocumentDescriptor::new("a"), Duration::from_millis(10)).unwrap();
    tracker.finish().unwrap();
    let saved: SessionRecord =
      serde_json::from_str(&std::fs::read_to_string(tracker.path()).unwrap()).unwrap();
    assert_eq!(saved.status, SessionStatus::Completed);
  }

  #[test]
  fn test_failure_log_merges_by_id() {
    let dir = tempdir().unwrap();
    let mut first = ProgressTracker::start(dir.path(), documents(&["a", "b"]), BTreeMap::new()).unwrap();
    first.mark_failed(&DocumentDescriptor::new("a"), &download_error("a")).unwrap();
    first.mark_failed(&DocumentDescriptor::new("b"), &download_error("b")).unwrap();

    let mut second = ProgressTracker::start(dir.path(), documents(&["a"]), BTreeMap::new()).unwrap();
    assert_ne!(first.path(), second.path());
    let extraction = BrieferError::ExtractionFailure { document_id: "a".into(), reason: "empty".into() };
    second.mark_failed(&DocumentDescriptor::new("a"), &extraction).unwrap();

    let failed = ProgressTracker::load_failed(dir.path()).unwrap();
    assert_eq!(failed.len(), 2);
    let a = failed.iter().find(|f| f.document.id == "a").unwrap();
    assert_eq!(a.error_kind, "ExtractionFailure");

    // A later success clears the entry
    let mut third = ProgressTracker::start(dir.path(), documents(&["b"]), BTreeMap::new()).unwrap();
    third.mark_processed(&DocumentDescriptor::new("b"), Duration::from_secs(1)).unwrap();
    let failed = ProgressTracker::load_failed(dir.path()).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].document.id, "a");
  }

  #[test]
  fn test_latest_session_by_mtime() {
    let dir = tempdir().unwrap();
    assert!(ProgressTracker::latest_session(dir.path()).unwrap().is_none());

    let older = dir.path().join("session_20240101_000000.json");
    let newer = dir.path().join("session_20230101_000000.json");
    std::fs::write(&older, "{}").unwrap();
    std::fs::write(&newer, "{}").unwrap();
    std::fs::write(dir.path().join(FAILED_LOG), "[]").unwrap();

    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    std::fs::File::options().write(true).open(&older).unwrap().set_modified(base).unwrap();
    std::fs::File::options()
      .write(true)
      .open(&newer)
      .unwrap()
      .set_modified(base + Duration::from_secs(60))
      .unwrap();

    assert_eq!(ProgressTracker::latest_session(dir.path()).unwrap(), Some(newer.clone()));
    assert_eq!(ProgressTracker::locate_session(dir.path(), "latest").unwrap(), newer);
    assert_eq!(
      ProgressTracker::locate_session(dir.path(), "session_20240101_000000.json").unwrap(),
      older
    );
    assert!(ProgressTracker::locate_session(dir.path(), "nope.json").is_err());
  }

  #[test]
  fn test_summary_report() {
    let dir = tempdir().unwrap();
    let ids = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let mut tracker = ProgressTracker::start(dir.path(), documents(&ids), BTreeMap::new()).unwrap();
    tracker.mark_processed(&DocumentDescriptor::new("a"), Duration::from_secs(1)).unwrap();
    tracker.mark_processed(&DocumentDescriptor::new("b"), Duration::from_secs(3)).unwrap();
    for id in &ids[2..8] {
      tracker.mark_failed(&DocumentDescriptor::new(*id), &download_error(id)).unwrap();
    }

    let summary = tracker.summary();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 6);
    assert_eq!(summary.first_failures.len(), 5);
    assert_eq!(summary.average_seconds, Some(2.0));
    assert_eq!(summary.min_seconds, Some(1.0));
    assert_eq!(summary.max_seconds, Some(3.0));
    assert_eq!(summary.success_rate(), 25.0);

    let report = summary.to_string();
    assert!(report.contains("Processed:       2 (25.0%)"));
    assert!(report.contains("... and 1 more"));
  }
}
