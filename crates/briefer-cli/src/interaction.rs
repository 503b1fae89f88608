//! Terminal output for CLI commands.

use briefer::{
  filter::PresetStore,
  progress::ProgressSummary,
  store::SheetStatistics,
};
use console::{style, Term};

use super::*;

pub static INFO_PREFIX: &str = "ℹ ";
pub static SUCCESS_PREFIX: &str = "✓ ";
pub static WARNING_PREFIX: &str = "! ";
pub static ERROR_PREFIX: &str = "✗ ";
pub static ITEM_PREFIX: &str = "├─";
pub static LAST_ITEM_PREFIX: &str = "└─";

/// Preset keys shown in the preset listing.
const PRESET_HIGHLIGHTS: [&str; 4] =
  ["document_type", "data_date_start", "data_date_end", "file_upload_time_start"];

/// Something a command wants to show the user.
#[derive(Debug)]
pub enum ResponseContent<'a> {
  Info(&'a str),
  Success(&'a str),
  Warning(&'a str),
  Error(&'a BrieferdError),
  /// Every preset of a filter file with its key parameters
  Presets(&'a PresetStore),
  /// End-of-run report of a bulk session
  Summary(&'a ProgressSummary),
  /// One document's summary
  Document { id: &'a str, name: &'a str, summary: &'a str },
  /// Row counts of the summary spreadsheet
  Sheet { statistics: SheetStatistics, url: &'a str },
}

/// Output channel for command results.
pub trait UserInteraction {
  fn reply(&self, content: ResponseContent) -> Result<()>;
}

/// Styled output on the process terminal; errors go to stderr.
pub struct Terminal {
  out: Term,
  err: Term,
}

impl Terminal {
  pub fn new() -> Self { Self { out: Term::stdout(), err: Term::stderr() } }

  fn line(&self, line: &str) -> Result<()> { self.out.write_line(line).map_err(BrieferdError::Console) }
}

impl Default for Terminal {
  fn default() -> Self { Self::new() }
}

impl UserInteraction for Terminal {
  fn reply(&self, content: ResponseContent) -> Result<()> {
    match content {
      ResponseContent::Info(message) => self.line(&format!("{} {}", style(INFO_PREFIX).blue(), message)),
      ResponseContent::Success(message) =>
        self.line(&format!("{} {}", style(SUCCESS_PREFIX).green(), message)),
      ResponseContent::Warning(message) =>
        self.line(&format!("{} {}", style(WARNING_PREFIX).yellow(), style(message).yellow())),
      ResponseContent::Error(error) => self
        .err
        .write_line(&format!(
          "{} {} {}",
          style(ERROR_PREFIX).red(),
          style(format!("[{}]", error.kind())).red().bold(),
          error
        ))
        .map_err(BrieferdError::Console),
      ResponseContent::Presets(store) => {
        let listed = store.list_presets();
        if listed.is_empty() {
          return self.line(&format!("{} No presets found in the filter file", style(WARNING_PREFIX).yellow()));
        }
        self.line(&style("Available filter presets:").bold().to_string())?;
        for (name, description) in &listed {
          self.line("")?;
          self.line(&format!("{}", style(name).cyan().bold()))?;
          let highlights: Vec<String> = store
            .get(name)
            .map(|preset| {
              PRESET_HIGHLIGHTS
                .iter()
                .filter_map(|key| preset.body.get(*key).map(|value| format!("{key}={value}")))
                .collect()
            })
            .unwrap_or_default();
          let prefix = if highlights.is_empty() { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
          self.line(&format!("  {} {}", style(prefix).dim(), description))?;
          if !highlights.is_empty() {
            self.line(&format!("  {} {}", style(LAST_ITEM_PREFIX).dim(), highlights.join(", ")))?;
          }
        }
        self.line("")?;
        self.line(&format!("Usage: briefer bulk --preset {}", style("<name>").italic()))
      },
      ResponseContent::Summary(summary) => {
        self.line("")?;
        self.line(&style("Processing summary").bold().to_string())?;
        for line in summary.to_string().lines() {
          self.line(line)?;
        }
        Ok(())
      },
      ResponseContent::Document { id, name, summary } => {
        self.line("")?;
        self.line(&format!("{} {}", style("Document:").bold(), name))?;
        self.line(&format!("{} {}", style("ID:").bold(), id))?;
        self.line("")?;
        self.line(&style("Summary:").bold().to_string())?;
        self.line(summary)
      },
      ResponseContent::Sheet { statistics, url } => {
        self.line("")?;
        self.line(&style("Google Sheets").bold().to_string())?;
        self.line(&format!("  {} Rows: {}", style(ITEM_PREFIX).dim(), statistics.total_rows))?;
        self.line(&format!(
          "  {} With summaries: {}",
          style(ITEM_PREFIX).dim(),
          statistics.with_summaries
        ))?;
        self.line(&format!("  {} {}", style(LAST_ITEM_PREFIX).dim(), url))
      },
    }
  }
}
