//! The `bulk` command: filter, then process every matching document.

use std::collections::BTreeMap;

use briefer::{filter::DEFAULT_PRESET, pipeline::DocumentDescriptor};

use super::*;

/// Arguments for [`Commands::Bulk`]
#[derive(Args, Clone, Debug, Default)]
pub struct BulkArgs {
  /// Use a named filter preset (e.g. quarterly_reports)
  #[arg(long)]
  pub preset: Option<String>,

  /// Legacy mode: quarterly reports with a data date in the last N days
  #[arg(long, conflicts_with = "preset")]
  pub days_back: Option<u32>,

  /// Filter file to read presets from. Defaults to the configured path.
  #[arg(long)]
  pub filter_file: Option<PathBuf>,

  /// List available presets and exit
  #[arg(long)]
  pub list_presets: bool,

  /// Override the document type filter
  #[arg(long)]
  pub document_type: Option<String>,

  /// Override the data date start (YYYY-MM-DD or auto:<n><d|m|y|h>)
  #[arg(long)]
  pub data_date_start: Option<String>,

  /// Override the data date end (YYYY-MM-DD or auto:<n><d|m|y|h>)
  #[arg(long)]
  pub data_date_end: Option<String>,

  /// Override any filter parameter, e.g. --set fund_id=F1,F2
  #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_override)]
  pub overrides: Vec<(String, String)>,

  /// Storage routing
  #[command(flatten)]
  pub storage: StorageArgs,

  /// Resume a previous session: a session file, or "latest"
  #[arg(
    long,
    value_name = "FILE|latest",
    num_args = 0..=1,
    default_missing_value = "latest",
    conflicts_with = "retry_failed"
  )]
  pub resume: Option<String>,

  /// Retry only the documents recorded as failed by earlier runs
  #[arg(long)]
  pub retry_failed: bool,
}

/// Splits a `KEY=VALUE` override.
fn parse_override(raw: &str) -> std::result::Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() =>
      Ok((key.trim().to_string(), value.trim().to_string())),
    _ => Err(format!("expected KEY=VALUE, got \"{raw}\"")),
  }
}

impl BulkArgs {
  /// The filter request these arguments describe.
  ///
  /// Without a preset or days-back value, and with overrides that do not form a query on their
  /// own, the default preset is used.
  pub fn filter_request(&self) -> FilterRequest {
    let mut request = FilterRequest {
      preset: self.preset.clone(),
      days_back: self.days_back,
      ..Default::default()
    };

    let named = [
      ("document_type", &self.document_type),
      ("data_date_start", &self.data_date_start),
      ("data_date_end", &self.data_date_end),
    ];
    for (key, value) in named {
      if let Some(value) = value {
        request = request.with_override(key, value.as_str());
      }
    }
    for (key, value) in &self.overrides {
      request = request.with_override(key.as_str(), value.as_str());
    }

    if request.preset.is_none() && request.days_back.is_none() && !request.overrides_form_query() {
      info!("No filter given, using the default '{}' preset", DEFAULT_PRESET);
      request.preset = Some(DEFAULT_PRESET.to_string());
    }
    request
  }
}

/// What a bulk run works through.
enum Workload {
  /// A fresh session over newly listed or previously failed documents
  Fresh { documents: Vec<DocumentDescriptor>, filters: BTreeMap<String, String> },
  /// The remainder of an earlier session
  Resumed(ProgressTracker),
}

/// Function for [`Commands::Bulk`] in the CLI.
pub async fn bulk<I: UserInteraction>(interaction: &I, config: &Config, args: BulkArgs) -> Result<()> {
  let filter_file = args.filter_file.clone().unwrap_or_else(|| config.filter_file.clone());

  if args.list_presets {
    let store = PresetStore::from_file(&filter_file)?;
    return interaction.reply(ResponseContent::Presets(&store));
  }

  // A session to resume, if one was asked for and exists
  let resumed = match args.resume.as_deref() {
    Some("latest") => match ProgressTracker::latest_session(&config.progress_dir)? {
      Some(path) => Some(ProgressTracker::resume(path)?),
      None => {
        interaction.reply(ResponseContent::Warning("No previous session found, starting a new run"))?;
        None
      },
    },
    Some(selector) =>
      Some(ProgressTracker::resume(ProgressTracker::locate_session(&config.progress_dir, selector)?)?),
    None => None,
  };

  let failed = if resumed.is_none() && args.retry_failed {
    let documents: Vec<DocumentDescriptor> = ProgressTracker::load_failed(&config.progress_dir)?
      .into_iter()
      .map(|failure| failure.document)
      .collect();
    if documents.is_empty() {
      return interaction.reply(ResponseContent::Info("No failed documents to retry"));
    }
    Some(documents)
  } else {
    None
  };

  // Filters are settled before any credential is touched so bad presets fail fast
  let request = (resumed.is_none() && failed.is_none()).then(|| args.filter_request());
  let filters = match &request {
    Some(request) => Some(PresetStore::from_file(&filter_file)?.resolve(request)?),
    None => None,
  };

  let mut resolver = CredentialResolver::standard(config);
  let canoe = CanoeClient::new(resolver.resolve(CredentialItem::Canoe).await?, config)?;
  let mut pipeline = Pipeline::new(canoe);

  let workload = if let Some(tracker) = resumed {
    interaction.reply(ResponseContent::Info(&format!(
      "Resuming {} with {} remaining documents",
      tracker.record().session_id,
      tracker.remaining().len()
    )))?;
    Workload::Resumed(tracker)
  } else if let Some(documents) = failed {
    interaction.reply(ResponseContent::Info(&format!("Retrying {} failed documents", documents.len())))?;
    let filters = BTreeMap::from([("retry_failed".to_string(), "true".to_string())]);
    Workload::Fresh { documents, filters }
  } else if let Some(filters) = filters {
    let documents = pipeline.list_documents(&filters).await?;
    interaction.reply(ResponseContent::Info(&format!("Found {} documents to process", documents.len())))?;
    let filters = filters.iter().map(|(param, value)| (param.as_str().to_string(), value.to_string()));
    Workload::Fresh { documents, filters: filters.collect() }
  } else {
    return Err(BrieferdError::Usage("no documents selected".to_string()));
  };

  if matches!(&workload, Workload::Fresh { documents, .. } if documents.is_empty()) {
    return interaction.reply(ResponseContent::Info("No documents to process"));
  }

  // Every credential is in hand before a session file is written
  let claude = ClaudeClient::new(resolver.resolve(CredentialItem::Claude).await?, config)?;
  pipeline = pipeline.with_summarizer(claude);
  let (mut pipeline, sheets) =
    attach_stores(interaction, pipeline, &mut resolver, config, &args.storage).await?;

  let mut tracker = match workload {
    Workload::Resumed(tracker) => tracker,
    Workload::Fresh { documents, filters } =>
      ProgressTracker::start(&config.progress_dir, documents, filters)?,
  };

  let outcome = pipeline.run(&mut tracker).await;
  interaction.reply(ResponseContent::Summary(&tracker.summary()))?;
  outcome?;

  if let Some(credentials) = &sheets {
    report_sheet(interaction, credentials, config).await?;
  }
  interaction.reply(ResponseContent::Success(&format!(
    "Processing complete, progress saved to {}",
    tracker.path().display()
  )))
}

#[cfg(test)]
mod tests {
  use briefer::filter::FilterParameter;

  use super::*;

  #[test]
  fn test_parse_override() {
    assert_eq!(parse_override("fund_id=F1,F2").unwrap(), ("fund_id".into(), "F1,F2".into()));
    assert_eq!(parse_override(" source = Email ").unwrap(), ("source".into(), "Email".into()));
    assert!(parse_override("fund_id").is_err());
    assert!(parse_override("=F1").is_err());
  }

  #[test]
  fn test_default_preset_when_unfiltered() {
    let request = BulkArgs::default().filter_request();
    assert_eq!(request.preset.as_deref(), Some(DEFAULT_PRESET));

    let args = BulkArgs { days_back: Some(7), ..Default::default() };
    assert_eq!(args.filter_request().preset, None);
  }

  #[test]
  fn test_overrides_alone_form_query() {
    let args = BulkArgs {
      document_type: Some("Annual Report".into()),
      overrides: vec![("fund_id".into(), "F9".into())],
      ..Default::default()
    };
    let request = args.filter_request();
    assert_eq!(request.preset, None);
    assert_eq!(request.overrides[FilterParameter::DocumentType.as_str()], "Annual Report");
    assert_eq!(request.overrides["fund_id"], "F9");
  }

  #[test]
  fn test_storage_routing() {
    let storage = StorageArgs::default();
    assert!(storage.notion() && !storage.sheets());

    let storage = StorageArgs { sheets_only: true, ..Default::default() };
    assert!(!storage.notion() && storage.sheets());

    let storage = StorageArgs { google_sheets: true, ..Default::default() };
    assert!(storage.notion() && storage.sheets());
  }
}
