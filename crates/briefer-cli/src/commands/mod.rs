use briefer::credential::Credentials;

use super::*;

pub mod bulk;
pub mod presets;
pub mod single;

pub use bulk::{bulk, BulkArgs};
pub use presets::{presets, PresetsArgs};
pub use single::{single, SingleArgs};

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Summarize every document matched by a filter preset
  Bulk(BulkArgs),

  /// Summarize one document by its Canoe id
  Single(SingleArgs),

  /// List the presets in the filter file
  Presets(PresetsArgs),
}

/// Where finished summaries are written.
#[derive(Args, Clone, Debug, Default)]
pub struct StorageArgs {
  /// Skip saving summaries to Notion
  #[arg(long)]
  pub no_notion: bool,

  /// Also save summaries to Google Sheets
  #[arg(long)]
  pub google_sheets: bool,

  /// Save to Google Sheets only (implies --no-notion)
  #[arg(long)]
  pub sheets_only: bool,
}

impl StorageArgs {
  /// Whether summaries go to Notion.
  pub fn notion(&self) -> bool { !self.no_notion && !self.sheets_only }

  /// Whether summaries go to Google Sheets.
  pub fn sheets(&self) -> bool { self.google_sheets || self.sheets_only }
}

/// Adds the selected stores to `pipeline`.
///
/// Missing Notion credentials end the command. Google Sheets is optional: when its client cannot
/// be set up the run continues without it. The Sheets credentials are handed back so the caller
/// can report statistics afterwards.
async fn attach_stores<I: UserInteraction>(
  interaction: &I,
  mut pipeline: Pipeline,
  resolver: &mut CredentialResolver,
  config: &Config,
  storage: &StorageArgs,
) -> Result<(Pipeline, Option<Credentials>)> {
  if storage.notion() {
    let credentials = resolver.resolve(CredentialItem::Notion).await?;
    pipeline = pipeline.with_store(NotionStore::new(credentials, config)?);
  }

  let mut sheets = None;
  if storage.sheets() {
    let store = match resolver.resolve(CredentialItem::GoogleSheets).await {
      Ok(credentials) => SheetsStore::new(credentials, config).map(|store| (store, credentials.clone())),
      Err(e) => Err(e),
    };
    match store {
      Ok((store, credentials)) => {
        pipeline = pipeline.with_store(store);
        sheets = Some(credentials);
      },
      Err(e) if !matches!(e, BrieferError::UnlockTimeout(_) | BrieferError::SessionInvalid(_)) => {
        warn!("Google Sheets disabled: {}", e);
        interaction.reply(ResponseContent::Warning(&format!(
          "Google Sheets unavailable, continuing without it ({})",
          e.kind()
        )))?;
      },
      Err(e) => return Err(e.into()),
    }
  }

  if pipeline.store_names().is_empty() {
    interaction.reply(ResponseContent::Info("No storage selected, summaries are only logged"))?;
  } else {
    info!("Writing summaries to {}", pipeline.store_names().join(", "));
  }
  Ok((pipeline, sheets))
}

/// Prints row counts of the summary spreadsheet. Failures only warn.
async fn report_sheet<I: UserInteraction>(
  interaction: &I,
  credentials: &Credentials,
  config: &Config,
) -> Result<()> {
  let mut sheets = SheetsStore::new(credentials, config)?;
  match sheets.statistics().await {
    Ok(statistics) =>
      interaction.reply(ResponseContent::Sheet { statistics, url: &sheets.spreadsheet_url() }),
    Err(e) => {
      warn!("Could not read spreadsheet statistics: {}", e);
      Ok(())
    },
  }
}
