//! The `single` command: one document by id.

use super::*;

/// Arguments for [`Commands::Single`]
#[derive(Args, Clone, Debug)]
pub struct SingleArgs {
  /// Canoe id of the document to process
  #[arg(long)]
  pub document_id: String,

  /// Skip the Claude summary (download and extract only)
  #[arg(long)]
  pub no_summary: bool,

  /// Save the downloaded PDF to this path
  #[arg(long, value_name = "PATH")]
  pub save_pdf: Option<PathBuf>,

  /// Storage routing
  #[command(flatten)]
  pub storage: StorageArgs,
}

/// Function for [`Commands::Single`] in the CLI.
///
/// Without a summary nothing is stored, since there is nothing to file.
pub async fn single<I: UserInteraction>(interaction: &I, config: &Config, args: SingleArgs) -> Result<()> {
  let SingleArgs { document_id, no_summary, save_pdf, storage } = args;

  let mut resolver = CredentialResolver::standard(config);
  let canoe = CanoeClient::new(resolver.resolve(CredentialItem::Canoe).await?, config)?;
  let mut pipeline = Pipeline::new(canoe);

  let mut sheets = None;
  if !no_summary {
    let claude = ClaudeClient::new(resolver.resolve(CredentialItem::Claude).await?, config)?;
    let (with_stores, sheet_credentials) =
      attach_stores(interaction, pipeline.with_summarizer(claude), &mut resolver, config, &storage)
        .await?;
    pipeline = with_stores;
    sheets = sheet_credentials;
  }

  interaction.reply(ResponseContent::Info(&format!("Processing document {document_id}")))?;
  let document = pipeline.describe(&document_id).await?;
  let processed = pipeline.process_document(&document).await?;
  info!("Processed {} in {:.1}s", document_id, processed.elapsed.as_secs_f64());

  if let Some(path) = &save_pdf {
    std::fs::write(path, &processed.pdf)?;
    interaction.reply(ResponseContent::Success(&format!("PDF saved to {}", path.display())))?;
  }

  match &processed.summary {
    Some(summary) => interaction.reply(ResponseContent::Document {
      id: &document.id,
      name: &document.display_name(),
      summary,
    })?,
    None => interaction.reply(ResponseContent::Info(&format!(
      "Extracted {} characters of text, no summary requested",
      processed.text.chars().count()
    )))?,
  }

  for (store, url) in &processed.urls {
    interaction.reply(ResponseContent::Success(&format!("Saved to {store}: {url}")))?;
  }
  if let Some(credentials) = &sheets {
    report_sheet(interaction, credentials, config).await?;
  }
  Ok(())
}
