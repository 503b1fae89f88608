//! The `presets` command.

use super::*;

/// Arguments for [`Commands::Presets`]
#[derive(Args, Clone, Debug, Default)]
pub struct PresetsArgs {
  /// Filter file to read presets from. Defaults to the configured path.
  #[arg(long)]
  pub filter_file: Option<PathBuf>,
}

/// Function for [`Commands::Presets`] in the CLI.
pub fn presets<I: UserInteraction>(interaction: &I, config: &Config, args: PresetsArgs) -> Result<()> {
  let path = args.filter_file.unwrap_or_else(|| config.filter_file.clone());
  let store = PresetStore::from_file(&path)?;
  debug!("Listing presets from {}", path.display());
  interaction.reply(ResponseContent::Presets(&store))
}
