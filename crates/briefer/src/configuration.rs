use super::*;

/// Runtime settings for a pipeline run.
///
/// Stored as TOML at [`Config::default_path`]. Every field has a default, so a missing file or a
/// partial file is fine. `BW_FOLDER` and `MAX_RETRIES` in the environment take precedence over the
/// file.
///
/// ```
/// use briefer::Config;
///
/// let config: Config = toml::from_str("vault_folder = \"Reports\"").unwrap();
/// assert_eq!(config.vault_folder, "Reports");
/// assert_eq!(config.summary_max_tokens, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Canoe API root used when the credential item carries no base URL
  pub canoe_base_url:         String,
  /// JSON file holding filter presets
  pub filter_file:            PathBuf,
  /// Prompt template with `{document_name}` and `{document_content}` placeholders
  pub prompt_file:            PathBuf,
  /// Vault folder credential items live in
  pub vault_folder:           String,
  /// Where bulk session files and the failure log are written
  pub progress_dir:           PathBuf,
  /// Where the CLI writes its log files
  pub log_dir:                PathBuf,
  /// Claude model id
  pub summary_model:          String,
  /// Maximum tokens requested per summary
  pub summary_max_tokens:     u32,
  /// Characters of extracted text sent for summarization
  pub summary_max_chars:      usize,
  /// Worksheet that receives summary rows
  pub sheet_name:             String,
  /// Minimum delay between spreadsheet calls, in milliseconds
  pub sheets_rate_limit_ms:   u64,
  /// Attempts for retryable calls
  pub retry_attempts:         u32,
  /// Delay before the first retry, in milliseconds; doubles each attempt
  pub retry_initial_delay_ms: u64,
  /// Timeout for one document download, in seconds
  pub download_timeout_secs:  u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      canoe_base_url:         "https://api.canoesoftware.com".to_string(),
      filter_file:            PathBuf::from("config/document_filters.json"),
      prompt_file:            PathBuf::from("prompts/claude_summary_prompt.txt"),
      vault_folder:           "Axiom".to_string(),
      progress_dir:           PathBuf::from("data/progress"),
      log_dir:                PathBuf::from("logs"),
      summary_model:          "claude-3-5-sonnet-20241022".to_string(),
      summary_max_tokens:     2000,
      summary_max_chars:      10_000,
      sheet_name:             "Quarterly Reports".to_string(),
      sheets_rate_limit_ms:   100,
      retry_attempts:         3,
      retry_initial_delay_ms: 1000,
      download_timeout_secs:  180,
    }
  }
}

impl Config {
  /// Default location of the configuration file.
  ///
  /// - On Unix: `~/.config/briefer/config.toml`
  /// - On macOS: `~/Library/Application Support/briefer/config.toml`
  /// - On Windows: `%APPDATA%\briefer\config.toml`
  pub fn default_path() -> Result<PathBuf> {
    dirs::config_dir()
      .map(|dir| dir.join("briefer").join("config.toml"))
      .ok_or_else(|| BrieferError::Config("Could not determine the config directory".to_string()))
  }

  /// Loads the file at `path` (defaults when it does not exist) and applies environment overrides.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let config = if path.exists() {
      debug!("Loading configuration from {}", path.display());
      toml::from_str(&std::fs::read_to_string(path)?)?
    } else {
      debug!("No configuration at {}, using defaults", path.display());
      Self::default()
    };
    Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
  }

  /// Writes this configuration as TOML, creating parent directories.
  pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Applies `BW_FOLDER` and `MAX_RETRIES` as read through `lookup`.
  pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(folder) = lookup("BW_FOLDER").filter(|f| !f.trim().is_empty()) {
      self.vault_folder = folder;
    }
    if let Some(raw) = lookup("MAX_RETRIES") {
      match raw.trim().parse::<u32>() {
        Ok(attempts) if attempts > 0 => self.retry_attempts = attempts,
        _ => warn!("Ignoring MAX_RETRIES={raw:?}; expected a positive integer"),
      }
    }
    self
  }

  /// Minimum delay between spreadsheet calls.
  pub fn sheets_rate_limit(&self) -> Duration { Duration::from_millis(self.sheets_rate_limit_ms) }

  /// Delay before the first retry.
  pub fn retry_initial_delay(&self) -> Duration { Duration::from_millis(self.retry_initial_delay_ms) }

  /// Timeout for one document download.
  pub fn download_timeout(&self) -> Duration { Duration::from_secs(self.download_timeout_secs) }
}
