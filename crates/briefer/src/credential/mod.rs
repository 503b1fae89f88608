//! Credential items and the provider chain that resolves them.
//!
//! Every external API needs a small bundle of secrets (a [`CredentialItem`]). Resolution walks an
//! ordered list of [`CredentialProvider`]s and takes the first one that can supply every required
//! field. The standard chain is the Bitwarden vault followed by environment variables.
//!
//! Resolved items are cached in the [`CredentialResolver`] for the rest of the run; they are never
//! written to disk and sensitive values never reach the logs.
//!
//! ```no_run
//! use briefer::{
//!   credential::{CredentialField, CredentialItem, CredentialResolver, EnvironmentProvider},
//!   prelude::*,
//! };
//!
//! # async fn example() -> Result<(), BrieferError> {
//! let mut resolver = CredentialResolver::new().with_provider(EnvironmentProvider::new());
//! let notion = resolver.resolve(CredentialItem::Notion).await?;
//! let database_id = notion.get(CredentialField::DatabaseId)?;
//! # Ok(())
//! # }
//! ```

use super::*;

mod bitwarden;
mod environment;

pub use bitwarden::{BitwardenProvider, SessionHandle, VaultCli, VaultCommand, VaultOutput};
pub use environment::EnvironmentProvider;

/// Longest preview of a non-sensitive value that may appear in a log line.
pub const LOG_PREVIEW_LENGTH: usize = 20;

/// A named bundle of secrets for one external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialItem {
  /// Canoe document API (OAuth client credentials)
  Canoe,
  /// Anthropic Claude API
  Claude,
  /// Notion integration
  Notion,
  /// Google Sheets service account
  GoogleSheets,
}

impl CredentialItem {
  /// Name of the item in the vault.
  pub fn vault_name(&self) -> &'static str {
    match self {
      Self::Canoe => "Canoe",
      Self::Claude => "Claude",
      Self::Notion => "Notion",
      Self::GoogleSheets => "GoogleSheets",
    }
  }

  /// Logical fields this item carries.
  pub fn fields(&self) -> &'static [CredentialField] {
    use CredentialField::*;
    match self {
      Self::Canoe => &[ClientId, ClientSecret, BaseUrl],
      Self::Claude => &[ApiKey],
      Self::Notion => &[Token, DatabaseId],
      Self::GoogleSheets => &[CredentialsJson, SpreadsheetId],
    }
  }
}

impl Display for CredentialItem {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.vault_name())
  }
}

impl FromStr for CredentialItem {
  type Err = BrieferError;

  /// Accepts vault names as well as the older `*-api` / `*-integration` aliases.
  fn from_str(s: &str) -> Result<Self> {
    match s {
      "Canoe" | "canoe-api" => Ok(Self::Canoe),
      "Claude" | "anthropic-api" => Ok(Self::Claude),
      "Notion" | "notion-integration" => Ok(Self::Notion),
      "GoogleSheets" | "google-sheets" => Ok(Self::GoogleSheets),
      other => Err(BrieferError::Config(format!("Unknown credential item \"{other}\""))),
    }
  }
}

/// Logical name of one secret field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CredentialField {
  /// OAuth client id
  ClientId,
  /// OAuth client secret
  ClientSecret,
  /// API base URL
  BaseUrl,
  /// API key
  ApiKey,
  /// Integration token
  Token,
  /// Notion database id
  DatabaseId,
  /// Service-account JSON blob
  CredentialsJson,
  /// Spreadsheet id
  SpreadsheetId,
}

impl CredentialField {
  /// Logical field name as used in vault custom fields.
  pub fn name(&self) -> &'static str {
    match self {
      Self::ClientId => "client_id",
      Self::ClientSecret => "client_secret",
      Self::BaseUrl => "base_url",
      Self::ApiKey => "api_key",
      Self::Token => "token",
      Self::DatabaseId => "database_id",
      Self::CredentialsJson => "credentials_json",
      Self::SpreadsheetId => "spreadsheet_id",
    }
  }

  /// Environment variable consulted by the fallback provider.
  pub fn env_var(&self, item: CredentialItem) -> &'static str {
    match (item, self) {
      (CredentialItem::Canoe, Self::ClientId) => "CANOE_CLIENT_ID",
      (CredentialItem::Canoe, Self::ClientSecret) => "CANOE_CLIENT_SECRET",
      (CredentialItem::Canoe, _) => "CANOE_BASE_URL",
      (CredentialItem::Claude, _) => "ANTHROPIC_API_KEY",
      (CredentialItem::Notion, Self::Token) => "NOTION_TOKEN",
      (CredentialItem::Notion, _) => "NOTION_DATABASE_ID",
      (CredentialItem::GoogleSheets, Self::CredentialsJson) => "GOOGLE_SHEETS_CREDENTIALS_JSON",
      (CredentialItem::GoogleSheets, _) => "GOOGLE_SHEETS_SPREADSHEET_ID",
    }
  }

  /// Whether values of this field must never be logged.
  pub fn is_sensitive(&self) -> bool {
    matches!(self, Self::ClientSecret | Self::ApiKey | Self::Token | Self::CredentialsJson)
  }

  /// Value used when no backend supplies this field.
  pub fn default_value(&self) -> Option<&'static str> {
    match self {
      Self::BaseUrl => Some("https://api.canoesoftware.com"),
      _ => None,
    }
  }
}

impl Display for CredentialField {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

/// What may be written to a log line about `value`.
///
/// Sensitive fields are fully redacted; everything else is cut to [`LOG_PREVIEW_LENGTH`].
pub fn loggable(field: CredentialField, value: &str) -> String {
  if field.is_sensitive() {
    "<redacted>".to_string()
  } else if value.chars().count() > LOG_PREVIEW_LENGTH {
    format!("{}...", value.chars().take(LOG_PREVIEW_LENGTH).collect::<String>())
  } else {
    value.to_string()
  }
}

/// Resolved values for one credential item.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  /// The item these values belong to
  item:   CredentialItem,
  /// Field values
  values: BTreeMap<CredentialField, String>,
}

impl std::fmt::Debug for Credentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut map = f.debug_map();
    for (field, value) in &self.values {
      map.entry(field, &loggable(*field, value));
    }
    map.finish()
  }
}

impl Credentials {
  /// Builds credentials from gathered values, applying defaults and checking completeness.
  ///
  /// # Errors
  ///
  /// [`BrieferError::CredentialNotFound`] naming every field that is still missing.
  pub fn from_values(
    item: CredentialItem,
    mut values: BTreeMap<CredentialField, String>,
  ) -> Result<Self> {
    values.retain(|_, v| !v.trim().is_empty());
    let mut missing = Vec::new();
    for field in item.fields() {
      if values.contains_key(field) {
        continue;
      }
      match field.default_value() {
        Some(default) => {
          values.insert(*field, default.to_string());
        },
        None => missing.push(field.name().to_string()),
      }
    }

    if !missing.is_empty() {
      return Err(BrieferError::CredentialNotFound { item: item.to_string(), missing });
    }
    Ok(Self { item, values })
  }

  /// The item these credentials belong to.
  pub fn item(&self) -> CredentialItem { self.item }

  /// Value of one field.
  pub fn get(&self, field: CredentialField) -> Result<&str> {
    self.values.get(&field).map(String::as_str).ok_or_else(|| BrieferError::CredentialNotFound {
      item:    self.item.to_string(),
      missing: vec![field.name().to_string()],
    })
  }
}

/// One backend that may be able to supply credential items.
#[async_trait]
pub trait CredentialProvider: Send {
  /// Short name used in log lines.
  fn name(&self) -> &'static str;

  /// Fetches every field of `item`.
  ///
  /// Return [`BrieferError::SecretBackendUnavailable`] or [`BrieferError::CredentialNotFound`] to
  /// let the next provider try; any other error stops resolution.
  async fn fetch(&mut self, item: CredentialItem) -> Result<Credentials>;
}

/// Ordered provider chain with a per-run cache.
#[derive(Default)]
pub struct CredentialResolver {
  /// Providers in the order they are tried
  providers: Vec<Box<dyn CredentialProvider>>,
  /// Items resolved so far this run
  cache:     BTreeMap<CredentialItem, Credentials>,
}

impl CredentialResolver {
  /// An empty chain. Add providers with [`Self::with_provider`].
  pub fn new() -> Self { Self::default() }

  /// The Bitwarden vault (scoped to the configured folder) followed by environment variables.
  pub fn standard(config: &Config) -> Self {
    Self::new()
      .with_provider(BitwardenProvider::from_env(VaultCli::default(), &config.vault_folder))
      .with_provider(EnvironmentProvider::new())
  }

  /// Appends a provider to the end of the chain.
  pub fn with_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
    self.providers.push(Box::new(provider));
    self
  }

  /// Resolves `item`, consulting the cache first.
  ///
  /// # Errors
  ///
  /// - [`BrieferError::CredentialNotFound`] when no provider could supply the item
  /// - Any non-fallback error from a provider (unlock timeout, invalid session, ...)
  pub async fn resolve(&mut self, item: CredentialItem) -> Result<&Credentials> {
    if !self.cache.contains_key(&item) {
      let credentials = self.resolve_uncached(item).await?;
      self.cache.insert(item, credentials);
    }
    Ok(&self.cache[&item])
  }

  /// Walks the provider chain for `item`.
  async fn resolve_uncached(&mut self, item: CredentialItem) -> Result<Credentials> {
    let mut last_error = None;

    for provider in self.providers.iter_mut() {
      match provider.fetch(item).await {
        Ok(credentials) => {
          for (field, value) in &credentials.values {
            debug!("Retrieved {}.{}={} from {}", item, field, loggable(*field, value), provider.name());
          }
          info!("Resolved credential item {} from {}", item, provider.name());
          return Ok(credentials);
        },
        Err(e) if e.allows_fallback() => {
          warn!("{} could not supply {}: {}", provider.name(), item, e);
          last_error = Some(e);
        },
        Err(e) => {
          error!("Credential lookup for {} failed in {}: {}", item, provider.name(), e);
          return Err(e);
        },
      }
    }

    Err(match last_error {
      Some(e @ BrieferError::CredentialNotFound { .. }) => e,
      _ => BrieferError::CredentialNotFound {
        item:    item.to_string(),
        missing: item.fields().iter().map(|f| f.name().to_string()).collect(),
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// Provider that always answers with a fixed result.
  struct Fixed {
    name:   &'static str,
    result: fn(CredentialItem) -> Result<Credentials>,
    calls:  std::sync::Arc<std::sync::atomic::AtomicUsize>,
  }

  #[async_trait]
  impl CredentialProvider for Fixed {
    fn name(&self) -> &'static str { self.name }

    async fn fetch(&mut self, item: CredentialItem) -> Result<Credentials> {
      self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      (self.result)(item)
    }
  }

  fn fixed(
    name: &'static str,
    result: fn(CredentialItem) -> Result<Credentials>,
  ) -> (Fixed, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    (Fixed { name, result, calls: calls.clone() }, calls)
  }

  fn notion_values(token: &str) -> Result<Credentials> {
    let mut values = BTreeMap::new();
    values.insert(CredentialField::Token, token.to_string());
    values.insert(CredentialField::DatabaseId, "db-123".to_string());
    Credentials::from_values(CredentialItem::Notion, values)
  }

  #[test]
  fn test_item_aliases() {
    assert_eq!("canoe-api".parse::<CredentialItem>().unwrap(), CredentialItem::Canoe);
    assert_eq!("anthropic-api".parse::<CredentialItem>().unwrap(), CredentialItem::Claude);
    assert_eq!("notion-integration".parse::<CredentialItem>().unwrap(), CredentialItem::Notion);
    assert_eq!("GoogleSheets".parse::<CredentialItem>().unwrap(), CredentialItem::GoogleSheets);
    assert!("1password".parse::<CredentialItem>().is_err());
  }

  #[test]
  fn test_loggable() {
    assert_eq!(loggable(CredentialField::Token, "secret_abc"), "<redacted>");
    assert_eq!(loggable(CredentialField::DatabaseId, "short"), "short");
    assert_eq!(
      loggable(CredentialField::DatabaseId, "0123456789abcdef0123456789"),
      "0123456789abcdef0123..."
    );
  }

  #[test]
  fn test_from_values_defaults_and_missing() {
    let mut values = BTreeMap::new();
    values.insert(CredentialField::ClientId, "id".to_string());
    values.insert(CredentialField::ClientSecret, "secret".to_string());
    let canoe = Credentials::from_values(CredentialItem::Canoe, values).unwrap();
    assert_eq!(canoe.get(CredentialField::BaseUrl).unwrap(), "https://api.canoesoftware.com");

    let mut values = BTreeMap::new();
    values.insert(CredentialField::Token, "  ".to_string());
    match Credentials::from_values(CredentialItem::Notion, values) {
      Err(BrieferError::CredentialNotFound { item, missing }) => {
        assert_eq!(item, "Notion");
        assert_eq!(missing, ["token", "database_id"]);
      },
      other => panic!("expected CredentialNotFound, got {other:?}"),
    }
  }

  #[test]
  fn test_debug_redacts() {
    let creds = notion_values("secret_very_private").unwrap();
    let rendered = format!("{creds:?}");
    assert!(!rendered.contains("secret_very_private"));
    assert!(rendered.contains("db-123"));
  }

  #[tokio::test]
  async fn test_falls_through_in_order() {
    let (vault, vault_calls) = fixed("vault", |_| {
      Err(BrieferError::SecretBackendUnavailable("locked".into()))
    });
    let (env, env_calls) = fixed("env", |_| notion_values("from-env"));
    let mut resolver = CredentialResolver::new().with_provider(vault).with_provider(env);

    let creds = resolver.resolve(CredentialItem::Notion).await.unwrap();
    assert_eq!(creds.get(CredentialField::Token).unwrap(), "from-env");
    assert_eq!(vault_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(env_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Second lookup is served from the cache
    resolver.resolve(CredentialItem::Notion).await.unwrap();
    assert_eq!(vault_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(env_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fatal_errors_stop_the_chain() {
    let (vault, _) = fixed("vault", |_| Err(BrieferError::UnlockTimeout(30)));
    let (env, env_calls) = fixed("env", |_| notion_values("from-env"));
    let mut resolver = CredentialResolver::new().with_provider(vault).with_provider(env);

    assert!(matches!(
      resolver.resolve(CredentialItem::Notion).await,
      Err(BrieferError::UnlockTimeout(30))
    ));
    assert_eq!(env_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_exhausted_chain_reports_missing_fields() {
    let (vault, _) = fixed("vault", |_| {
      Err(BrieferError::SecretBackendUnavailable("not installed".into()))
    });
    let mut resolver = CredentialResolver::new().with_provider(vault);
    match resolver.resolve(CredentialItem::Claude).await {
      Err(BrieferError::CredentialNotFound { item, missing }) => {
        assert_eq!(item, "Claude");
        assert_eq!(missing, ["api_key"]);
      },
      other => panic!("expected CredentialNotFound, got {other:?}"),
    }
  }

  #[traced_test]
  #[tokio::test]
  async fn test_sensitive_values_never_logged() {
    let (env, _) = fixed("env", |_| notion_values("secret_DO_NOT_PRINT_4242"));
    let mut resolver = CredentialResolver::new().with_provider(env);
    resolver.resolve(CredentialItem::Notion).await.unwrap();

    assert!(logs_contain("Retrieved Notion.token=<redacted> from env"));
    assert!(logs_contain("Retrieved Notion.database_id=db-123 from env"));
    assert!(!logs_contain("secret_DO_NOT_PRINT_4242"));
  }
}
