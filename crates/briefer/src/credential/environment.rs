//! Environment-variable fallback provider.

use super::*;

/// Reads one variable; `None` when unset.
type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Supplies credential items from a fixed mapping of environment variables.
///
/// See [`CredentialField::env_var`] for the variable behind each field. An item resolves only when
/// every field without a default is set.
pub struct EnvironmentProvider {
  lookup: Lookup,
}

impl Default for EnvironmentProvider {
  fn default() -> Self { Self::new() }
}

impl EnvironmentProvider {
  /// Reads the process environment.
  pub fn new() -> Self { Self::with_lookup(|name| std::env::var(name).ok()) }

  /// Reads variables through `lookup` instead of the process environment.
  pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
    Self { lookup: Box::new(lookup) }
  }
}

#[async_trait]
impl CredentialProvider for EnvironmentProvider {
  fn name(&self) -> &'static str { "environment" }

  async fn fetch(&mut self, item: CredentialItem) -> Result<Credentials> {
    let mut values = BTreeMap::new();
    let mut unset = Vec::new();

    for field in item.fields() {
      let var = field.env_var(item);
      match (self.lookup)(var).filter(|v| !v.trim().is_empty()) {
        Some(value) => {
          values.insert(*field, value);
        },
        None if field.default_value().is_some() => {},
        None => unset.push(var.to_string()),
      }
    }

    if !unset.is_empty() {
      return Err(BrieferError::CredentialNotFound { item: item.to_string(), missing: unset });
    }
    Credentials::from_values(item, values)
  }
}

#[cfg(test)]
mod tests {
  use serial_test::serial;

  use super::*;

  #[tokio::test]
  async fn test_reports_missing_variables() {
    let mut provider = EnvironmentProvider::with_lookup(|name| {
      (name == "NOTION_TOKEN").then(|| "secret_x".to_string())
    });

    match provider.fetch(CredentialItem::Notion).await {
      Err(BrieferError::CredentialNotFound { item, missing }) => {
        assert_eq!(item, "Notion");
        assert_eq!(missing, ["NOTION_DATABASE_ID"]);
      },
      other => panic!("expected CredentialNotFound, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_base_url_defaults() {
    let mut provider = EnvironmentProvider::with_lookup(|name| match name {
      "CANOE_CLIENT_ID" => Some("id".to_string()),
      "CANOE_CLIENT_SECRET" => Some("secret".to_string()),
      _ => None,
    });

    let canoe = provider.fetch(CredentialItem::Canoe).await.unwrap();
    assert_eq!(canoe.get(CredentialField::BaseUrl).unwrap(), "https://api.canoesoftware.com");
  }

  #[tokio::test]
  #[serial]
  async fn test_process_environment() {
    std::env::set_var("GOOGLE_SHEETS_CREDENTIALS_JSON", r#"{"type":"service_account"}"#);
    std::env::set_var("GOOGLE_SHEETS_SPREADSHEET_ID", "sheet-42");

    let mut provider = EnvironmentProvider::new();
    let sheets = provider.fetch(CredentialItem::GoogleSheets).await.unwrap();
    assert_eq!(sheets.get(CredentialField::SpreadsheetId).unwrap(), "sheet-42");

    std::env::remove_var("GOOGLE_SHEETS_CREDENTIALS_JSON");
    std::env::remove_var("GOOGLE_SHEETS_SPREADSHEET_ID");
  }
}
