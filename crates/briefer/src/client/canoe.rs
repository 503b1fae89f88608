//! Canoe document API client.
//!
//! Authentication is an OAuth2 client-credentials grant against `{base}/oauth/token`; the access
//! token is requested on first use and kept for the life of the client. Documents are searched at
//! `{base}/v1/documents/data` with the resolved filter set as query parameters and downloaded from
//! `{base}/v1/documents/{id}`.

use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::*;

/// Fields requested when looking up a single document's metadata.
pub const METADATA_FIELDS: &str = "id,name,original_file_name,document_type,data_date,allocations";

/// Keys a document listing may be wrapped in.
const LIST_KEYS: [&str; 3] = ["data", "documents", "results"];

/// OAuth token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}

/// Client for the Canoe document API.
pub struct CanoeClient {
  /// HTTP client
  http:             reqwest::Client,
  /// API root, ending in `/`
  base:             Url,
  /// OAuth client id
  client_id:        String,
  /// OAuth client secret
  client_secret:    String,
  /// Access token, once obtained
  token:            Option<String>,
  /// Timeout for one download request
  download_timeout: Duration,
  /// Retry policy for searches and downloads
  retry:            RetryPolicy,
}

impl CanoeClient {
  /// Builds a client from the `Canoe` credential item.
  pub fn new(credentials: &Credentials, config: &Config) -> Result<Self> {
    let base = credentials.get(CredentialField::BaseUrl).unwrap_or(config.canoe_base_url.as_str());
    Ok(Self {
      http:             reqwest::Client::new(),
      base:             base_url(base)?,
      client_id:        credentials.get(CredentialField::ClientId)?.to_string(),
      client_secret:    credentials.get(CredentialField::ClientSecret)?.to_string(),
      token:            None,
      download_timeout: config.download_timeout(),
      retry:            RetryPolicy::from_config(config),
    })
  }

  /// Token endpoint.
  pub fn token_url(&self) -> Result<Url> { Ok(self.base.join("oauth/token")?) }

  /// Search endpoint with `filters` as query parameters.
  pub fn search_url(&self, filters: &ResolvedFilterSet) -> Result<Url> {
    let mut url = self.base.join("v1/documents/data")?;
    if !filters.is_empty() {
      url.query_pairs_mut().extend_pairs(filters.to_query_pairs());
    }
    Ok(url)
  }

  /// Download endpoint for one document.
  pub fn download_url(&self, document_id: &str) -> Result<Url> {
    let mut url = self.base.join("v1/documents")?;
    url
      .path_segments_mut()
      .map_err(|_| BrieferError::Config(format!("Canoe base URL {} cannot hold a path", self.base)))?
      .push(document_id);
    Ok(url)
  }

  /// Form body of the client-credentials grant.
  fn token_form(&self) -> String {
    url::form_urlencoded::Serializer::new(String::new())
      .append_pair("grant_type", "client_credentials")
      .append_pair("client_id", &self.client_id)
      .append_pair("client_secret", &self.client_secret)
      .finish()
  }

  async fn access_token(&mut self) -> Result<String> {
    if let Some(token) = &self.token {
      return Ok(token.clone());
    }

    debug!("Requesting Canoe access token");
    let response = self
      .http
      .post(self.token_url()?)
      .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(self.token_form())
      .send()
      .await?;
    let token: TokenResponse = check_status(response).await?.json().await?;
    info!("Authenticated with Canoe");

    self.token = Some(token.access_token.clone());
    Ok(token.access_token)
  }

  async fn get_json(&self, url: Url, token: &str) -> Result<Value> {
    let response = self
      .http
      .get(url)
      .header(ACCEPT, "application/json")
      .header("X-Requested-With", "XMLHttpRequest")
      .bearer_auth(token)
      .send()
      .await?;
    Ok(check_status(response).await?.json().await?)
  }

  async fn fetch_pdf(&self, url: Url, token: &str) -> Result<Vec<u8>> {
    let response =
      self.http.get(url).bearer_auth(token).timeout(self.download_timeout).send().await?;
    Ok(check_status(response).await?.bytes().await?.to_vec())
  }

  async fn try_download(&mut self, document_id: &str) -> Result<Vec<u8>> {
    let token = self.access_token().await?;
    let url = self.download_url(document_id)?;
    let this = &*self;
    let label = format!("Download of {document_id}");
    let bytes = this.retry.run(&label, || this.fetch_pdf(url.clone(), &token)).await?;
    debug!("Downloaded {} bytes for {}", bytes.len(), document_id);
    Ok(bytes)
  }
}

/// Reads a document listing, which is either a bare array or an object wrapping one.
///
/// Entries that do not parse are skipped with a warning.
pub(crate) fn parse_document_list(body: Value) -> Result<Vec<DocumentDescriptor>> {
  let items = match body {
    Value::Array(items) => items,
    Value::Object(mut map) => LIST_KEYS
      .iter()
      .find_map(|key| match map.remove(*key) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
      })
      .ok_or_else(|| BrieferError::ApiError {
        status:  200,
        message: "document listing holds no document array".to_string(),
      })?,
    other => {
      return Err(BrieferError::ApiError {
        status:  200,
        message: format!("unexpected document listing: {other}"),
      })
    },
  };

  Ok(
    items
      .into_iter()
      .filter_map(|item| match serde_json::from_value::<DocumentDescriptor>(item) {
        Ok(document) => Some(document),
        Err(e) => {
          warn!("Skipping malformed document entry: {}", e);
          None
        },
      })
      .collect(),
  )
}

#[async_trait]
impl DocumentSource for CanoeClient {
  async fn list_documents(
    &mut self,
    filters: &ResolvedFilterSet,
  ) -> Result<Vec<DocumentDescriptor>> {
    let token = self.access_token().await?;
    let url = self.search_url(filters)?;
    debug!("Searching Canoe documents: {}", url);

    let this = &*self;
    let body = this.retry.run("Canoe document search", || this.get_json(url.clone(), &token)).await?;
    parse_document_list(body)
  }

  async fn describe(&mut self, document_id: &str) -> Result<DocumentDescriptor> {
    let filters = ResolvedFilterSet::for_document(document_id, METADATA_FIELDS);
    let found = self.list_documents(&filters).await?.into_iter().find(|d| d.id == document_id);
    Ok(found.unwrap_or_else(|| {
      warn!("No metadata found for document {}", document_id);
      DocumentDescriptor::new(document_id)
    }))
  }

  async fn download(&mut self, document_id: &str) -> Result<Vec<u8>> {
    self.try_download(document_id).await.map_err(|e| BrieferError::DownloadFailure {
      document_id: document_id.to_string(),
      reason:      e.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filter::FilterParameter;

  fn client(base: &str) -> CanoeClient {
    let mut values = BTreeMap::new();
    values.insert(CredentialField::ClientId, "client id".to_string());
    values.insert(CredentialField::ClientSecret, "s3cr&t".to_string());
    values.insert(CredentialField::BaseUrl, base.to_string());
    let credentials =
      Credentials::from_values(crate::credential::CredentialItem::Canoe, values).unwrap();
    CanoeClient::new(&credentials, &Config::default()).unwrap()
  }

  #[test]
  fn test_endpoints() {
    let canoe = client("https://api.canoe.test");
    assert_eq!(canoe.token_url().unwrap().as_str(), "https://api.canoe.test/oauth/token");
    assert_eq!(
      canoe.download_url("doc 1").unwrap().as_str(),
      "https://api.canoe.test/v1/documents/doc%201"
    );

    let filters = ResolvedFilterSet::for_document("42", METADATA_FIELDS);
    let url = canoe.search_url(&filters).unwrap();
    assert_eq!(url.path(), "/v1/documents/data");
    let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(pairs[FilterParameter::Id.as_str()], "42");
    assert_eq!(pairs[FilterParameter::Fields.as_str()], METADATA_FIELDS);
  }

  #[test]
  fn test_token_form_is_encoded() {
    let canoe = client("https://api.canoe.test/");
    assert_eq!(
      canoe.token_form(),
      "grant_type=client_credentials&client_id=client+id&client_secret=s3cr%26t"
    );
  }

  #[traced_test]
  #[test]
  fn test_parse_document_list_shapes() {
    let wrapped = serde_json::json!({
      "data": [
        {"id": "a", "name": "Q1 Letter", "data_date": "2024-03-31"},
        {"name": "no id"},
        {"id": 7}
      ]
    });
    let documents = parse_document_list(wrapped).unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].data_date.as_deref(), Some("2024-03-31"));
    assert_eq!(documents[1].id, "7");
    assert!(logs_contain("Skipping malformed document entry"));

    let bare = serde_json::json!([{"id": "b"}]);
    assert_eq!(parse_document_list(bare).unwrap()[0].id, "b");

    assert!(parse_document_list(serde_json::json!({"count": 0})).is_err());
  }

  #[ignore = "Requires Canoe credentials in the environment."]
  #[tokio::test]
  async fn test_live_search() {
    let mut resolver =
      crate::credential::CredentialResolver::new().with_provider(crate::credential::EnvironmentProvider::new());
    let credentials = resolver.resolve(crate::credential::CredentialItem::Canoe).await.unwrap().clone();
    let mut canoe = CanoeClient::new(&credentials, &Config::default()).unwrap();
    let filters = ResolvedFilterSet::for_document("1", METADATA_FIELDS);
    canoe.list_documents(&filters).await.unwrap();
  }
}
