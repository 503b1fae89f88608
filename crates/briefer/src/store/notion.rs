//! Notion database store: one page per document.

use reqwest::header::CONTENT_TYPE;
use serde_json::json;

use super::*;

/// Pages endpoint.
const PAGES_URL: &str = "https://api.notion.com/v1/pages";

/// API version header value.
const NOTION_VERSION: &str = "2022-06-28";

/// Longest text Notion accepts in one rich-text object.
const TEXT_LIMIT: usize = 2000;

/// Summary text written when a document was not summarized.
const NO_SUMMARY: &str = "NA";

/// Page-creation response; only the URL is used.
#[derive(Debug, Deserialize)]
struct PageResponse {
  #[serde(default)]
  url: Option<String>,
}

/// Writes summaries as pages of a Notion database.
pub struct NotionStore {
  http:        reqwest::Client,
  token:       String,
  database_id: String,
  endpoint:    Url,
  retry:       RetryPolicy,
}

impl NotionStore {
  /// Builds a store from the `Notion` credential item.
  pub fn new(credentials: &Credentials, config: &Config) -> Result<Self> {
    Ok(Self {
      http:        reqwest::Client::new(),
      token:       credentials.get(CredentialField::Token)?.to_string(),
      database_id: credentials.get(CredentialField::DatabaseId)?.to_string(),
      endpoint:    Url::parse(PAGES_URL)?,
      retry:       RetryPolicy::from_config(config),
    })
  }

  /// Request body creating the page for `record`.
  ///
  /// Properties: `Title`, `Summary` (cut to 2000 characters), `Type`, `Date` (when the data date
  /// is an ISO date) and `Status`. The body is an "Executive Summary" heading followed by the
  /// summary split into paragraphs.
  pub fn page_body(&self, record: &SummaryRecord) -> Value {
    let document = &record.document;
    let summary = record.summary.as_deref().unwrap_or(NO_SUMMARY);

    let mut properties = json!({
      "Title": { "title": [rich_text(&truncate(&document.display_name(), TEXT_LIMIT))] },
      "Summary": { "rich_text": [rich_text(&truncate(summary, TEXT_LIMIT))] },
      "Type": { "select": { "name": document.document_type.as_deref().unwrap_or("Unknown") } },
      "Status": { "select": { "name": "Completed" } },
    });
    let date = document
      .data_date
      .as_deref()
      .map(str::trim)
      .filter(|d| crate::date::has_iso_date_prefix(d))
      .and_then(|d| d.get(..10));
    if let Some(date) = date {
      properties["Date"] = json!({ "date": { "start": date } });
    }

    let mut children = vec![json!({
      "object": "block",
      "type": "heading_2",
      "heading_2": { "rich_text": [rich_text("Executive Summary")] },
    })];
    children.extend(paragraphs(summary).into_iter().map(|text| {
      json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": { "rich_text": [rich_text(&text)] },
      })
    }));

    json!({
      "parent": { "database_id": self.database_id },
      "properties": properties,
      "children": children,
    })
  }

  async fn create_page(&self, body: &Value) -> Result<PageResponse> {
    let response = self
      .http
      .post(self.endpoint.clone())
      .bearer_auth(&self.token)
      .header("Notion-Version", NOTION_VERSION)
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await?;
    Ok(check_status(response).await?.json().await?)
  }
}

/// A plain rich-text object.
fn rich_text(content: &str) -> Value { json!({ "type": "text", "text": { "content": content } }) }

/// Splits `text` on blank lines into chunks no longer than [`TEXT_LIMIT`] characters.
fn paragraphs(text: &str) -> Vec<String> {
  let mut chunks = Vec::new();
  for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
    let chars: Vec<char> = paragraph.chars().collect();
    chunks.extend(chars.chunks(TEXT_LIMIT).map(|c| c.iter().collect::<String>()));
  }
  chunks
}

#[async_trait]
impl SummaryStore for NotionStore {
  fn name(&self) -> &'static str { "notion" }

  async fn write(&mut self, record: &SummaryRecord) -> Result<Option<String>> {
    let body = self.page_body(record);
    let label = format!("Notion page for {}", record.document.id);
    let this = &*self;
    let page = this.retry.run(&label, || this.create_page(&body)).await?;
    info!("Created Notion page for {}", record.document.display_name());
    Ok(page.url)
  }
}
