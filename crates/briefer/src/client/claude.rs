//! Summaries through Anthropic's Messages API.
//!
//! The prompt comes from a template file containing `{document_name}` and `{document_content}`
//! placeholders. When the file is missing a short built-in template is used instead. Document text
//! is cut to a configured number of characters before it is placed in the prompt.
//!
//! ```no_run
//! use briefer::{client::ClaudeClient, prelude::*};
//! # use briefer::{credential::Credentials, Config};
//!
//! # async fn example(credentials: &Credentials, config: &Config) -> Result<(), BrieferError> {
//! let mut claude = ClaudeClient::new(credentials, config)?;
//! let summary = claude.summarize("Fund III Q2 Letter", "Rates were cut twice...").await?;
//! # Ok(())
//! # }
//! ```

use reqwest::header::CONTENT_TYPE;

use super::*;

/// Template used when no prompt file is available.
pub const FALLBACK_PROMPT: &str = "Extract macroeconomic updates from this report (max 200 \
                                   words). Document: {document_name}. Content: {document_content}";

/// Messages API endpoint.
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Request body for the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
  model:      &'a str,
  max_tokens: u32,
  messages:   Vec<Message<'a>>,
}

/// One chat message.
#[derive(Debug, Serialize)]
struct Message<'a> {
  role:    &'a str,
  content: &'a str,
}

/// Response body of the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
}

/// One block of response content; only `text` blocks are used.
#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  text: Option<String>,
}

/// Summarizer backed by Claude.
pub struct ClaudeClient {
  /// HTTP client
  http:       reqwest::Client,
  /// API key
  api_key:    String,
  /// Messages endpoint
  endpoint:   Url,
  /// Model id
  model:      String,
  /// Maximum tokens per summary
  max_tokens: u32,
  /// Characters of document text placed in the prompt
  max_chars:  usize,
  /// Prompt template
  template:   String,
  /// Retry policy for rate limits and server errors
  retry:      RetryPolicy,
}

impl ClaudeClient {
  /// Builds a client from the `Claude` credential item, loading the prompt template from
  /// [`Config::prompt_file`].
  pub fn new(credentials: &Credentials, config: &Config) -> Result<Self> {
    Ok(Self {
      http:       reqwest::Client::new(),
      api_key:    credentials.get(CredentialField::ApiKey)?.to_string(),
      endpoint:   Url::parse(MESSAGES_URL)?,
      model:      config.summary_model.clone(),
      max_tokens: config.summary_max_tokens,
      max_chars:  config.summary_max_chars,
      template:   Self::load_template(&config.prompt_file),
      retry:      RetryPolicy::from_config(config),
    })
  }

  /// Replaces the prompt template.
  pub fn with_template(mut self, template: impl Into<String>) -> Self {
    self.template = template.into();
    self
  }

  /// Sends requests to `endpoint` instead of the public API.
  pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
    self.endpoint = Url::parse(endpoint)?;
    Ok(self)
  }

  /// Reads the template at `path`, falling back to [`FALLBACK_PROMPT`].
  pub fn load_template(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
      Ok(template) if !template.trim().is_empty() => {
        debug!("Loaded prompt template from {}", path.display());
        template
      },
      Ok(_) => {
        warn!("Prompt template {} is empty, using the built-in prompt", path.display());
        FALLBACK_PROMPT.to_string()
      },
      Err(e) => {
        warn!("Could not read prompt template {} ({}), using the built-in prompt", path.display(), e);
        FALLBACK_PROMPT.to_string()
      },
    }
  }

  /// Fills the template for one document.
  pub fn build_prompt(&self, document_name: &str, text: &str) -> String {
    let content: String = text.chars().take(self.max_chars).collect();
    self.template.replace("{document_name}", document_name).replace("{document_content}", &content)
  }

  async fn send(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse> {
    let response = self
      .http
      .post(self.endpoint.clone())
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", ANTHROPIC_VERSION)
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await?;
    Ok(check_status(response).await?.json().await?)
  }
}

/// Text of the first `text` block.
fn first_text(response: MessagesResponse) -> Result<String> {
  response
    .content
    .into_iter()
    .find(|block| block.kind == "text")
    .and_then(|block| block.text)
    .map(|text| text.trim().to_string())
    .filter(|text| !text.is_empty())
    .ok_or_else(|| BrieferError::ApiError {
      status:  200,
      message: "response contained no text".to_string(),
    })
}

#[async_trait]
impl Summarizer for ClaudeClient {
  async fn summarize(&mut self, document_name: &str, text: &str) -> Result<String> {
    let prompt = self.build_prompt(document_name, text);
    let body = MessagesRequest {
      model:      &self.model,
      max_tokens: self.max_tokens,
      messages:   vec![Message { role: "user", content: &prompt }],
    };

    debug!("Requesting summary of {} ({} prompt characters)", document_name, prompt.len());
    let this = &*self;
    let response = this.retry.run("Claude summary", || this.send(&body)).await?;
    let summary = first_text(response)?;
    info!("Summary generated for {} ({} characters)", document_name, summary.len());
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(template: Option<&str>) -> ClaudeClient {
    let mut values = BTreeMap::new();
    values.insert(CredentialField::ApiKey, "sk-ant-test".to_string());
    let credentials =
      Credentials::from_values(crate::credential::CredentialItem::Claude, values).unwrap();
    let config = Config { prompt_file: PathBuf::from("/nonexistent/prompt.txt"), ..Config::default() };
    let claude = ClaudeClient::new(&credentials, &config).unwrap();
    match template {
      Some(template) => claude.with_template(template),
      None => claude,
    }
  }

  #[traced_test]
  #[test]
  fn test_fallback_template() {
    let claude = client(None);
    assert!(logs_contain("using the built-in prompt"));
    let prompt = claude.build_prompt("Q2 Letter", "Inflation eased.");
    assert_eq!(
      prompt,
      "Extract macroeconomic updates from this report (max 200 words). Document: Q2 Letter. \
       Content: Inflation eased."
    );
  }

  #[test]
  fn test_template_file_and_truncation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("prompt.txt");
    std::fs::write(&path, "Summarize {document_name}:\n{document_content}").unwrap();
    let claude = client(None).with_template(ClaudeClient::load_template(&path));

    let text = "é".repeat(12_000);
    let prompt = claude.build_prompt("Big Report", &text);
    assert!(prompt.starts_with("Summarize Big Report:\n"));
    assert_eq!(prompt.chars().filter(|c| *c == 'é').count(), 10_000);
  }

  #[test]
  fn test_first_text_block() {
    let response: MessagesResponse = serde_json::from_str(
      r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"  Rates fell.  "}]}"#,
    )
    .unwrap();
    assert_eq!(first_text(response).unwrap(), "Rates fell.");

    let empty: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
    assert!(first_text(empty).is_err());
  }

  #[test]
  fn test_request_shape() {
    let body = MessagesRequest {
      model:      "claude-3-5-sonnet-20241022",
      max_tokens: 2000,
      messages:   vec![Message { role: "user", content: "hi" }],
    };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["max_tokens"], 2000);
    assert_eq!(json["messages"][0]["role"], "user");
  }

  #[ignore = "Requires ANTHROPIC_API_KEY and network access."]
  #[tokio::test]
  async fn test_live_summary() {
    let mut values = BTreeMap::new();
    values.insert(CredentialField::ApiKey, std::env::var("ANTHROPIC_API_KEY").unwrap());
    let credentials =
      Credentials::from_values(crate::credential::CredentialItem::Claude, values).unwrap();
    let mut claude = ClaudeClient::new(&credentials, &Config::default()).unwrap();
    let summary = claude.summarize("Test", "The central bank cut rates by 25bp.").await.unwrap();
    assert!(!summary.is_empty());
  }
}
