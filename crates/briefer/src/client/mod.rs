//! Clients for the document source and the summarization API.
//!
//! - [`CanoeClient`] lists and downloads documents from Canoe and implements
//!   [`DocumentSource`](crate::pipeline::DocumentSource)
//! - [`ClaudeClient`] sends extracted text to Anthropic's Messages API and implements
//!   [`Summarizer`](crate::pipeline::Summarizer)

use super::*;
use crate::{
  credential::{CredentialField, Credentials},
  filter::ResolvedFilterSet,
  pipeline::{DocumentDescriptor, DocumentSource, Summarizer},
  retry::RetryPolicy,
};

mod canoe;
mod claude;

pub use canoe::{CanoeClient, METADATA_FIELDS};
pub use claude::{ClaudeClient, FALLBACK_PROMPT};

/// Parses `base` as a URL that further paths can be joined onto.
pub(crate) fn base_url(base: &str) -> Result<Url> {
  let trimmed = base.trim();
  let with_slash =
    if trimmed.ends_with('/') { trimmed.to_string() } else { format!("{trimmed}/") };
  Ok(Url::parse(&with_slash)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_keeps_path() {
    let url = base_url("https://example.com/api").unwrap();
    assert_eq!(url.join("v1/documents/9").unwrap().as_str(), "https://example.com/api/v1/documents/9");
    assert!(base_url("not a url").is_err());
  }
}
