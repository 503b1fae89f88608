//! PDF text extraction for downloaded reports.
//!
//! Reports arrive as raw bytes from the document API. [`PdfAnalyzer`] parses them with `lopdf`,
//! reads the document information dictionary and pulls text page by page. The text handed to the
//! summarizer marks each page with a `--- Page N ---` separator.
//!
//! ```no_run
//! use briefer::pdf::PdfAnalyzer;
//!
//! # fn example(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let content = PdfAnalyzer::new().analyze_bytes(bytes)?;
//! println!("{} pages, title {:?}", content.pages.len(), content.metadata.title);
//! println!("{}", content.to_prompt_text());
//! # Ok(())
//! # }
//! ```

use lopdf::Document;

use super::*;

/// Everything extracted from one PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfContent {
  /// Document information dictionary
  pub metadata: PdfMetadata,
  /// Text of each page, in page order
  pub pages:    Vec<PageContent>,
}

/// Fields from the PDF `Info` dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfMetadata {
  /// Document title
  pub title:    Option<String>,
  /// Document author
  pub author:   Option<String>,
  /// Document subject
  pub subject:  Option<String>,
  /// Keyword string, unsplit
  pub keywords: Option<String>,
}

/// Text of a single page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContent {
  /// 1-based page number
  pub page_number: u32,
  /// Extracted text, trimmed
  pub text:        String,
}

impl PdfContent {
  /// Whether no page produced any text.
  pub fn is_empty(&self) -> bool { self.pages.iter().all(|p| p.text.is_empty()) }

  /// Page texts joined with page separators, skipping empty pages.
  pub fn to_prompt_text(&self) -> String {
    self
      .pages
      .iter()
      .filter(|p| !p.text.is_empty())
      .map(|p| format!("\n--- Page {} ---\n{}\n", p.page_number, p.text))
      .collect()
  }
}

/// Parses PDFs.
#[derive(Debug, Default)]
pub struct PdfAnalyzer;

impl PdfAnalyzer {
  /// Creates an analyzer.
  pub fn new() -> Self { Self }

  /// Parses a PDF from disk.
  pub fn analyze(&self, path: impl AsRef<Path>) -> Result<PdfContent> {
    self.analyze_document(&Document::load(path)?)
  }

  /// Parses a PDF held in memory.
  pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<PdfContent> {
    self.analyze_document(&Document::load_mem(bytes)?)
  }

  /// Extracts the text of `bytes` for the document `document_id`.
  ///
  /// # Errors
  ///
  /// [`BrieferError::ExtractionFailure`] when the PDF cannot be parsed or holds no text.
  pub fn extract_text(&self, document_id: &str, bytes: &[u8]) -> Result<String> {
    let content = self.analyze_bytes(bytes).map_err(|e| BrieferError::ExtractionFailure {
      document_id: document_id.to_string(),
      reason:      e.to_string(),
    })?;

    if content.is_empty() {
      return Err(BrieferError::ExtractionFailure {
        document_id: document_id.to_string(),
        reason:      "no text content found".to_string(),
      });
    }

    let text = content.to_prompt_text();
    debug!("Extracted {} characters from {} pages of {}", text.len(), content.pages.len(), document_id);
    Ok(text)
  }

  fn analyze_document(&self, doc: &Document) -> Result<PdfContent> {
    let metadata = self.extract_metadata(doc);

    let mut pages = Vec::new();
    for page_number in doc.get_pages().into_keys() {
      // Pages with unsupported fonts or encodings yield no text rather than failing the document
      let text = match doc.extract_text(&[page_number]) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
          warn!("Could not extract text from page {}: {}", page_number, e);
          String::new()
        },
      };
      pages.push(PageContent { page_number, text });
    }

    Ok(PdfContent { metadata, pages })
  }

  fn extract_metadata(&self, doc: &Document) -> PdfMetadata {
    let info = doc
      .trailer
      .get(b"Info")
      .ok()
      .and_then(|o| o.as_reference().ok())
      .and_then(|reference| doc.get_object(reference).and_then(|obj| obj.as_dict()).ok());

    let Some(info) = info else {
      return PdfMetadata::default();
    };

    PdfMetadata {
      title:    text_from_dict(info, "Title"),
      author:   text_from_dict(info, "Author"),
      subject:  text_from_dict(info, "Subject"),
      keywords: text_from_dict(info, "Keywords"),
    }
  }
}

/// Reads a PDF text string, which is UTF-16BE when it starts with a byte order mark.
fn text_from_dict(dict: &lopdf::Dictionary, key: &str) -> Option<String> {
  dict.get(key.as_bytes()).ok().and_then(|obj| obj.as_str().ok()).map(|bytes| {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
      let units: Vec<u16> =
        utf16.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
      String::from_utf16_lossy(&units)
    } else {
      String::from_utf8_lossy(bytes).into_owned()
    }
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use lopdf::{
    content::{Content, Operation},
    dictionary, Object, Stream, StringFormat,
  };

  use super::*;

  pub(crate) fn build_pdf(page_texts: &[&str], title: Option<Vec<u8>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
      "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
      let content = Content {
        operations: vec![
          Operation::new("BT", vec![]),
          Operation::new("Tf", vec!["F1".into(), 24.into()]),
          Operation::new("Td", vec![100.into(), 600.into()]),
          Operation::new("Tj", vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)]),
          Operation::new("ET", vec![]),
        ],
      };
      let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
      let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
      });
      kids.push(page_id.into());
    }

    doc.objects.insert(
      pages_id,
      Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_texts.len() as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
      }),
    );
    let catalog_id = doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(title) = title {
      let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(title, StringFormat::Literal),
        "Author" => Object::string_literal("Fund Admin"),
      });
      doc.trailer.set("Info", info_id);
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
  }

  #[test]
  fn test_extracts_pages_in_order() {
    let bytes = build_pdf(&["Quarterly outlook", "Rates held steady"], None);
    let content = PdfAnalyzer::new().analyze_bytes(&bytes).unwrap();

    assert_eq!(content.pages.len(), 2);
    assert_eq!(content.pages[0].page_number, 1);
    assert!(content.pages[0].text.contains("Quarterly outlook"));
    assert!(content.pages[1].text.contains("Rates held steady"));

    let prompt = content.to_prompt_text();
    let first = prompt.find("--- Page 1 ---").unwrap();
    let second = prompt.find("--- Page 2 ---").unwrap();
    assert!(first < second);
  }

  #[test]
  fn test_metadata_decoding() {
    // "Q3" as UTF-16BE with a byte order mark
    let title = vec![0xFE, 0xFF, 0x00, b'Q', 0x00, b'3'];
    let bytes = build_pdf(&["Hello World!"], Some(title));
    let content = PdfAnalyzer::new().analyze_bytes(&bytes).unwrap();

    assert_eq!(content.metadata.title.as_deref(), Some("Q3"));
    assert_eq!(content.metadata.author.as_deref(), Some("Fund Admin"));
    assert!(content.metadata.subject.is_none());
  }

  #[test]
  fn test_extraction_failures() {
    let analyzer = PdfAnalyzer::new();
    assert!(matches!(
      analyzer.extract_text("doc-1", b"not a pdf"),
      Err(BrieferError::ExtractionFailure { document_id, .. }) if document_id == "doc-1"
    ));

    let blank = build_pdf(&[""], None);
    assert!(matches!(
      analyzer.extract_text("doc-2", &blank),
      Err(BrieferError::ExtractionFailure { reason, .. }) if reason == "no text content found"
    ));
  }

  #[test]
  fn test_analyze_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.pdf");
    std::fs::write(&path, build_pdf(&["Hello World!"], None)).unwrap();

    let text = PdfAnalyzer::new().analyze(&path).unwrap().to_prompt_text();
    assert!(text.starts_with("\n--- Page 1 ---\n"));
    assert!(text.contains("Hello World!"));
  }
}
