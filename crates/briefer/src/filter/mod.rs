//! Document filters: presets, overrides and the resolved Canoe query.
//!
//! A query is assembled from up to three layers, folded left to right so later layers win:
//!
//! 1. Legacy defaults (quarterly reports, status complete, `data_date_start` N days back)
//! 2. The body of a named preset from the filter file
//! 3. Overrides given on the command line
//!
//! Folding drops keys outside [`FilterParameter`] with a warning, resolves every date-valued
//! parameter through [`crate::date`], and fills in the default field selection when no layer set
//! one. The result is a [`ResolvedFilterSet`] that is ready to be sent as query parameters.
//!
//! # Examples
//!
//! ```
//! use briefer::filter::{FilterParameter, FilterRequest, PresetStore};
//!
//! let store = PresetStore::from_json(
//!   r#"{ "presets": { "quarterly_reports": {
//!         "description": "Quarterly reports from the last month",
//!         "document_type": "Quarterly Report",
//!         "data_date_start": "auto:30d"
//!   } } }"#,
//! )?;
//!
//! let request = FilterRequest::preset("quarterly_reports").with_override("document_type", "Annual Report");
//! let filters = store.resolve(&request)?;
//! assert_eq!(filters.get(FilterParameter::DocumentType), Some("Annual Report"));
//! assert!(!filters.get(FilterParameter::DataDateStart).unwrap().starts_with("auto:"));
//! # Ok::<(), briefer::error::BrieferError>(())
//! ```

use super::*;
use crate::date::{self, DateExpression};

mod preset;

pub use preset::{Preset, PresetStore};

/// Field selection used when no layer specifies `fields`.
pub const DEFAULT_FIELDS: &str = "id,name,document_type,data_date";

/// Preset used by the CLI when no filter mode is given at all.
pub const DEFAULT_PRESET: &str = "quarterly_reports";

/// Preset keys that describe the preset rather than the query.
const METADATA_KEYS: [&str; 2] = ["name", "description"];

/// The fixed set of query parameters the Canoe document search understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterParameter {
  /// A single document id
  Id,
  /// Document type, e.g. "Quarterly Report"
  DocumentType,
  /// Processing status, e.g. "Complete"
  DocumentStatus,
  /// Comma separated fund ids
  FundId,
  /// Comma separated account ids
  AccountId,
  /// Fund sponsor
  FundSponsor,
  /// Document source
  Source,
  /// Comma separated list of fields to return
  Fields,
  /// Start of the report data date range
  DataDateStart,
  /// End of the report data date range
  DataDateEnd,
  /// Start of the upload time range
  FileUploadTimeStart,
  /// End of the upload time range
  FileUploadTimeEnd,
  /// Start of the approval date range
  ApprovalDateStart,
  /// End of the approval date range
  ApprovalDateEnd,
}

impl FilterParameter {
  /// All recognized parameters in query order.
  pub const ALL: [FilterParameter; 14] = [
    Self::Id,
    Self::DocumentType,
    Self::DocumentStatus,
    Self::FundId,
    Self::AccountId,
    Self::FundSponsor,
    Self::Source,
    Self::Fields,
    Self::DataDateStart,
    Self::DataDateEnd,
    Self::FileUploadTimeStart,
    Self::FileUploadTimeEnd,
    Self::ApprovalDateStart,
    Self::ApprovalDateEnd,
  ];

  /// Wire name of the parameter.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Id => "id",
      Self::DocumentType => "document_type",
      Self::DocumentStatus => "document_status",
      Self::FundId => "fund_id",
      Self::AccountId => "account_id",
      Self::FundSponsor => "fund_sponsor",
      Self::Source => "source",
      Self::Fields => "fields",
      Self::DataDateStart => "data_date_start",
      Self::DataDateEnd => "data_date_end",
      Self::FileUploadTimeStart => "file_upload_time_start",
      Self::FileUploadTimeEnd => "file_upload_time_end",
      Self::ApprovalDateStart => "approval_date_start",
      Self::ApprovalDateEnd => "approval_date_end",
    }
  }

  /// Whether values of this parameter go through date resolution.
  pub fn is_date(&self) -> bool {
    matches!(
      self,
      Self::DataDateStart
        | Self::DataDateEnd
        | Self::FileUploadTimeStart
        | Self::FileUploadTimeEnd
        | Self::ApprovalDateStart
        | Self::ApprovalDateEnd
    )
  }
}

impl Display for FilterParameter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for FilterParameter {
  type Err = BrieferError;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|p| p.as_str() == s)
      .ok_or_else(|| BrieferError::UnrecognizedOverrideParameter(s.to_string()))
  }
}

/// One partial mapping of raw parameter names to values, tagged with where it came from.
#[derive(Debug, Clone, Default)]
pub struct FilterLayer {
  /// Human readable origin, used in log lines ("legacy", "preset quarterly_reports", ...)
  pub origin: String,
  /// Raw key/value pairs; keys are validated during folding
  pub values: BTreeMap<String, String>,
}

impl FilterLayer {
  /// Creates an empty layer.
  pub fn new(origin: impl Into<String>) -> Self {
    Self { origin: origin.into(), values: BTreeMap::new() }
  }

  /// Adds one key/value pair.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.values.insert(key.into(), value.into());
    self
  }

  /// The hardcoded filter used by legacy `--days-back` mode.
  pub fn legacy(days_back: u32, now: NaiveDateTime) -> Self {
    Self::new("legacy days-back")
      .with(FilterParameter::DocumentType.as_str(), "Quarterly Report")
      .with(FilterParameter::DocumentStatus.as_str(), "Complete")
      .with(FilterParameter::DataDateStart.as_str(), format!("auto:{days_back}d"))
      .with(FilterParameter::DataDateEnd.as_str(), date::today_at(now))
      .with(FilterParameter::Fields.as_str(), DEFAULT_FIELDS)
  }
}

/// What the caller asked for: a preset or legacy days-back, plus overrides.
#[derive(Debug, Clone, Default)]
pub struct FilterRequest {
  /// Name of a preset in the filter file
  pub preset:    Option<String>,
  /// Legacy mode: quarterly reports from the last N days
  pub days_back: Option<u32>,
  /// Explicit parameter overrides, highest precedence
  pub overrides: BTreeMap<String, String>,
}

impl FilterRequest {
  /// Request based on a named preset.
  pub fn preset(name: impl Into<String>) -> Self {
    Self { preset: Some(name.into()), ..Default::default() }
  }

  /// Request in legacy days-back mode.
  pub fn days_back(days: u32) -> Self { Self { days_back: Some(days), ..Default::default() } }

  /// Adds an override.
  pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.overrides.insert(key.into(), value.into());
    self
  }

  /// Whether the overrides describe a query without help from a preset or legacy mode.
  ///
  /// That needs at least a document type or one date bound.
  pub fn overrides_form_query(&self) -> bool {
    self.overrides.keys().filter_map(|k| k.parse::<FilterParameter>().ok()).any(|p| {
      p == FilterParameter::DocumentType || p == FilterParameter::Id || p.is_date()
    })
  }
}

/// The final, validated query for the Canoe document search.
///
/// Only recognized parameters are present and every relative date has been resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFilterSet {
  /// Parameter values in query order
  params: BTreeMap<FilterParameter, String>,
}

impl ResolvedFilterSet {
  /// Value of one parameter, if set.
  pub fn get(&self, param: FilterParameter) -> Option<&str> {
    self.params.get(&param).map(String::as_str)
  }

  /// Iterates over `(parameter, value)` pairs in query order.
  pub fn iter(&self) -> impl Iterator<Item = (FilterParameter, &str)> {
    self.params.iter().map(|(p, v)| (*p, v.as_str()))
  }

  /// Query pairs ready for a URL.
  pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
    self.params.iter().map(|(p, v)| (p.as_str(), v.clone())).collect()
  }

  /// Number of parameters set.
  pub fn len(&self) -> usize { self.params.len() }

  /// Whether nothing is set.
  pub fn is_empty(&self) -> bool { self.params.is_empty() }

  /// A filter that fetches a single document's metadata.
  pub fn for_document(document_id: &str, fields: &str) -> Self {
    let mut params = BTreeMap::new();
    params.insert(FilterParameter::Id, document_id.to_string());
    params.insert(FilterParameter::Fields, fields.to_string());
    Self { params }
  }
}

/// Folds `layers` left to right into a [`ResolvedFilterSet`] using `now` for relative dates.
///
/// Later layers override earlier ones key by key. Unrecognized keys are dropped with a warning;
/// date values are resolved, with malformed literals passed through and malformed `auto:`
/// expressions dropped.
pub fn fold_layers(layers: &[FilterLayer], now: NaiveDateTime) -> ResolvedFilterSet {
  let mut params = BTreeMap::new();

  for layer in layers {
    for (key, raw) in &layer.values {
      if METADATA_KEYS.contains(&key.as_str()) {
        trace!("Skipping preset metadata key '{}' from {}", key, layer.origin);
        continue;
      }

      let param = match key.parse::<FilterParameter>() {
        Ok(param) => param,
        Err(e) => {
          warn!("{} from {}; dropping it", e, layer.origin);
          continue;
        },
      };

      let value = if param.is_date() {
        match resolve_date_value(param, raw, now) {
          Some(value) => value,
          None => {
            params.remove(&param);
            continue;
          },
        }
      } else {
        raw.trim().to_string()
      };

      debug!("{} = {} (from {})", param, value, layer.origin);
      params.insert(param, value);
    }
  }

  params.entry(FilterParameter::Fields).or_insert_with(|| DEFAULT_FIELDS.to_string());
  ResolvedFilterSet { params }
}

/// Resolves one date-valued parameter, logging anything suspicious.
///
/// Returns `None` when the value has to be dropped.
fn resolve_date_value(param: FilterParameter, raw: &str, now: NaiveDateTime) -> Option<String> {
  match raw.parse::<DateExpression>().and_then(|expr| expr.resolve_at(now)) {
    Ok(value) => Some(value),
    Err(e) if date::is_relative(raw) => {
      warn!("{} for {}; dropping the parameter", e, param);
      None
    },
    Err(e) => {
      warn!("{} for {}; expected YYYY-MM-DD, passing it through as-is", e, param);
      Some(raw.trim().to_string())
    },
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap().and_hms_opt(8, 0, 0).unwrap()
  }

  #[test]
  fn test_parameter_names_round_trip() {
    for param in FilterParameter::ALL {
      assert_eq!(param.as_str().parse::<FilterParameter>().unwrap(), param);
    }
    assert!("foo".parse::<FilterParameter>().is_err());
  }

  #[test]
  fn test_later_layers_win() {
    let base = FilterLayer::new("preset").with("document_type", "Quarterly Report");
    let top = FilterLayer::new("override").with("document_type", "Annual Report");
    let resolved = fold_layers(&[base, top], now());
    assert_eq!(resolved.get(FilterParameter::DocumentType), Some("Annual Report"));
  }

  #[test]
  fn test_default_fields_applied() {
    let resolved = fold_layers(&[FilterLayer::new("x").with("document_type", "K-1")], now());
    assert_eq!(resolved.get(FilterParameter::Fields), Some(DEFAULT_FIELDS));

    let resolved =
      fold_layers(&[FilterLayer::new("x").with("fields", "id,name,allocations")], now());
    assert_eq!(resolved.get(FilterParameter::Fields), Some("id,name,allocations"));
  }

  #[traced_test]
  #[test]
  fn test_unrecognized_keys_dropped() {
    let layer = FilterLayer::new("override").with("foo", "bar").with("document_type", "K-1");
    let resolved = fold_layers(&[layer], now());
    assert_eq!(resolved.len(), 2);
    assert!(resolved.iter().all(|(p, _)| p != FilterParameter::Id));
    assert!(logs_contain("Unrecognized override parameter \"foo\""));
  }

  #[traced_test]
  #[test]
  fn test_date_handling() {
    let layer = FilterLayer::new("preset")
      .with("data_date_start", "auto:15d")
      .with("data_date_end", "06/30/2024")
      .with("file_upload_time_start", "auto:2w")
      .with("approval_date_start", "auto:6h");
    let resolved = fold_layers(&[layer], now());

    assert_eq!(resolved.get(FilterParameter::DataDateStart), Some("2024-05-31"));
    // Malformed literals are kept for the API to judge
    assert_eq!(resolved.get(FilterParameter::DataDateEnd), Some("06/30/2024"));
    // Malformed relative expressions never survive
    assert_eq!(resolved.get(FilterParameter::FileUploadTimeStart), None);
    assert_eq!(resolved.get(FilterParameter::ApprovalDateStart), Some("2024-06-15T02:00:00"));
    assert!(logs_contain("expected YYYY-MM-DD"));
    assert!(resolved.iter().all(|(_, v)| !v.starts_with("auto:")));
  }

  #[test]
  fn test_malformed_relative_override_removes_lower_layer_value() {
    let base = FilterLayer::new("preset").with("data_date_start", "2024-01-01");
    let top = FilterLayer::new("override").with("data_date_start", "auto:soon");
    let resolved = fold_layers(&[base, top], now());
    assert_eq!(resolved.get(FilterParameter::DataDateStart), None);
  }

  #[test]
  fn test_legacy_layer() {
    let resolved = fold_layers(&[FilterLayer::legacy(14, now())], now());
    assert_eq!(resolved.get(FilterParameter::DocumentType), Some("Quarterly Report"));
    assert_eq!(resolved.get(FilterParameter::DocumentStatus), Some("Complete"));
    assert_eq!(resolved.get(FilterParameter::DataDateStart), Some("2024-06-01"));
    assert_eq!(resolved.get(FilterParameter::DataDateEnd), Some("2024-06-15"));
    assert_eq!(resolved.get(FilterParameter::Fields), Some(DEFAULT_FIELDS));
  }

  #[test]
  fn test_overrides_form_query() {
    assert!(!FilterRequest::default().overrides_form_query());
    assert!(!FilterRequest::default().with_override("fund_sponsor", "Acme").overrides_form_query());
    assert!(FilterRequest::default().with_override("document_type", "K-1").overrides_form_query());
    assert!(FilterRequest::default()
      .with_override("data_date_start", "2024-01-01")
      .overrides_form_query());
  }
}
