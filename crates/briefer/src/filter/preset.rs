//! Loading named presets from the filter file.
//!
//! The filter file is JSON of the form:
//!
//! ```json
//! {
//!   "presets": {
//!     "quarterly_reports": {
//!       "name": "Quarterly Reports",
//!       "description": "Completed quarterly reports from the last two weeks",
//!       "document_type": "Quarterly Report",
//!       "document_status": "Complete",
//!       "data_date_start": "auto:14d",
//!       "fields": ["id", "name", "document_type", "data_date"]
//!     }
//!   }
//! }
//! ```
//!
//! Preset order in the file is preserved and duplicate preset names are rejected.

use std::fmt;

use serde::de::{MapAccess, Visitor};

use super::*;

/// A named, reusable bundle of filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
  /// Key of the preset in the filter file
  pub name: String,
  /// Parameter values as written in the file (strings, numbers, lists)
  pub body: BTreeMap<String, Value>,
}

impl Preset {
  /// Human readable description for discovery output.
  pub fn description(&self) -> String {
    ["description", "name"]
      .iter()
      .find_map(|key| self.body.get(*key).and_then(Value::as_str))
      .unwrap_or("No description")
      .to_string()
  }

  /// The preset body as a filter layer with every value rendered as a string.
  ///
  /// Lists are comma-joined; `null` entries are skipped.
  pub fn to_layer(&self) -> FilterLayer {
    let mut layer = FilterLayer::new(format!("preset {}", self.name));
    for (key, value) in &self.body {
      if let Some(rendered) = render_value(value) {
        layer.values.insert(key.clone(), rendered);
      }
    }
    layer
  }
}

/// Renders a JSON value as a query string value.
fn render_value(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Array(items) => Some(items.iter().filter_map(render_value).collect::<Vec<_>>().join(",")),
    other => Some(other.to_string()),
  }
}

/// All presets loaded from one filter file, in file order.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
  /// Presets in the order they appear in the file
  presets: Vec<Preset>,
}

/// On-disk shape of the filter file.
#[derive(Deserialize)]
struct FilterDocument {
  /// The `presets` table
  #[serde(default)]
  presets: PresetList,
}

/// Ordered preset list that refuses duplicate names.
#[derive(Default)]
struct PresetList(Vec<Preset>);

impl<'de> Deserialize<'de> for PresetList {
  fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
  where D: serde::Deserializer<'de> {
    /// Visits the `presets` object entry by entry.
    struct PresetVisitor;

    impl<'de> Visitor<'de> for PresetVisitor {
      type Value = PresetList;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of preset names to preset bodies")
      }

      fn visit_map<A>(self, mut map: A) -> std::result::Result<PresetList, A::Error>
      where A: MapAccess<'de> {
        let mut presets: Vec<Preset> = Vec::new();
        while let Some((name, body)) = map.next_entry::<String, BTreeMap<String, Value>>()? {
          if presets.iter().any(|p| p.name == name) {
            return Err(serde::de::Error::custom(format!("duplicate preset \"{name}\"")));
          }
          presets.push(Preset { name, body });
        }
        Ok(PresetList(presets))
      }
    }

    deserializer.deserialize_map(PresetVisitor)
  }
}

impl PresetStore {
  /// Parses a filter document from a JSON string.
  pub fn from_json(json: &str) -> Result<Self> {
    let document: FilterDocument =
      serde_json::from_str(json).map_err(|e| BrieferError::InvalidFilterFile(e.to_string()))?;
    debug!("Loaded {} filter presets", document.presets.0.len());
    Ok(Self { presets: document.presets.0 })
  }

  /// Reads and parses the filter file at `path`.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
      BrieferError::InvalidFilterFile(format!("could not read {}: {e}", path.display()))
    })?;
    Self::from_json(&content)
  }

  /// `(name, description)` pairs in file order.
  pub fn list_presets(&self) -> Vec<(String, String)> {
    self.presets.iter().map(|p| (p.name.clone(), p.description())).collect()
  }

  /// Looks up a preset by name.
  pub fn get(&self, name: &str) -> Option<&Preset> { self.presets.iter().find(|p| p.name == name) }

  /// Resolves `request` against the local wall clock.
  pub fn resolve(&self, request: &FilterRequest) -> Result<ResolvedFilterSet> {
    self.resolve_at(request, Local::now().naive_local())
  }

  /// Resolves `request` into a query, treating `now` as the current time.
  ///
  /// # Errors
  ///
  /// - [`BrieferError::ConflictingFilterMode`] when both a preset and days-back are given, or
  ///   neither is given and the overrides do not form a query on their own
  /// - [`BrieferError::PresetNotFound`] when the named preset does not exist
  pub fn resolve_at(&self, request: &FilterRequest, now: NaiveDateTime) -> Result<ResolvedFilterSet> {
    let mut layers = Vec::with_capacity(2);

    match (&request.preset, request.days_back) {
      (Some(name), Some(days)) =>
        return Err(BrieferError::ConflictingFilterMode(format!(
          "preset \"{name}\" and --days-back {days} cannot be combined"
        ))),
      (Some(name), None) => {
        let preset =
          self.get(name).ok_or_else(|| BrieferError::PresetNotFound(name.to_string()))?;
        info!("Using filter preset '{}'", name);
        layers.push(preset.to_layer());
      },
      (None, Some(days)) => {
        info!("Using legacy filter: quarterly reports from the last {} days", days);
        layers.push(FilterLayer::legacy(days, now));
      },
      (None, None) =>
        if !request.overrides_form_query() {
          return Err(BrieferError::ConflictingFilterMode(
            "no preset or days-back given and the overrides alone do not describe a query".into(),
          ));
        },
    }

    if !request.overrides.is_empty() {
      let mut overrides = FilterLayer::new("command line override");
      overrides.values.extend(request.overrides.clone());
      layers.push(overrides);
    }

    Ok(fold_layers(&layers, now))
  }
}
