//! Relative date expressions used in filter presets.
//!
//! A preset can pin a date (`"2024-01-01"`) or describe one relative to the moment the run starts
//! (`"auto:30d"`). Supported units are days (`d`), months (`m`, 30 days), years (`y`, 365 days)
//! and hours (`h`). Day, month and year expressions resolve to a calendar date; hour expressions
//! resolve to a date-time since the hour is the point of asking for them.
//!
//! ```
//! use briefer::date::resolve_date_expression_at;
//! use chrono::NaiveDate;
//!
//! let now = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! assert_eq!(resolve_date_expression_at("auto:7d", now).unwrap(), "2024-03-24");
//! assert_eq!(resolve_date_expression_at("2024-01-01", now).unwrap(), "2024-01-01");
//! assert!(resolve_date_expression_at("last tuesday", now).is_err());
//! ```

use chrono::TimeDelta;

use super::*;

lazy_static! {
  /// Grammar for relative expressions: `auto:<integer><unit>`.
  static ref AUTO_PATTERN: Regex = Regex::new(r"^auto:(\d+)([dmyh])$").unwrap();
  /// Anything starting with an ISO calendar date.
  static ref ISO_DATE_PREFIX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
}

/// Prefix marking a relative date expression.
pub const AUTO_PREFIX: &str = "auto:";

/// Output format for day-granularity results.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Output format for hour-granularity results.
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Unit of a relative date expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
  /// Calendar days
  Days,
  /// Months, approximated as 30 days
  Months,
  /// Years, approximated as 365 days
  Years,
  /// Hours
  Hours,
}

impl DateUnit {
  /// Span covered by `amount` of this unit.
  pub fn span(&self, amount: i64) -> TimeDelta {
    match self {
      Self::Days => TimeDelta::days(amount),
      Self::Months => TimeDelta::days(amount * 30),
      Self::Years => TimeDelta::days(amount * 365),
      Self::Hours => TimeDelta::hours(amount),
    }
  }

  /// The letter naming this unit in an expression.
  pub fn suffix(&self) -> char {
    match self {
      Self::Days => 'd',
      Self::Months => 'm',
      Self::Years => 'y',
      Self::Hours => 'h',
    }
  }
}

/// A parsed date value from a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateExpression {
  /// `auto:<amount><unit>`: that long before now
  Relative {
    /// How many units back
    amount: u32,
    /// The unit
    unit:   DateUnit,
  },
  /// Already an ISO date (or date-time); passed through unchanged
  Absolute(String),
}

impl FromStr for DateExpression {
  type Err = BrieferError;

  fn from_str(token: &str) -> Result<Self> {
    let token = token.trim();
    if let Some(caps) = AUTO_PATTERN.captures(token) {
      let amount = caps[1]
        .parse::<u32>()
        .map_err(|_| BrieferError::MalformedDateExpression(token.to_string()))?;
      let unit = match &caps[2] {
        "d" => DateUnit::Days,
        "m" => DateUnit::Months,
        "y" => DateUnit::Years,
        _ => DateUnit::Hours,
      };
      return Ok(Self::Relative { amount, unit });
    }

    if ISO_DATE_PREFIX.is_match(token) {
      return Ok(Self::Absolute(token.to_string()));
    }

    Err(BrieferError::MalformedDateExpression(token.to_string()))
  }
}

impl DateExpression {
  /// Produces the absolute value of this expression relative to `now`.
  ///
  /// # Errors
  ///
  /// Returns [`BrieferError::MalformedDateExpression`] when the result falls outside the
  /// representable date range.
  pub fn resolve_at(&self, now: NaiveDateTime) -> Result<String> {
    match self {
      Self::Relative { amount, unit } => {
        let then = now.checked_sub_signed(unit.span(i64::from(*amount))).ok_or_else(|| {
          BrieferError::MalformedDateExpression(format!("{AUTO_PREFIX}{amount}{}", unit.suffix()))
        })?;
        Ok(match unit {
          DateUnit::Hours => then.format(DATE_TIME_FORMAT).to_string(),
          _ => then.date().format(DATE_FORMAT).to_string(),
        })
      },
      Self::Absolute(value) => Ok(value.clone()),
    }
  }
}

/// Whether `value` starts with a `YYYY-MM-DD` date.
pub fn has_iso_date_prefix(value: &str) -> bool { ISO_DATE_PREFIX.is_match(value.trim()) }

/// Whether `value` looks like a relative date expression, well formed or not.
pub fn is_relative(value: &str) -> bool { value.trim().starts_with(AUTO_PREFIX) }

/// Resolves a date token against an explicit `now`.
///
/// # Errors
///
/// Returns [`BrieferError::MalformedDateExpression`] when `token` is neither a relative
/// expression nor ISO-date prefixed. Callers treat this as a warning.
pub fn resolve_date_expression_at(token: &str, now: NaiveDateTime) -> Result<String> {
  token.parse::<DateExpression>()?.resolve_at(now)
}

/// Resolves a date token against the local wall clock.
pub fn resolve_date_expression(token: &str) -> Result<String> {
  resolve_date_expression_at(token, Local::now().naive_local())
}

/// Today's date in `YYYY-MM-DD` form, as of `now`.
pub fn today_at(now: NaiveDateTime) -> String { now.date().format(DATE_FORMAT).to_string() }
