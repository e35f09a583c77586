use crate::metrics::Percent;
use crate::period::Period;
use crate::util::{format_signed, parse_f64_safe, round_half_up};
use serde::Serialize;
use std::fmt;
use tabled::Tabled;

/// A single value of an aggregate row, as returned by the data source.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Interpret raw exported text: empty is `Null`, numeric-looking text is a
    /// number, anything else stays text.
    ///
    /// Zero-padded digits (`007`, `0042`) are identifiers and stay text, so
    /// labels and filters see them exactly as exported.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FieldValue::Null;
        }
        if is_zero_padded(trimmed) {
            return FieldValue::Text(trimmed.to_string());
        }
        match parse_f64_safe(Some(trimmed)) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::Text(trimmed.to_string()),
        }
    }
}

fn is_zero_padded(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Null => Ok(()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Ordered key -> value mapping; no identity beyond its position in a result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateRow {
    fields: Vec<(String, FieldValue)>,
}

impl AggregateRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric value of a field.
    ///
    /// This is the single place where missing, null and non-numeric values
    /// coerce to `0`; every summation in the crate goes through it.
    pub fn number(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(FieldValue::Number(n)) => *n,
            Some(FieldValue::Text(s)) => parse_f64_safe(Some(s.as_str())).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn count(&self, key: &str) -> i64 {
        round_half_up(self.number(key))
    }

    /// Textual value of a field; numbers are rendered, missing fields are empty.
    pub fn label(&self, key: &str) -> String {
        self.get(key).map(|v| v.to_string()).unwrap_or_default()
    }
}

/// What the engine asks the aggregate data source for.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub name: String,
    pub period: Period,
    pub filters: Vec<(String, String)>,
    pub group_by: Option<String>,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>, period: Period) -> Self {
        Self {
            name: name.into(),
            period,
            filters: Vec::new(),
            group_by: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct CategoryLine {
    #[serde(rename = "Label")]
    #[tabled(rename = "Label")]
    pub label: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: i64,
    #[serde(rename = "Percent")]
    #[tabled(rename = "%")]
    pub percent: Percent,
    #[serde(rename = "Delta")]
    #[tabled(rename = "Delta", display_with = "display_delta")]
    pub delta: Option<i64>,
}

fn display_delta(delta: &Option<i64>) -> String {
    delta.map(format_signed).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryTable {
    pub title: String,
    pub total: i64,
    pub lines: Vec<CategoryLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryValue {
    pub label: String,
    pub value: String,
}

/// Machine-readable digest of a report, written next to the workbook.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub period: Period,
    pub tables: Vec<SummaryTable>,
    pub values: Vec<SummaryValue>,
}

impl ReportSummary {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            tables: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn value(&mut self, label: impl Into<String>, value: impl ToString) {
        self.values.push(SummaryValue {
            label: label.into(),
            value: value.to_string(),
        });
    }

    pub fn table(&self, title: &str) -> Option<&SummaryTable> {
        self.tables.iter().find(|t| t.title == title)
    }
}
