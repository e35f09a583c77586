// Aggregate data sources.
//
// The engine only sees flat key -> value rows. `CsvSource` reads exported
// aggregates from a directory (one file per query), `MemorySource` serves rows
// registered in code. Queries are independent and read-only, so `fetch_all`
// runs them in parallel and waits for every one of them.
use crate::error::{ReportError, Result};
use crate::types::{AggregateRow, FieldValue, QuerySpec};
use crate::util::{parse_date_safe, parse_i32_safe};
use csv::ReaderBuilder;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Rows carrying this column are scoped by date.
pub const DATE_COLUMN: &str = "date";
/// Used for scoping when there is no date column.
pub const YEAR_COLUMN: &str = "year";

pub trait AggregateSource: Sync {
    fn query(&self, spec: &QuerySpec) -> Result<Vec<AggregateRow>>;
}

/// Run every query concurrently; results keep the order of `specs`.
///
/// The first failure fails the whole batch. Nothing is retried.
pub fn fetch_all<S>(source: &S, specs: &[QuerySpec]) -> Result<Vec<Vec<AggregateRow>>>
where
    S: AggregateSource + ?Sized,
{
    specs
        .par_iter()
        .map(|spec| -> Result<Vec<AggregateRow>> {
            let rows = source.query(spec)?;
            debug!(
                query = %spec.name,
                year = spec.period.reference_year,
                rows = rows.len(),
                "fetched aggregates"
            );
            Ok(rows)
        })
        .collect()
}

fn matches_filters(row: &AggregateRow, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(field, value)| row.label(field) == *value)
}

/// Collapse rows sharing the same `key` value: numeric fields are summed,
/// other fields keep the first value seen. Groups keep first-seen order.
fn group_rows(rows: Vec<AggregateRow>, key: &str) -> Vec<AggregateRow> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, AggregateRow> = HashMap::new();
    for row in rows {
        let k = row.label(key);
        match groups.get_mut(&k) {
            Some(acc) => {
                for (field, value) in row.fields() {
                    if let FieldValue::Number(n) = value {
                        if field == key {
                            continue;
                        }
                        let merged = acc.number(field) + n;
                        acc.set(field, merged);
                    } else if acc.get(field).is_none() {
                        acc.set(field, value.clone());
                    }
                }
            }
            None => {
                order.push(k.clone());
                groups.insert(k, row);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|k| groups.remove(&k))
        .collect()
}

#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    fn in_period(row: &AggregateRow, spec: &QuerySpec) -> Option<bool> {
        if let Some(raw) = row.get(DATE_COLUMN) {
            let raw = raw.to_string();
            let date = parse_date_safe(Some(raw.as_str()))?;
            return Some(spec.period.contains(date));
        }
        if let Some(raw) = row.get(YEAR_COLUMN) {
            let raw = raw.to_string();
            let year = parse_i32_safe(Some(raw.as_str()))?;
            return Some(year == spec.period.reference_year);
        }
        Some(true)
    }
}

impl AggregateSource for CsvSource {
    fn query(&self, spec: &QuerySpec) -> Result<Vec<AggregateRow>> {
        let path = self.path_for(&spec.name);
        if !path.is_file() {
            return Err(ReportError::source_unavailable(
                &spec.name,
                format!("{} not found", path.display()),
            ));
        }
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| ReportError::source_unavailable(&spec.name, e))?;
        let headers = rdr
            .headers()
            .map_err(|e| ReportError::source_unavailable(&spec.name, e))?
            .clone();

        let mut total_rows = 0usize;
        let mut skipped = 0usize;
        let mut rows = Vec::new();
        for result in rdr.records() {
            total_rows += 1;
            let record = match result {
                Ok(r) => r,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let mut row = AggregateRow::new();
            for (header, raw) in headers.iter().zip(record.iter()) {
                row.set(header.trim(), FieldValue::from_raw(raw));
            }
            match Self::in_period(&row, spec) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    skipped += 1;
                    continue;
                }
            }
            if matches_filters(&row, &spec.filters) {
                rows.push(row);
            }
        }
        debug!(
            file = %path.display(),
            total_rows,
            kept = rows.len(),
            skipped,
            "read aggregate file"
        );

        Ok(match &spec.group_by {
            Some(key) => group_rows(rows, key),
            None => rows,
        })
    }
}

/// Rows registered per (query name, reference year).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: HashMap<(String, i32), Vec<AggregateRow>>,
    failing: HashSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, reference_year: i32, rows: Vec<AggregateRow>) {
        self.rows.insert((name.to_string(), reference_year), rows);
    }

    pub fn with(mut self, name: &str, reference_year: i32, rows: Vec<AggregateRow>) -> Self {
        self.insert(name, reference_year, rows);
        self
    }

    /// Make every query with this name fail as an unavailable source.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl AggregateSource for MemorySource {
    fn query(&self, spec: &QuerySpec) -> Result<Vec<AggregateRow>> {
        if self.failing.contains(&spec.name) {
            return Err(ReportError::source_unavailable(&spec.name, "source marked as failing"));
        }
        let rows: Vec<AggregateRow> = self
            .rows
            .get(&(spec.name.clone(), spec.period.reference_year))
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_filters(r, &spec.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(match &spec.group_by {
            Some(key) => group_rows(rows, key),
            None => rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Period;
    use chrono::NaiveDate;

    fn period(year: i32) -> Period {
        Period::resolve(year, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    }

    #[test]
    fn grouping_sums_numbers_and_keeps_first_text() {
        let rows = vec![
            AggregateRow::new().with("category", "X").with("count", 2).with("note", "a"),
            AggregateRow::new().with("category", "Y").with("count", 1),
            AggregateRow::new().with("category", "X").with("count", 3).with("note", "b"),
        ];
        let grouped = group_rows(rows, "category");
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].label("category"), "X");
        assert_eq!(grouped[0].count("count"), 5);
        assert_eq!(grouped[0].label("note"), "a");
        assert_eq!(grouped[1].count("count"), 1);
    }

    #[test]
    fn memory_source_scopes_by_year_and_filters() {
        let source = MemorySource::new()
            .with(
                "companies",
                2024,
                vec![
                    AggregateRow::new().with("company", "c1").with("count", 2),
                    AggregateRow::new().with("company", "c2").with("count", 5),
                ],
            )
            .with("companies", 2023, vec![AggregateRow::new().with("count", 9)]);

        let all = source.query(&QuerySpec::new("companies", period(2024))).unwrap();
        assert_eq!(all.len(), 2);
        let c1 = source
            .query(&QuerySpec::new("companies", period(2024)).filter("company", "c1"))
            .unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c1[0].count("count"), 2);
        let missing = source.query(&QuerySpec::new("companies", period(2020))).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn fetch_all_keeps_order_and_fails_fast() {
        let source = MemorySource::new()
            .with("a", 2024, vec![AggregateRow::new().with("n", 1)])
            .with(
                "b",
                2024,
                vec![AggregateRow::new().with("n", 2), AggregateRow::new().with("n", 3)],
            );
        let specs = vec![QuerySpec::new("b", period(2024)), QuerySpec::new("a", period(2024))];
        let results = fetch_all(&source, &specs).unwrap();
        assert_eq!(results[0].len(), 2);
        assert_eq!(results[1].len(), 1);

        let broken = source.failing("a");
        let err = fetch_all(&broken, &specs).unwrap_err();
        assert!(matches!(err, ReportError::SourceUnavailable { ref query, .. } if query == "a"));
    }
}
