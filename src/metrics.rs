// Derived values over aggregate rows: percentages, year-over-year deltas,
// category breakdowns and category-to-category transition counts.
//
// Everything here is pure; no I/O and no logging.
use crate::period::Period;
use crate::types::{AggregateRow, CategoryLine};
use chrono::NaiveDate;
use crate::util::{parse_date_safe, round_half_up};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Placeholder rendered wherever a percentage has a zero denominator.
pub const UNDEFINED_PERCENT: &str = "0%";

/// A whole-number percentage, or the marker for a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Percent {
    Value(i64),
    Undefined,
}

impl Percent {
    /// Fraction for spreadsheet number formats (`75% -> 0.75`).
    pub fn fraction(self) -> Option<f64> {
        match self {
            Percent::Value(v) => Some(v as f64 / 100.0),
            Percent::Undefined => None,
        }
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percent::Value(v) => write!(f, "{}%", v),
            Percent::Undefined => f.write_str(UNDEFINED_PERCENT),
        }
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `round(100 * part / whole)`, or `Percent::Undefined` when `whole` is zero.
pub fn percentage_of(part: f64, whole: f64) -> Percent {
    if whole == 0.0 {
        return Percent::Undefined;
    }
    let pct = 100.0 * part / whole;
    if !pct.is_finite() {
        return Percent::Undefined;
    }
    Percent::Value(round_half_up(pct))
}

/// Plain difference; a decline is negative.
pub fn year_over_year_delta(current: i64, previous: i64) -> i64 {
    current - previous
}

/// Difference floored at zero. Counts new entries only, never attrition.
pub fn non_negative_delta(current: i64, previous: i64) -> i64 {
    (current - previous).max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaRule {
    YearOverYear,
    NonNegative,
}

impl DeltaRule {
    pub fn apply(self, current: i64, previous: i64) -> i64 {
        match self {
            DeltaRule::YearOverYear => year_over_year_delta(current, previous),
            DeltaRule::NonNegative => non_negative_delta(current, previous),
        }
    }
}

/// Sum of one numeric field over a result set.
pub fn total(rows: &[AggregateRow], field: &str) -> i64 {
    rows.iter().map(|r| r.count(field)).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    pub total: i64,
    pub total_percent: Percent,
    pub total_delta: Option<i64>,
    pub lines: Vec<CategoryLine>,
}

impl Breakdown {
    pub fn line(&self, label: &str) -> Option<&CategoryLine> {
        self.lines.iter().find(|l| l.label == label)
    }
}

/// Group counts per category for the current period and compare with the
/// previous one.
///
/// - Lines follow first-seen order in `current`; categories only present in
///   `previous` come last with a count of zero.
/// - Percentages are taken against the current total as given by the rows;
///   the denominator is never adjusted.
/// - Pass `previous = None` to skip deltas entirely.
pub fn category_breakdown(
    current: &[AggregateRow],
    previous: Option<&[AggregateRow]>,
    category_field: &str,
    count_field: &str,
    rule: DeltaRule,
) -> Breakdown {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, i64> = HashMap::new();
    for row in current {
        let label = row.label(category_field);
        let e = counts.entry(label.clone()).or_insert_with(|| {
            order.push(label);
            0
        });
        *e += row.count(count_field);
    }

    let mut prior: HashMap<String, i64> = HashMap::new();
    if let Some(prev) = previous {
        for row in prev {
            let label = row.label(category_field);
            if !counts.contains_key(&label) && !prior.contains_key(&label) {
                order.push(label.clone());
            }
            *prior.entry(label).or_insert(0) += row.count(count_field);
        }
    }

    let total: i64 = counts.values().sum();
    let lines = order
        .into_iter()
        .map(|label| {
            let count = counts.get(&label).copied().unwrap_or(0);
            let before = prior.get(&label).copied().unwrap_or(0);
            let delta = previous.map(|_| rule.apply(count, before));
            CategoryLine {
                percent: percentage_of(count as f64, total as f64),
                label,
                count,
                delta,
            }
        })
        .collect();

    let prior_total: i64 = prior.values().sum();
    Breakdown {
        total,
        total_percent: percentage_of(total as f64, total as f64),
        total_delta: previous.map(|_| rule.apply(total, prior_total)),
        lines,
    }
}

/// One record of an entity's label history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEvent {
    pub date: Option<NaiveDate>,
    pub label: String,
}

/// Per-entity label histories in chronological order.
///
/// Rows are grouped by `entity_field`; entities keep first-seen order. Rows
/// without a parseable date sort after dated ones, and ties keep input order.
pub fn dated_label_sequences(
    rows: &[AggregateRow],
    entity_field: &str,
    label_field: &str,
    date_field: &str,
) -> Vec<Vec<LabelEvent>> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<LabelEvent>> = HashMap::new();
    for row in rows {
        let entity = row.label(entity_field);
        let label = row.label(label_field);
        if label.is_empty() {
            continue;
        }
        let raw_date = row.label(date_field);
        let date = parse_date_safe(Some(raw_date.as_str()));
        grouped
            .entry(entity.clone())
            .or_insert_with(|| {
                order.push(entity);
                Vec::new()
            })
            .push(LabelEvent { date, label });
    }
    order
        .into_iter()
        .filter_map(|entity| grouped.remove(&entity))
        .map(|mut seq| {
            // `None` dates go last; sort_by_key is stable.
            seq.sort_by_key(|e| (e.date.is_none(), e.date));
            seq
        })
        .collect()
}

fn zeroed(transitions: &BTreeSet<(String, String)>) -> BTreeMap<(String, String), u64> {
    transitions.iter().map(|t| (t.clone(), 0)).collect()
}

/// Count adjacent `(from, to)` pairs that belong to `transitions`.
///
/// Every tracked transition is present in the result, zero when never seen.
pub fn transition_counts(
    sequences: &[Vec<String>],
    transitions: &BTreeSet<(String, String)>,
) -> BTreeMap<(String, String), u64> {
    let mut counts = zeroed(transitions);
    for seq in sequences {
        for pair in seq.windows(2) {
            let key = (pair[0].clone(), pair[1].clone());
            if let Some(c) = counts.get_mut(&key) {
                *c += 1;
            }
        }
    }
    counts
}

/// Like [`transition_counts`], but a pair only counts when its destination
/// record is dated inside `period`. The origin record may be older, so a
/// move into the period from an earlier plan is still seen. Undated
/// destinations cannot be placed in the window and are not counted.
pub fn transition_counts_within(
    sequences: &[Vec<LabelEvent>],
    transitions: &BTreeSet<(String, String)>,
    period: &Period,
) -> BTreeMap<(String, String), u64> {
    let mut counts = zeroed(transitions);
    for seq in sequences {
        for pair in seq.windows(2) {
            if !pair[1].date.is_some_and(|d| period.contains(d)) {
                continue;
            }
            let key = (pair[0].label.clone(), pair[1].label.clone());
            if let Some(c) = counts.get_mut(&key) {
                *c += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(category: &str, count: i64) -> AggregateRow {
        AggregateRow::new().with("category", category).with("count", count)
    }

    fn plan(entity: &str, label: &str, date: &str) -> AggregateRow {
        AggregateRow::new()
            .with("entity", entity)
            .with("label", label)
            .with("date", date)
    }

    #[test]
    fn percentages_round_to_nearest() {
        assert_eq!(percentage_of(25.0, 100.0), Percent::Value(25));
        assert_eq!(percentage_of(1.0, 3.0), Percent::Value(33));
        assert_eq!(percentage_of(2.0, 3.0), Percent::Value(67));
        assert_eq!(percentage_of(1.0, 8.0), Percent::Value(13));
    }

    #[test]
    fn zero_denominator_is_the_placeholder() {
        assert_eq!(percentage_of(3.0, 0.0), Percent::Undefined);
        assert_eq!(percentage_of(0.0, 0.0), Percent::Undefined);
        assert_eq!(percentage_of(3.0, 0.0).to_string(), "0%");
        assert_eq!(percentage_of(3.0, 0.0).fraction(), None);
    }

    #[test]
    fn deltas() {
        assert_eq!(year_over_year_delta(5, 8), -3);
        assert_eq!(non_negative_delta(5, 8), 0);
        assert_eq!(non_negative_delta(8, 5), 3);
        assert_eq!(DeltaRule::YearOverYear.apply(8, 5), 3);
    }

    #[test]
    fn breakdown_against_previous_period() {
        let current = vec![row("X", 3), row("Y", 1)];
        let previous = vec![row("X", 1), row("Z", 2)];
        let b = category_breakdown(
            &current,
            Some(previous.as_slice()),
            "category",
            "count",
            DeltaRule::YearOverYear,
        );

        assert_eq!(b.total, 4);
        assert_eq!(b.total_percent, Percent::Value(100));
        assert_eq!(b.total_delta, Some(1));
        let labels: Vec<&str> = b.lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["X", "Y", "Z"]);

        let x = b.line("X").unwrap();
        assert_eq!((x.count, x.percent, x.delta), (3, Percent::Value(75), Some(2)));
        let y = b.line("Y").unwrap();
        assert_eq!((y.count, y.percent, y.delta), (1, Percent::Value(25), Some(1)));
        let z = b.line("Z").unwrap();
        assert_eq!((z.count, z.percent, z.delta), (0, Percent::Value(0), Some(-2)));
    }

    #[test]
    fn breakdown_with_floored_deltas_and_empty_current() {
        let previous = vec![row("CDI", 4)];
        let b = category_breakdown(
            &[],
            Some(previous.as_slice()),
            "category",
            "count",
            DeltaRule::NonNegative,
        );
        assert_eq!(b.total, 0);
        assert_eq!(b.total_percent, Percent::Undefined);
        assert_eq!(b.lines[0].percent, Percent::Undefined);
        assert_eq!(b.lines[0].delta, Some(0));
    }

    #[test]
    fn breakdown_merges_repeated_categories() {
        let current = vec![row("X", 1), row("X", 2), AggregateRow::new().with("category", "Y")];
        let b = category_breakdown(&current, None, "category", "count", DeltaRule::YearOverYear);
        assert_eq!(b.line("X").unwrap().count, 3);
        assert_eq!(b.line("Y").unwrap().count, 0);
        assert_eq!(b.line("X").unwrap().delta, None);
        assert_eq!(b.total_delta, None);
    }

    #[test]
    fn counts_tracked_transitions_once() {
        let seqs = vec![vec![
            "Pepiniere".to_string(),
            "Coworking".to_string(),
            "CentreAffaires".to_string(),
        ]];
        let tracked: BTreeSet<(String, String)> =
            [("Coworking".to_string(), "CentreAffaires".to_string())].into_iter().collect();
        let counts = transition_counts(&seqs, &tracked);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&("Coworking".to_string(), "CentreAffaires".to_string())], 1);
    }

    #[test]
    fn untracked_and_non_adjacent_pairs_are_ignored() {
        let seqs = vec![
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec!["A".to_string()],
            vec!["A".to_string(), "C".to_string(), "A".to_string(), "C".to_string()],
        ];
        let tracked: BTreeSet<(String, String)> = [
            ("A".to_string(), "C".to_string()),
            ("C".to_string(), "B".to_string()),
        ]
        .into_iter()
        .collect();
        let counts = transition_counts(&seqs, &tracked);
        assert_eq!(counts[&("A".to_string(), "C".to_string())], 2);
        assert_eq!(counts[&("C".to_string(), "B".to_string())], 0);
    }

    #[test]
    fn sequences_are_chronological_per_entity() {
        let rows = vec![
            plan("acme", "Coworking", "2024-03-01"),
            plan("beta", "Pepiniere", "2024-01-01"),
            plan("acme", "Pepiniere", "2023-11-20"),
            plan("acme", "CentreAffaires", ""),
        ];
        let seqs: Vec<Vec<String>> = dated_label_sequences(&rows, "entity", "label", "date")
            .into_iter()
            .map(|seq| seq.into_iter().map(|e| e.label).collect())
            .collect();
        assert_eq!(
            seqs,
            vec![
                vec![
                    "Pepiniere".to_string(),
                    "Coworking".to_string(),
                    "CentreAffaires".to_string(),
                ],
                vec!["Pepiniere".to_string()],
            ]
        );
    }

    #[test]
    fn transitions_into_the_period_count_from_older_records() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let period = Period::resolve(2024, today);
        let rows = vec![
            plan("c1", "CentreAffaires", "2024-02-01"),
            plan("c1", "Coworking", "2023-09-01"),
            plan("c2", "Pepiniere", "2023-01-05"),
            plan("c2", "Coworking", "2023-06-01"),
            plan("c3", "Pepiniere", "2024-01-02"),
            plan("c3", "Coworking", ""),
        ];
        let seqs = dated_label_sequences(&rows, "entity", "label", "date");
        let tracked: BTreeSet<(String, String)> = [
            ("Coworking".to_string(), "CentreAffaires".to_string()),
            ("Pepiniere".to_string(), "Coworking".to_string()),
        ]
        .into_iter()
        .collect();
        let counts = transition_counts_within(&seqs, &tracked, &period);
        assert_eq!(counts[&("Coworking".to_string(), "CentreAffaires".to_string())], 1);
        // c2 moved before the period; c3's move is undated.
        assert_eq!(counts[&("Pepiniere".to_string(), "Coworking".to_string())], 0);
    }
}
