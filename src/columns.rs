// Column allocation for open-ended category labels.
//
// Labels such as interview subjects are only known once the rows have been
// scanned. Each distinct sub-label gets the next free column, in first-seen
// order, starting at a configurable offset.
use crate::types::AggregateRow;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub const DEFAULT_DELIMITER: &str = "-";

/// A label that could not be placed without breaking the label <-> column
/// bijection. The first assignment wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateLabel {
    pub label: String,
    pub kept_index: u32,
    pub rejected_index: u32,
}

/// Bijection between category labels and zero-based column indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryColumnMap {
    by_label: HashMap<String, u32>,
    by_index: BTreeMap<u32, String>,
}

impl CategoryColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `label` to `index`.
    ///
    /// Fails if the label already has a different column, or the column
    /// already belongs to another label; the existing binding is kept.
    pub fn insert(&mut self, label: &str, index: u32) -> Result<(), DuplicateLabel> {
        if let Some(&existing) = self.by_label.get(label) {
            if existing == index {
                return Ok(());
            }
            return Err(DuplicateLabel {
                label: label.to_string(),
                kept_index: existing,
                rejected_index: index,
            });
        }
        if let Some(owner) = self.by_index.get(&index) {
            return Err(DuplicateLabel {
                label: owner.clone(),
                kept_index: index,
                rejected_index: index,
            });
        }
        self.by_label.insert(label.to_string(), index);
        self.by_index.insert(index, label.to_string());
        Ok(())
    }

    pub fn index_of(&self, label: &str) -> Option<u32> {
        self.by_label.get(label).copied()
    }

    pub fn label_at(&self, index: u32) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    /// `(index, label)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_index.iter().map(|(i, l)| (*i, l.as_str()))
    }

    pub fn last_index(&self) -> Option<u32> {
        self.by_index.keys().next_back().copied()
    }
}

/// Outcome of an allocation: either clean, or the map plus every label that
/// violated the bijection.
#[derive(Debug, Clone, PartialEq)]
pub enum Allocation {
    Ok(CategoryColumnMap),
    Warning(CategoryColumnMap, Vec<DuplicateLabel>),
}

impl Allocation {
    pub fn map(&self) -> &CategoryColumnMap {
        match self {
            Allocation::Ok(m) | Allocation::Warning(m, _) => m,
        }
    }

    pub fn duplicates(&self) -> &[DuplicateLabel] {
        match self {
            Allocation::Ok(_) => &[],
            Allocation::Warning(_, d) => d,
        }
    }

    pub fn into_map(self) -> CategoryColumnMap {
        match self {
            Allocation::Ok(m) | Allocation::Warning(m, _) => m,
        }
    }
}

/// Split a label field into trimmed, non-empty sub-labels (repeats kept).
pub fn split_labels<'a>(raw: &'a str, delimiter: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    raw.split(delimiter).map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct ColumnAllocator {
    start_index: u32,
    delimiter: String,
    seeded: Vec<String>,
}

impl ColumnAllocator {
    pub fn new(start_index: u32) -> Self {
        Self {
            start_index,
            delimiter: DEFAULT_DELIMITER.to_string(),
            seeded: Vec::new(),
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Labels that take the first columns in the given order, whether or not
    /// the rows mention them.
    pub fn seed<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seeded = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    pub fn allocate(&self, rows: &[AggregateRow], label_field: &str) -> Allocation {
        let mut map = CategoryColumnMap::new();
        let mut duplicates = Vec::new();
        let mut next_index = self.start_index;

        for label in self.seeded.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            // A seed list naming the same label twice is a configuration defect.
            match map.insert(label, next_index) {
                Ok(()) => next_index += 1,
                Err(dup) => duplicates.push(dup),
            }
        }

        for row in rows {
            let raw = row.label(label_field);
            for label in split_labels(&raw, &self.delimiter) {
                if map.index_of(label).is_some() {
                    continue;
                }
                match map.insert(label, next_index) {
                    Ok(()) => next_index += 1,
                    Err(dup) => duplicates.push(dup),
                }
            }
        }

        if duplicates.is_empty() {
            Allocation::Ok(map)
        } else {
            for d in &duplicates {
                warn!(
                    label = %d.label,
                    kept = d.kept_index,
                    rejected = d.rejected_index,
                    "duplicate category label; keeping first column"
                );
            }
            Allocation::Warning(map, duplicates)
        }
    }

    /// Column of the synthetic "total" entry: one past the last label column.
    pub fn total_column(&self, map: &CategoryColumnMap) -> u32 {
        map.last_index().map(|i| i + 1).unwrap_or(self.start_index)
    }

    /// Per-column counts for one row.
    ///
    /// Every allocated label gets an entry (zero when absent from the row),
    /// followed by the total column, which holds the number of *distinct*
    /// sub-labels in the row rather than the sum of counts.
    pub fn project_row(
        &self,
        row: &AggregateRow,
        label_field: &str,
        map: &CategoryColumnMap,
    ) -> Vec<(u32, i64)> {
        let raw = row.label(label_field);
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for label in split_labels(&raw, &self.delimiter) {
            *counts.entry(label).or_insert(0) += 1;
        }

        let mut out: Vec<(u32, i64)> = map
            .iter()
            .map(|(index, label)| (index, counts.get(label).copied().unwrap_or(0)))
            .collect();
        out.push((self.total_column(map), counts.len() as i64));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(labels: &[&str]) -> Vec<AggregateRow> {
        labels
            .iter()
            .map(|l| AggregateRow::new().with("subjects", *l))
            .collect()
    }

    #[test]
    fn allocates_in_first_seen_order() {
        let alloc = ColumnAllocator::new(5).allocate(&rows(&["A-B", "B-C"]), "subjects");
        assert!(alloc.duplicates().is_empty());
        let map = alloc.map();
        assert_eq!(map.index_of("A"), Some(5));
        assert_eq!(map.index_of("B"), Some(6));
        assert_eq!(map.index_of("C"), Some(7));
        assert_eq!(map.label_at(6), Some("B"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn projects_counts_and_distinct_total() {
        let allocator = ColumnAllocator::new(5);
        let data = rows(&["A-B", "B-C"]);
        let map = allocator.allocate(&data, "subjects").into_map();
        let projected = allocator.project_row(&data[0], "subjects", &map);
        assert_eq!(projected, vec![(5, 1), (6, 1), (7, 0), (8, 2)]);
    }

    #[test]
    fn total_counts_distinct_labels_not_occurrences() {
        let allocator = ColumnAllocator::new(0);
        let data = rows(&["A-A-B"]);
        let map = allocator.allocate(&data, "subjects").into_map();
        let projected = allocator.project_row(&data[0], "subjects", &map);
        assert_eq!(projected, vec![(0, 2), (1, 1), (2, 2)]);
    }

    #[test]
    fn trims_and_skips_empty_sub_labels() {
        let allocator = ColumnAllocator::new(2).delimiter(";");
        let map = allocator
            .allocate(&rows(&[" Finance ; ;Legal", "", "Legal"]), "subjects")
            .into_map();
        let labels: Vec<(u32, &str)> = map.iter().collect();
        assert_eq!(labels, vec![(2, "Finance"), (3, "Legal")]);
    }

    #[test]
    fn duplicate_seed_is_reported_and_first_index_kept() {
        let allocator = ColumnAllocator::new(1).seed(["Finance", "Legal", "Finance"]);
        let alloc = allocator.allocate(&rows(&["Legal-HR"]), "subjects");
        assert_eq!(
            alloc.duplicates(),
            &[DuplicateLabel {
                label: "Finance".into(),
                kept_index: 1,
                rejected_index: 3,
            }]
        );
        let map = alloc.map();
        assert_eq!(map.index_of("Finance"), Some(1));
        assert_eq!(map.index_of("Legal"), Some(2));
        // the rejected slot is not burned
        assert_eq!(map.index_of("HR"), Some(3));
    }

    #[test]
    fn insert_rejects_taken_column() {
        let mut map = CategoryColumnMap::new();
        map.insert("A", 0).unwrap();
        assert!(map.insert("A", 0).is_ok());
        let err = map.insert("B", 0).unwrap_err();
        assert_eq!(err.label, "A");
        assert_eq!(map.label_at(0), Some("A"));
        assert_eq!(map.index_of("B"), None);
    }

    #[test]
    fn empty_map_total_sits_at_start() {
        let allocator = ColumnAllocator::new(4);
        let map = allocator.allocate(&[], "subjects").into_map();
        assert!(map.is_empty());
        let projected = allocator.project_row(&AggregateRow::new(), "subjects", &map);
        assert_eq!(projected, vec![(4, 0)]);
    }
}
