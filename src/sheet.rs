// In-memory workbook model and the layout helpers every report uses.
//
// Sheets are sparse cell maps plus merge regions. Nothing here knows about the
// binary format; `output` turns a finished `Workbook` into xlsx bytes.
use crate::coords::CellRef;
use crate::duration::Duration;
use crate::error::{ReportError, Result};
use crate::metrics::Percent;
use crate::types::CategoryLine;
use crate::util::format_signed;
use std::collections::BTreeMap;
use std::fmt;

/// Sheet names are limited to 31 characters and may not contain these.
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Percent(Percent),
    Duration(Duration),
    /// Signed count change, shown as `+2` / `-3`.
    Delta(i64),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Percent(p) => write!(f, "{}", p),
            CellValue::Duration(d) => write!(f, "{}", d),
            CellValue::Delta(d) => f.write_str(&format_signed(*d)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<Percent> for CellValue {
    fn from(v: Percent) -> Self {
        CellValue::Percent(v)
    }
}

impl From<Duration> for CellValue {
    fn from(v: Duration) -> Self {
        CellValue::Duration(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellStyle {
    #[default]
    Plain,
    Title,
    Header,
    Label,
    Total,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

/// Inclusive rectangle; rows 1-based, columns 0-based like `CellRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRegion {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl MergeRegion {
    pub fn new(start_row: u32, start_col: u32, end_row: u32, end_col: u32) -> Result<Self> {
        if start_row == 0 || start_row > end_row || start_col > end_col {
            return Err(ReportError::InvalidMergeRegion(format!(
                "({}, {})..({}, {})",
                start_row, start_col, end_row, end_col
            )));
        }
        Ok(Self {
            start_row,
            start_col,
            end_row,
            end_col,
        })
    }

    /// Single-row band from `anchor` spanning `width` columns.
    pub fn row_band(anchor: CellRef, width: u32) -> Result<Self> {
        Self::new(anchor.row, anchor.col, anchor.row, anchor.col + width.saturating_sub(1))
    }

    pub fn anchor(&self) -> CellRef {
        CellRef {
            row: self.start_row,
            col: self.start_col,
        }
    }

    pub fn overlaps(&self, other: &MergeRegion) -> bool {
        self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }
}

impl fmt::Display for MergeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            CellRef { row: self.start_row, col: self.start_col },
            CellRef { row: self.end_row, col: self.end_col }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOverlap {
    pub sheet: String,
    pub first: MergeRegion,
    pub second: MergeRegion,
}

impl fmt::Display for MergeOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet '{}': {} overlaps {}", self.sheet, self.first, self.second)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    cells: BTreeMap<CellRef, Cell>,
    merges: Vec<MergeRegion>,
    column_widths: BTreeMap<u32, f64>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a cell; a later write to the same reference replaces it.
    pub fn set_cell(&mut self, at: CellRef, value: impl Into<CellValue>, style: CellStyle) {
        self.cells.insert(
            at,
            Cell {
                value: value.into(),
                style,
            },
        );
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    /// Look up by A1 text; unparseable references read as absent.
    pub fn value(&self, a1: &str) -> Option<&CellValue> {
        let at = CellRef::parse(a1).ok()?;
        self.cells.get(&at).map(|c| &c.value)
    }

    /// Displayed text of a cell, as the sheet would show it.
    pub fn display(&self, a1: &str) -> Option<String> {
        self.value(a1).map(|v| v.to_string())
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells.iter()
    }

    /// Appended without checking for overlaps; see [`Sheet::validate_merges`].
    pub fn declare_merge(&mut self, region: MergeRegion) {
        self.merges.push(region);
    }

    pub fn merges(&self) -> &[MergeRegion] {
        &self.merges
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.column_widths.iter().map(|(c, w)| (*c, *w))
    }

    /// Bottom-right corner covering every written cell and merge region, or
    /// `None` for an empty sheet.
    pub fn extent(&self) -> Option<CellRef> {
        let cells = self.cells.keys().map(|r| (r.row, r.col));
        let merges = self.merges.iter().map(|m| (m.end_row, m.end_col));
        cells.chain(merges).fold(None, |acc, (row, col)| {
            Some(match acc {
                None => CellRef { row, col },
                Some(CellRef { row: r, col: c }) => CellRef {
                    row: r.max(row),
                    col: c.max(col),
                },
            })
        })
    }

    /// Every pair of overlapping merge regions, in declaration order.
    pub fn validate_merges(&self) -> Vec<(MergeRegion, MergeRegion)> {
        let mut overlaps = Vec::new();
        for (i, a) in self.merges.iter().enumerate() {
            for b in &self.merges[i + 1..] {
                if a.overlaps(b) {
                    overlaps.push((*a, *b));
                }
            }
        }
        overlaps
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<(String, Sheet)>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_sheet(&mut self, sheet: Sheet, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_SHEET_NAME {
            return Err(ReportError::InvalidSheetName(format!(
                "'{}' must be 1 to {} characters",
                name, MAX_SHEET_NAME
            )));
        }
        if name.contains(FORBIDDEN_SHEET_CHARS) {
            return Err(ReportError::InvalidSheetName(format!(
                "'{}' contains a forbidden character",
                name
            )));
        }
        if self.sheet(name).is_some() {
            return Err(ReportError::InvalidSheetName(format!("'{}' already exists", name)));
        }
        self.sheets.push((name.to_string(), sheet));
        Ok(())
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| s)
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &Sheet)> {
        self.sheets.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn validate_merges(&self) -> Vec<MergeOverlap> {
        self.sheets
            .iter()
            .flat_map(|(name, sheet)| {
                sheet
                    .validate_merges()
                    .into_iter()
                    .map(move |(first, second)| MergeOverlap {
                        sheet: name.clone(),
                        first,
                        second,
                    })
            })
            .collect()
    }
}

/// Where the next block goes. Layout helpers take a cursor and hand back the
/// one after the block they wrote; there is no shared row counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: u32,
    pub col: u32,
}

impl Cursor {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn top() -> Self {
        Self { row: 1, col: 0 }
    }

    pub fn at(&self) -> CellRef {
        CellRef {
            row: self.row,
            col: self.col,
        }
    }

    pub fn down(self, rows: u32) -> Self {
        Self {
            row: self.row.saturating_add(rows),
            col: self.col,
        }
    }
}

/// Table layout: title band, header row, total row, one row per line.
///
/// Columns from the cursor: label, count, percent of total, and a delta
/// column when any line carries one. Returns the cursor one blank row below
/// the table.
pub fn write_labeled_table(
    sheet: &mut Sheet,
    cursor: Cursor,
    title: &str,
    total: &CategoryLine,
    lines: &[CategoryLine],
) -> Result<Cursor> {
    let with_delta = total.delta.is_some() || lines.iter().any(|l| l.delta.is_some());
    let width = if with_delta { 4 } else { 3 };
    let origin = cursor.at();

    sheet.set_cell(origin, title, CellStyle::Title);
    sheet.declare_merge(MergeRegion::row_band(origin, width)?);

    let header = origin.offset(1, 0);
    sheet.set_cell(header, "", CellStyle::Header);
    sheet.set_cell(header.offset(0, 1), "Count", CellStyle::Header);
    sheet.set_cell(header.offset(0, 2), "%", CellStyle::Header);
    if with_delta {
        sheet.set_cell(header.offset(0, 3), "Change vs N-1", CellStyle::Header);
    }

    let mut row = header.offset(1, 0);
    write_line(sheet, row, total, with_delta, CellStyle::Total);
    for line in lines {
        row = row.offset(1, 0);
        write_line(sheet, row, line, with_delta, CellStyle::Plain);
    }

    Ok(Cursor::new(row.row, cursor.col).down(2))
}

fn write_line(
    sheet: &mut Sheet,
    at: CellRef,
    line: &CategoryLine,
    with_delta: bool,
    style: CellStyle,
) {
    let label_style = if style == CellStyle::Total { CellStyle::Total } else { CellStyle::Label };
    sheet.set_cell(at, line.label.as_str(), label_style);
    sheet.set_cell(at.offset(0, 1), line.count, style);
    sheet.set_cell(at.offset(0, 2), line.percent, style);
    // A line without a delta leaves its delta cell empty.
    if let (true, Some(delta)) = (with_delta, line.delta) {
        sheet.set_cell(at.offset(0, 3), CellValue::Delta(delta), style);
    }
}

/// Two-column block: a title band then one `label | value` row per entry.
pub fn write_key_value_block(
    sheet: &mut Sheet,
    cursor: Cursor,
    title: &str,
    entries: &[(String, CellValue)],
) -> Result<Cursor> {
    let origin = cursor.at();
    sheet.set_cell(origin, title, CellStyle::Title);
    sheet.declare_merge(MergeRegion::row_band(origin, 2)?);

    let mut row = origin;
    for (label, value) in entries {
        row = row.offset(1, 0);
        sheet.set_cell(row, label.as_str(), CellStyle::Label);
        sheet.set_cell(row.offset(0, 1), value.clone(), CellStyle::Plain);
    }
    Ok(Cursor::new(row.row, cursor.col).down(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(label: &str, count: i64, pct: i64, delta: Option<i64>) -> CategoryLine {
        CategoryLine {
            label: label.into(),
            count,
            percent: Percent::Value(pct),
            delta,
        }
    }

    #[test]
    fn later_writes_overwrite() {
        let mut sheet = Sheet::new();
        let at = CellRef::parse("B3").unwrap();
        sheet.set_cell(at, "first", CellStyle::Plain);
        sheet.set_cell(at, 7i64, CellStyle::Header);
        let cell = sheet.cell(at).unwrap();
        assert_eq!(cell.value, CellValue::Integer(7));
        assert_eq!(cell.style, CellStyle::Header);
        assert_eq!(sheet.cells().count(), 1);
    }

    #[test]
    fn merge_regions_validate_bounds() {
        assert!(MergeRegion::new(2, 1, 1, 1).is_err());
        assert!(MergeRegion::new(1, 3, 1, 2).is_err());
        assert!(MergeRegion::new(0, 0, 1, 1).is_err());
        assert_eq!(MergeRegion::new(1, 0, 1, 3).unwrap().to_string(), "A1:D1");
    }

    #[test]
    fn overlapping_merges_are_found_only_on_validation() {
        let mut sheet = Sheet::new();
        sheet.declare_merge(MergeRegion::new(1, 0, 1, 3).unwrap());
        sheet.declare_merge(MergeRegion::new(2, 0, 2, 3).unwrap());
        assert!(sheet.validate_merges().is_empty());
        sheet.declare_merge(MergeRegion::new(1, 3, 1, 4).unwrap());
        let overlaps = sheet.validate_merges();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].0.to_string(), "A1:D1");
    }

    #[test]
    fn extent_covers_cells_and_merges() {
        let mut sheet = Sheet::new();
        assert_eq!(sheet.extent(), None);
        sheet.set_cell(CellRef::parse("C2").unwrap(), 1i64, CellStyle::Plain);
        sheet.declare_merge(MergeRegion::new(5, 0, 5, 1).unwrap());
        assert_eq!(sheet.extent(), Some(CellRef::parse("C5").unwrap()));
    }

    #[test]
    fn sheet_names_are_checked() {
        let mut wb = Workbook::new();
        wb.append_sheet(Sheet::new(), "Categories").unwrap();
        assert!(wb.append_sheet(Sheet::new(), "categories").is_err());
        assert!(wb.append_sheet(Sheet::new(), "").is_err());
        assert!(wb.append_sheet(Sheet::new(), "a/b").is_err());
        assert!(wb.append_sheet(Sheet::new(), &"x".repeat(32)).is_err());
        wb.append_sheet(Sheet::new(), "Headcount").unwrap();
        assert_eq!(wb.sheet_names(), vec!["Categories", "Headcount"]);
    }

    #[test]
    fn labeled_table_layout() {
        let mut sheet = Sheet::new();
        let total = line("Total", 4, 100, Some(3));
        let lines = vec![line("X", 3, 75, Some(2)), line("Y", 1, 25, None)];
        let next =
            write_labeled_table(&mut sheet, Cursor::new(3, 1), "By category", &total, &lines)
                .unwrap();

        assert_eq!(sheet.display("B3").as_deref(), Some("By category"));
        assert_eq!(sheet.display("C4").as_deref(), Some("Count"));
        assert_eq!(sheet.display("B5").as_deref(), Some("Total"));
        assert_eq!(sheet.display("C5").as_deref(), Some("4"));
        assert_eq!(sheet.display("D6").as_deref(), Some("75%"));
        assert_eq!(sheet.display("E6").as_deref(), Some("+2"));
        assert_eq!(sheet.value("E7"), None);
        assert_eq!(sheet.display("E5").as_deref(), Some("+3"));
        assert_eq!(sheet.merges(), &[MergeRegion::new(3, 1, 3, 4).unwrap()]);
        assert_eq!(next, Cursor::new(9, 1));
    }

    #[test]
    fn table_without_deltas_is_three_columns() {
        let mut sheet = Sheet::new();
        let total = line("Total", 1, 100, None);
        let lines = [line("A", 1, 100, None)];
        write_labeled_table(&mut sheet, Cursor::top(), "T", &total, &lines).unwrap();
        assert_eq!(sheet.value("D2"), None);
        assert_eq!(sheet.merges()[0].end_col, 2);
    }

    #[test]
    fn undefined_percent_renders_placeholder() {
        let mut sheet = Sheet::new();
        let total = CategoryLine {
            label: "Total".into(),
            count: 0,
            percent: Percent::Undefined,
            delta: None,
        };
        write_labeled_table(&mut sheet, Cursor::top(), "Empty", &total, &[]).unwrap();
        assert_eq!(sheet.display("C3").as_deref(), Some("0%"));
    }

    #[test]
    fn key_value_block_advances_cursor() {
        let mut sheet = Sheet::new();
        let entries = vec![
            ("Total time".to_string(), CellValue::Duration(Duration::from_minutes(135))),
            ("Interviews".to_string(), CellValue::Integer(3)),
        ];
        let next = write_key_value_block(&mut sheet, Cursor::top(), "Durations", &entries).unwrap();
        assert_eq!(sheet.display("A2").as_deref(), Some("Total time"));
        assert_eq!(sheet.display("B2").as_deref(), Some("2h15m"));
        assert_eq!(sheet.display("B3").as_deref(), Some("3"));
        assert_eq!(next, Cursor::new(5, 0));

        let after = write_key_value_block(&mut sheet, next, "Empty", &[]).unwrap();
        assert_eq!(after, Cursor::new(7, 0));
        assert!(sheet.validate_merges().is_empty());
    }

    #[test]
    fn cursor_moves_down_and_saturates() {
        assert_eq!(Cursor::top().down(4), Cursor::new(5, 0));
        assert_eq!(Cursor::new(u32::MAX - 1, 2).down(5), Cursor::new(u32::MAX, 2));
    }
}
