// A1-style cell addressing.
//
// Rows are 1-based as displayed in a spreadsheet, columns are 0-based
// indices (A = 0, Z = 25, AA = 26).
use crate::error::{ReportError, Result};
use std::fmt;
use std::str::FromStr;

/// Convert a column index to letters using bijective base 26 (no zero digit).
pub fn column_index_to_letters(index: u32) -> String {
    let mut letters = Vec::new();
    let mut n = index as i64;
    while n >= 0 {
        letters.push((b'A' + (n % 26) as u8) as char);
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`column_index_to_letters`]; letters are case-insensitive.
pub fn letters_to_column_index(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(ReportError::InvalidCellRef("empty column letters".into()));
    }
    let mut col: u64 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(ReportError::InvalidCellRef(format!(
                "invalid column letter '{}' in '{}'",
                c, letters
            )));
        }
        col = col * 26 + (c.to_ascii_uppercase() as u64 - 'A' as u64 + 1);
        if col - 1 > u32::MAX as u64 {
            return Err(ReportError::InvalidCellRef(format!(
                "column '{}' out of range",
                letters
            )));
        }
    }
    Ok((col - 1) as u32)
}

pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_index_to_letters(col), row)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    /// `row` is 1-based; a zero row is rejected.
    pub fn new(row: u32, col: u32) -> Result<Self> {
        if row == 0 {
            return Err(ReportError::InvalidCellRef(format!(
                "row must be >= 1 (column {})",
                column_index_to_letters(col)
            )));
        }
        Ok(Self { row, col })
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_alphabetic())
            .ok_or_else(|| ReportError::InvalidCellRef(format!("no row number in '{}'", s)))?;
        let (letters, digits) = s.split_at(split);
        let col = letters_to_column_index(letters)?;
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ReportError::InvalidCellRef(format!("invalid row number in '{}'", s)));
        }
        let row: u32 = digits
            .parse()
            .map_err(|_| ReportError::InvalidCellRef(format!("invalid row number in '{}'", s)))?;
        Self::new(row, col)
    }

    /// Shifted reference; clamps at the edge of the `u32` range.
    pub fn offset(self, rows: u32, cols: u32) -> Self {
        Self {
            row: self.row.saturating_add(rows),
            col: self.col.saturating_add(cols),
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_index_to_letters(self.col), self.row)
    }
}

impl FromStr for CellRef {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
