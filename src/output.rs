// Everything that leaves the process: the xlsx workbook, the JSON summary and
// the Markdown previews printed to the console.
use crate::error::{ReportError, Result};
use crate::metrics::{Percent, UNDEFINED_PERCENT};
use crate::sheet::{CellStyle, CellValue, MergeRegion, Sheet, Workbook};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook as XlsxWorkbook, Worksheet};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

/// Serializes an in-memory workbook into a concrete file format.
pub trait SpreadsheetSink {
    fn to_bytes(&self, workbook: &Workbook) -> Result<Vec<u8>>;

    fn save(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        let bytes = self.to_bytes(workbook)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct XlsxSink;

fn xlsx_err(e: impl std::fmt::Display) -> ReportError {
    ReportError::Xlsx(e.to_string())
}

fn col16(col: u32) -> Result<u16> {
    u16::try_from(col)
        .map_err(|_| ReportError::Xlsx(format!("column index {} exceeds the xlsx limit", col)))
}

fn cell_format(style: CellStyle, value: &CellValue) -> Format {
    let base = match style {
        CellStyle::Title => Format::new()
            .set_bold()
            .set_font_size(12)
            .set_align(FormatAlign::Center)
            .set_background_color(0x4472C4)
            .set_font_color(0xFFFFFF),
        CellStyle::Header => Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_background_color(0xD9E1F2)
            .set_border(FormatBorder::Thin),
        CellStyle::Label => Format::new().set_border(FormatBorder::Thin),
        CellStyle::Total => Format::new()
            .set_bold()
            .set_background_color(0xE2EFDA)
            .set_border(FormatBorder::Thin),
        CellStyle::Plain => Format::new().set_border(FormatBorder::Thin),
    };
    match value {
        CellValue::Integer(_) => base.set_num_format("#,##0"),
        CellValue::Number(_) => base.set_num_format("#,##0.00"),
        CellValue::Percent(Percent::Value(_)) => base.set_num_format("0%"),
        CellValue::Delta(_) => base.set_num_format("+#,##0;-#,##0;0"),
        CellValue::Percent(Percent::Undefined) | CellValue::Duration(_) => {
            base.set_align(FormatAlign::Right)
        }
        CellValue::Text(_) => base,
    }
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: &Format,
) -> Result<()> {
    // Sheet rows are 1-based, xlsx rows 0-based.
    let row = row
        .checked_sub(1)
        .ok_or_else(|| ReportError::Xlsx("row 0 is not addressable".into()))?;
    let written = match value {
        CellValue::Text(s) => ws.write_string_with_format(row, col, s.as_str(), format),
        CellValue::Number(n) => ws.write_number_with_format(row, col, *n, format),
        CellValue::Integer(n) | CellValue::Delta(n) => {
            ws.write_number_with_format(row, col, *n as f64, format)
        }
        CellValue::Percent(p) => match p.fraction() {
            Some(f) => ws.write_number_with_format(row, col, f, format),
            None => ws.write_string_with_format(row, col, UNDEFINED_PERCENT, format),
        },
        CellValue::Duration(d) => ws.write_string_with_format(row, col, d.to_string(), format),
    };
    written.map_err(xlsx_err)?;
    Ok(())
}

fn write_sheet(ws: &mut Worksheet, name: &str, sheet: &Sheet) -> Result<()> {
    ws.set_name(name).map_err(xlsx_err)?;
    for (col, width) in sheet.column_widths() {
        ws.set_column_width(col16(col)?, width).map_err(xlsx_err)?;
    }
    for (at, cell) in sheet.cells() {
        let format = cell_format(cell.style, &cell.value);
        write_cell(ws, at.row, col16(at.col)?, &cell.value, &format)?;
    }
    let mut merged: Vec<MergeRegion> = Vec::new();
    for region in sheet.merges() {
        if region.start_row == region.end_row && region.start_col == region.end_col {
            continue;
        }
        // xlsx rejects overlapping merges; the first declared region wins.
        if let Some(kept) = merged.iter().find(|m| m.overlaps(region)) {
            warn!(sheet = name, %region, %kept, "skipping overlapping merge region");
            continue;
        }
        let anchor = sheet.cell(region.anchor());
        let style = anchor.map(|c| c.style).unwrap_or_default();
        let empty = CellValue::Text(String::new());
        let value = anchor.map(|c| &c.value).unwrap_or(&empty);
        let format = cell_format(style, value);
        // Merge with an empty string, then put the typed anchor value back.
        ws.merge_range(
            region.start_row.saturating_sub(1),
            col16(region.start_col)?,
            region.end_row.saturating_sub(1),
            col16(region.end_col)?,
            "",
            &format,
        )
        .map_err(xlsx_err)?;
        write_cell(ws, region.start_row, col16(region.start_col)?, value, &format)?;
        merged.push(*region);
    }
    Ok(())
}

impl SpreadsheetSink for XlsxSink {
    fn to_bytes(&self, workbook: &Workbook) -> Result<Vec<u8>> {
        let mut xlsx = XlsxWorkbook::new();
        for (name, sheet) in workbook.sheets() {
            let ws = xlsx.add_worksheet();
            write_sheet(ws, name, sheet)?;
        }
        xlsx.save_to_buffer().map_err(xlsx_err)
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown preview of the first `max_rows` rows, or `(no rows)`.
pub fn preview_table<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}
