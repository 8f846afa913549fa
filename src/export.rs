//! Writes the filtered canonical table to CSV or XLSX.
//!
//! Columns are the resolved canonical fields in canonical order, headed by
//! their snake_case names. Missing values become empty cells in both formats.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet, XlsxError};

use crate::{canonical::FieldValue, filter::FilteredTable, io_utils};

pub const XLSX_SHEET_NAME: &str = "data";
const XLSX_DATE_FORMAT: &str = "yyyy-mm-dd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// `-` writes CSV to stdout.
    pub fn from_path(path: &Path) -> Result<Self> {
        if io_utils::is_dash(path) {
            return Ok(ExportFormat::Csv);
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(anyhow!(
                "Cannot export to '{other}' files (expected .csv or .xlsx): {path:?}"
            )),
        }
    }
}

pub fn export(filtered: &FilteredTable<'_>, path: &Path) -> Result<()> {
    match ExportFormat::from_path(path)? {
        ExportFormat::Csv => export_csv(filtered, path),
        ExportFormat::Xlsx => export_xlsx(filtered, path),
    }
}

pub fn export_csv(filtered: &FilteredTable<'_>, path: &Path) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), io_utils::DEFAULT_CSV_DELIMITER)?;
    write_rows(filtered, &mut writer).with_context(|| format!("Writing CSV export {path:?}"))?;
    info!("Exported {} row(s) to {path:?}", filtered.len());
    Ok(())
}

pub fn write_csv<W: Write>(filtered: &FilteredTable<'_>, writer: W) -> Result<()> {
    let mut writer =
        io_utils::csv_writer_builder(io_utils::DEFAULT_CSV_DELIMITER).from_writer(writer);
    write_rows(filtered, &mut writer)
}

fn write_rows<W: Write>(filtered: &FilteredTable<'_>, writer: &mut csv::Writer<W>) -> Result<()> {
    let fields = filtered.fields();
    writer.write_record(fields.iter().map(|field| field.as_str()))?;
    for row in filtered.rows() {
        writer.write_record(
            fields
                .iter()
                .map(|field| row.key(*field).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_xlsx(filtered: &FilteredTable<'_>, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(filtered)?;
    workbook
        .save(path)
        .with_context(|| format!("Writing workbook to {path:?}"))?;
    info!("Exported {} row(s) to {path:?}", filtered.len());
    Ok(())
}

pub fn xlsx_to_buffer(filtered: &FilteredTable<'_>) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(filtered)?;
    workbook
        .save_to_buffer()
        .map_err(|e| anyhow!("Serializing workbook: {e}"))
}

fn build_workbook(filtered: &FilteredTable<'_>) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(XLSX_SHEET_NAME)
        .map_err(|e| anyhow!("Naming worksheet '{XLSX_SHEET_NAME}': {e}"))?;
    let date_format = Format::new().set_num_format(XLSX_DATE_FORMAT);

    let fields = filtered.fields();
    for (col, field) in fields.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, field.as_str())
            .map_err(|e| cell_error(0, col, e))?;
    }
    for (idx, row) in filtered.rows().iter().enumerate() {
        let row_index = idx + 1;
        for (col, field) in fields.iter().enumerate() {
            if let Some(value) = row.get(*field) {
                write_value(worksheet, row_index, col, value, &date_format)?;
            }
        }
    }
    Ok(workbook)
}

fn write_value(
    worksheet: &mut Worksheet,
    row: usize,
    col: usize,
    value: &FieldValue,
    date_format: &Format,
) -> Result<()> {
    let (r, c) = (row as u32, col as u16);
    match value {
        FieldValue::Date(date) => match excel_date(*date) {
            Some(dt) => {
                worksheet
                    .write_datetime_with_format(r, c, &dt, date_format)
                    .map_err(|e| cell_error(row, col, e))?;
            }
            None => {
                debug!(
                    "Date {date} in cell {}{} written as text",
                    column_letters(col),
                    row + 1
                );
                worksheet
                    .write_string(r, c, value.as_display())
                    .map_err(|e| cell_error(row, col, e))?;
            }
        },
        FieldValue::Number(number) => {
            worksheet
                .write_number(r, c, *number)
                .map_err(|e| cell_error(row, col, e))?;
        }
        FieldValue::Text(text) => {
            worksheet
                .write_string(r, c, text)
                .map_err(|e| cell_error(row, col, e))?;
        }
    }
    Ok(())
}

/// `None` for dates Excel cannot hold.
fn excel_date(date: NaiveDate) -> Option<ExcelDateTime> {
    let year = u16::try_from(date.year()).ok()?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8).ok()
}

fn cell_error(row: usize, col: usize, err: XlsxError) -> anyhow::Error {
    anyhow!(
        "Writing cell {}{} on '{XLSX_SHEET_NAME}': {err}",
        column_letters(col),
        row + 1
    )
}

fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().map(|b| *b as char).collect()
}
