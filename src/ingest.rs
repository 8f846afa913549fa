//! Ingestion boundary: turns a delimited file or workbook into a [`RawTable`].
//!
//! The first row is always the header row. Delimited cells arrive as text and are
//! typed later during coercion; workbook cells keep the type the spreadsheet
//! stored. Anything that cannot be read as rows of cells fails with an
//! [`IngestError`].

use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, open_workbook_auto};
use log::{debug, info};

use crate::{
    data::{Cell, excel_serial_to_datetime, format_number},
    error::IngestError,
    io_utils::{self, InputFormat},
};

static EMPTY_CELL: Cell = Cell::Empty;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
    /// Worksheet to read from a workbook; the first sheet when absent.
    pub sheet: Option<String>,
}

/// One uploaded row, cells in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    line: usize,
    cells: Vec<Cell>,
}

impl RawRecord {
    pub fn new(line: usize, cells: Vec<Cell>) -> Self {
        Self { line, cells }
    }

    /// 1-based line in the source, counting the header as line 1.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    source: String,
    headers: Vec<String>,
    records: Vec<RawRecord>,
}

impl RawTable {
    /// Builds a table from already-read rows; each row is padded or cut to the
    /// header width.
    pub fn from_rows<I, R>(source: impl Into<String>, headers: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Cell>,
    {
        let width = headers.len();
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let mut cells = row.into_iter().take(width).collect::<Vec<_>>();
                cells.resize(width, Cell::Empty);
                RawRecord::new(idx + 2, cells)
            })
            .collect();
        Self {
            source: source.into(),
            headers,
            records,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() || self.records.is_empty()
    }
}

pub fn read_table(path: &Path, options: &IngestOptions) -> Result<RawTable, IngestError> {
    match io_utils::detect_format(path, options.delimiter)? {
        InputFormat::Delimited(delimiter) => read_delimited(path, delimiter, options),
        InputFormat::Workbook => read_workbook(path, options.sheet.as_deref()),
    }
}

fn read_delimited(
    path: &Path,
    delimiter: u8,
    options: &IngestOptions,
) -> Result<RawTable, IngestError> {
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    info!(
        "Reading {:?} as delimited text (delimiter '{}', encoding {})",
        path,
        io_utils::printable_delimiter(delimiter),
        encoding.name()
    );
    let input = io_utils::open_input(path)?;
    let mut reader = io_utils::open_csv_reader(input, delimiter, encoding);
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() > headers.len() {
            debug!(
                "Dropping {} trailing cell(s) beyond the header on line {}",
                record.len() - headers.len(),
                record.position().map(|p| p.line()).unwrap_or_default()
            );
        }
        rows.push(record.iter().map(Cell::from).collect::<Vec<_>>());
    }
    let table = RawTable::from_rows(path.display().to_string(), headers, rows);
    debug!(
        "Read {} row(s) across {} column(s)",
        table.row_count(),
        table.headers().len()
    );
    Ok(table)
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawTable, IngestError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(requested) => sheet_names
            .iter()
            .find(|name| name.as_str() == requested)
            .cloned()
            .ok_or_else(|| IngestError::MissingSheet {
                sheet: requested.to_string(),
                available: sheet_names.join(", "),
            })?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| IngestError::NoWorksheets {
                path: PathBuf::from(path),
            })?,
    };
    info!("Reading worksheet '{sheet_name}' from {path:?}");
    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(table_from_range(
        format!("{}#{sheet_name}", path.display()),
        &range,
    ))
}

fn table_from_range(source: String, range: &Range<Data>) -> RawTable {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| cell_from_data(cell).as_display().into_owned())
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };
    let body = rows
        .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    RawTable::from_rows(source, headers, body)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(text) => Cell::from(text.as_str()),
        Data::Float(value) => Cell::Number(*value),
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(parsed) => Cell::DateTime(parsed),
            None => Cell::Text(format_number(dt.as_f64())),
        },
        Data::DateTimeIso(text) | Data::DurationIso(text) => Cell::Text(text.clone()),
        Data::Error(err) => Cell::Error(err.to_string()),
    }
}
