//! I/O plumbing shared by ingestion and export.
//!
//! - **Input format detection**: extension-based (`.csv`/`.txt` → comma, `.tsv` →
//!   tab, spreadsheet extensions → workbook) with a manual delimiter override.
//! - **Encoding**: delimited input is decoded through `encoding_rs_io`, so a BOM
//!   is stripped and non-UTF-8 labels are transcoded before the CSV parser runs.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Output**: exports are always UTF-8.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::error::IngestError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];
const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Delimited(u8),
    Workbook,
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, IngestError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| IngestError::Encoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn detect_format(path: &Path, delimiter: Option<u8>) -> Result<InputFormat, IngestError> {
    if is_dash(path) {
        return Ok(InputFormat::Delimited(
            delimiter.unwrap_or(DEFAULT_CSV_DELIMITER),
        ));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => Ok(InputFormat::Workbook),
        Some(ext) if DELIMITED_EXTENSIONS.contains(&ext) => Ok(InputFormat::Delimited(
            resolve_input_delimiter(path, delimiter),
        )),
        None => Ok(InputFormat::Delimited(
            delimiter.unwrap_or(DEFAULT_CSV_DELIMITER),
        )),
        Some(other) => Err(IngestError::UnsupportedFormat(other.to_string())),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>, IngestError> {
    if is_dash(path) {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Wraps `reader` so the CSV parser always sees UTF-8 without a BOM.
pub fn open_csv_reader<R>(
    reader: R,
    delimiter: u8,
    encoding: &'static Encoding,
) -> csv::Reader<impl Read>
where
    R: Read,
{
    let decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .utf8_passthru(true)
        .strip_bom(true)
        .build(reader);
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(decoded)
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(csv_writer_builder(delimiter).from_writer(writer))
}

pub fn csv_writer_builder(delimiter: u8) -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
