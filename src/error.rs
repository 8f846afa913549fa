use std::{fmt, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::alias::CanonicalField;

/// The upload could not be read as a table at all.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Opening input {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown encoding '{0}'")]
    Encoding(String),
    #[error("Reading delimited rows: {0}")]
    Delimited(#[from] csv::Error),
    #[error("Reading workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("Workbook {path:?} has no worksheets")]
    NoWorksheets { path: PathBuf },
    #[error("Worksheet '{sheet}' not found (available: {available})")]
    MissingSheet { sheet: String, available: String },
    #[error("Unsupported input format '{0}' (expected csv, tsv, txt, xlsx, xlsm, xlsb, xls, or ods)")]
    UnsupportedFormat(String),
}

/// Required canonical roles that no header resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("missing required column role(s): {}", join_fields(.missing))]
pub struct SchemaError {
    pub missing: Vec<CanonicalField>,
    /// Views that cannot be computed because of the missing roles.
    pub disabled_views: Vec<String>,
}

impl SchemaError {
    pub fn new(missing: Vec<CanonicalField>) -> Self {
        Self {
            missing,
            disabled_views: Vec::new(),
        }
    }

    pub fn with_disabled_views(mut self, views: Vec<String>) -> Self {
        self.disabled_views = views;
        self
    }

    pub fn is_missing(&self, field: CanonicalField) -> bool {
        self.missing.contains(&field)
    }
}

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Non-fatal conditions that degrade individual views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Cells of `field` that could not be converted to its type.
    Coercion { field: CanonicalField, rows: usize },
    /// No rows survived filtering.
    EmptyResult,
    /// A filter targets a field the upload does not have.
    FilterIgnored { field: CanonicalField },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Coercion { field, rows } => {
                write!(f, "{rows} value(s) in '{field}' could not be converted")
            }
            Warning::EmptyResult => f.write_str("no rows match the active filters"),
            Warning::FilterIgnored { field } => {
                write!(f, "filter on '{field}' ignored: column not found in upload")
            }
        }
    }
}
