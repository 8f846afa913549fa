use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{data::parse_naive_date, variant::DEFAULT_VARIANT};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Resolve, filter and summarize delivery and sales spreadsheets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show which upload columns map to which canonical fields
    Resolve(ResolveArgs),
    /// Compute the KPI panel and every view of a dashboard variant
    Report(ReportArgs),
    /// Show the first rows of the filtered canonical table
    Preview(PreviewArgs),
    /// Write the filtered canonical table to CSV or XLSX
    Export(ExportArgs),
    /// Print or save a built-in variant profile as YAML
    Variant(VariantArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input spreadsheet (.csv, .tsv, .xlsx, .xls, .ods; `-` for CSV on stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Worksheet to read from a workbook (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Built-in dashboard variant (neon, delivery, sales, supply)
    #[arg(long, default_value = DEFAULT_VARIANT, conflicts_with = "profile")]
    pub variant: String,
    /// YAML variant profile to use instead of a built-in
    #[arg(long)]
    pub profile: Option<PathBuf>,
}

#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// First day of the date range (inclusive)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Last day of the date range (inclusive)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Restrict to a single day
    #[arg(long, value_parser = parse_date, conflicts_with_all = ["from", "to"])]
    pub day: Option<NaiveDate>,
    /// Restrict to a calendar year
    #[arg(long)]
    pub year: Option<i32>,
    /// Restrict to a month (1-12) of --year
    #[arg(long, requires = "year", value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,
    /// Categorical filters such as `area=North,South` (repeatable)
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
    /// Entries to keep in top-N views
    #[arg(long)]
    pub top: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Number of rows to display
    #[arg(long, default_value_t = 30)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Destination file; the extension picks CSV or XLSX (`-` for CSV on stdout)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct VariantArgs {
    /// Built-in variant to dump
    #[arg(long, default_value = DEFAULT_VARIANT)]
    pub name: String,
    /// Write the YAML here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// List the built-in variants and exit
    #[arg(long)]
    pub list: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value).map_err(|err| err.to_string())
}
