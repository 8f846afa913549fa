//! Cell model and the low-level parsers shared by ingestion and coercion.
//!
//! Spreadsheet readers hand back loosely typed cells; everything downstream works
//! on [`Cell`] so malformed input never leaks into aggregation untyped. The
//! parsers here are deliberately forgiving about separators and whitespace and
//! strict about what counts as a number or a date.

use std::{borrow::Cow, fmt, sync::OnceLock};

use anyhow::{Result, anyhow};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;

/// Excel serial day 0 from serial 61 on (the 1900 leap-year bug is absorbed by
/// starting on the 30th).
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
/// Serial 60 is the 29 February 1900 that never existed.
const EXCEL_PHANTOM_LEAP_DAY: f64 = 60.0;
/// Serial number of 9999-12-31, the last date Excel can represent.
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;
/// Years a spreadsheet date may carry.
pub const CALENDAR_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Spreadsheet error value such as `#DIV/0!`.
    Error(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Text(text) => Cow::Borrowed(text.trim()),
            Cell::Number(value) => Cow::Owned(format_number(*value)),
            Cell::Bool(value) => Cow::Owned(value.to_string()),
            Cell::DateTime(dt) => {
                if dt.num_seconds_from_midnight() == 0 {
                    Cow::Owned(dt.date().format("%Y-%m-%d").to_string())
                } else {
                    Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string())
                }
            }
            Cell::Error(token) => Cow::Borrowed(token.as_str()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Header key used for alias comparison: lower-case, alphanumerics only.
pub fn normalize_key(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn in_calendar_range(date: NaiveDate) -> bool {
    CALENDAR_YEARS.contains(&date.year())
}

/// Parses a text date, day-first when ambiguous.
///
/// `%Y` happily reads `24` as year 24, so a parse only counts when the year
/// lands in [`CALENDAR_YEARS`]; two-digit years then fall through to the `%y`
/// forms and expand to 19xx/20xx.
pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    // Day-first forms precede month-first so `05/01/2024` reads as 5 January.
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%d/%m/%y",
        "%d-%m-%y", "%d.%m.%y", "%y-%m-%d",
    ];
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    let trimmed = value.trim();
    let dates = DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok());
    let datetimes = DATETIME_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|parsed| parsed.date());
    dates
        .chain(datetimes)
        .find(|date| in_calendar_range(*date))
        .ok_or_else(|| anyhow!("Failed to parse '{trimmed}' as a date between 1900 and 9999"))
}

/// Converts an Excel serial day number (fractions are time of day).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(1.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    if serial.floor() == EXCEL_PHANTOM_LEAP_DAY {
        return None;
    }
    let (year, month, mut day) = EXCEL_EPOCH;
    if serial < EXCEL_PHANTOM_LEAP_DAY {
        day += 1;
    }
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// True for spreadsheet error values (`#DIV/0!`, `#N/A`, `#VALUE!`, ...).
pub fn is_error_sentinel(value: &str) -> bool {
    static SENTINEL: OnceLock<Regex> = OnceLock::new();
    SENTINEL
        .get_or_init(|| {
            Regex::new(r"(?i)^#(div/0|n/a|value|ref|name|num|null|spill|calc|getting_data)[!?]?$")
                .expect("sentinel pattern")
        })
        .is_match(value.trim())
}

/// Parses a number written with either decimal convention.
///
/// Accepts `1234`, `1,234.5`, `1.234,5`, `85,5` and a trailing `%`. A lone comma
/// followed by exactly three digits groups thousands (`1,234` is 1234).
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() || is_error_sentinel(trimmed) {
        return None;
    }
    let compact = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect::<String>();
    let canonical = canonical_decimal(&compact)?;
    let parsed: f64 = canonical.parse().ok()?;
    parsed.is_finite().then_some(parsed)
}

fn canonical_decimal(raw: &str) -> Option<String> {
    static COMMA_GROUPS: OnceLock<Regex> = OnceLock::new();
    static DOT_GROUPS: OnceLock<Regex> = OnceLock::new();
    let comma_groups = COMMA_GROUPS
        .get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+$").expect("comma group pattern"));
    let dot_groups = DOT_GROUPS
        .get_or_init(|| Regex::new(r"^[+-]?\d{1,3}(\.\d{3}){2,}$").expect("dot group pattern"));

    match (raw.rfind(','), raw.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => Some(raw.replace('.', "").replace(',', ".")),
        (Some(_), Some(_)) => Some(raw.replace(',', "")),
        (Some(_), None) if comma_groups.is_match(raw) => Some(raw.replace(',', "")),
        (Some(_), None) if raw.matches(',').count() == 1 => Some(raw.replace(',', ".")),
        (Some(_), None) => None,
        (None, Some(_)) if dot_groups.is_match(raw) => Some(raw.replace('.', "")),
        (None, _) => Some(raw.to_string()),
    }
}

/// Whole numbers render without a fraction; everything else keeps full precision.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
