//! Coercion from raw cells to the canonical table.
//!
//! Every resolved column is converted once, up front, according to its field
//! kind and the variant's [`CoercionPolicy`]:
//!
//! | kind        | valid input                    | empty   | unparsable        |
//! |-------------|--------------------------------|---------|-------------------|
//! | date        | date cells, text dates, serial | missing | missing + warning |
//! | numeric     | numbers, formatted text        | missing | policy + warning  |
//! | percentage  | `85`, `85%`, `85,5 %`          | 0       | policy + warning  |
//! | categorical | any non-blank cell             | missing | n/a               |
//!
//! Dates outside 1900..=9999 are unparsable. Spreadsheet error sentinels in a
//! percentage column are 0 and are not counted as warnings.
//!
//! Percent-formatted workbook cells arrive as fractions (`0.85`). When every
//! numeric cell of a percentage column lies in [0, 1] the column is read as
//! fractions and scaled onto 0-100, so it lands on the same scale as `85%`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    alias::{CanonicalField, FieldKind},
    data::{
        Cell, excel_serial_to_datetime, format_number, in_calendar_range, is_error_sentinel,
        parse_naive_date, parse_number,
    },
    error::Warning,
    ingest::{RawRecord, RawTable},
    resolver::ResolvedSchema,
};

/// What an invalid numeric cell becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Stored as 0: counts toward sums and means.
    Zero,
    /// Stored as missing: adds nothing to sums, skipped by means.
    Null,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoercionPolicy {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    overrides: BTreeMap<CanonicalField, MissingPolicy>,
    /// Treat numbers in [-1, 1] in a percentage column as fractions of 100.
    #[serde(default)]
    pub fractional_percent: bool,
}

impl CoercionPolicy {
    pub fn missing(&self, field: CanonicalField) -> MissingPolicy {
        self.overrides
            .get(&field)
            .copied()
            .unwrap_or_else(|| default_missing_policy(field))
    }

    pub fn with_missing(mut self, field: CanonicalField, policy: MissingPolicy) -> Self {
        self.overrides.insert(field, policy);
        self
    }

    pub fn with_fractional_percent(mut self, enabled: bool) -> Self {
        self.fractional_percent = enabled;
        self
    }
}

fn default_missing_policy(field: CanonicalField) -> MissingPolicy {
    match field {
        CanonicalField::Quantity | CanonicalField::AchievementPct => MissingPolicy::Zero,
        _ => MissingPolicy::Null,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_display(&self) -> String {
        match self {
            FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            FieldValue::Number(value) => format_number(*value),
            FieldValue::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    line: usize,
    values: [Option<FieldValue>; CanonicalField::COUNT],
}

impl CanonicalRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            values: std::array::from_fn(|_| None),
        }
    }

    pub fn with(mut self, field: CanonicalField, value: FieldValue) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn set(&mut self, field: CanonicalField, value: Option<FieldValue>) {
        self.values[field.index()] = value;
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.values[field.index()].as_ref()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self.get(CanonicalField::Date) {
            Some(FieldValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    pub fn number(&self, field: CanonicalField) -> Option<f64> {
        match self.get(field) {
            Some(FieldValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        match self.get(field) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Display form used for grouping, filtering and export.
    pub fn key(&self, field: CanonicalField) -> Option<String> {
        self.get(field).map(FieldValue::as_display)
    }
}

/// Per-field count of cells that failed conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoercionReport {
    invalid: BTreeMap<CanonicalField, usize>,
}

impl CoercionReport {
    fn record(&mut self, field: CanonicalField) {
        *self.invalid.entry(field).or_insert(0) += 1;
    }

    pub fn invalid(&self, field: CanonicalField) -> usize {
        self.invalid.get(&field).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.invalid.values().sum()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.invalid
            .iter()
            .map(|(field, rows)| Warning::Coercion {
                field: *field,
                rows: *rows,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalTable {
    fields: Vec<CanonicalField>,
    rows: Vec<CanonicalRow>,
    report: CoercionReport,
}

impl CanonicalTable {
    pub fn build(raw: &RawTable, schema: &ResolvedSchema, policy: &CoercionPolicy) -> Self {
        let fields = schema.fields().collect::<Vec<_>>();
        let mut report = CoercionReport::default();
        let mut rows = Vec::with_capacity(raw.row_count());
        let mut skipped = 0usize;

        let fractional = schema
            .columns()
            .filter(|column| column.field.kind() == FieldKind::Percentage)
            .filter(|column| policy.fractional_percent || holds_fractions(raw, column.index))
            .map(|column| {
                debug!("Reading '{}' as fractional percentages", column.header);
                column.field
            })
            .collect::<Vec<_>>();

        for record in raw.records() {
            if record.is_blank() {
                skipped += 1;
                continue;
            }
            rows.push(coerce_record(record, schema, policy, &fractional, &mut report));
        }
        if skipped > 0 {
            debug!("Skipped {skipped} blank row(s)");
        }
        for warning in report.warnings() {
            warn!("{warning}");
        }
        Self {
            fields,
            rows,
            report,
        }
    }

    /// Assembles a table from rows that are already typed.
    pub fn from_rows(fields: Vec<CanonicalField>, rows: Vec<CanonicalRow>) -> Self {
        let mut fields = fields;
        fields.sort();
        fields.dedup();
        Self {
            fields,
            rows,
            report: CoercionReport::default(),
        }
    }

    pub fn fields(&self) -> &[CanonicalField] {
        &self.fields
    }

    pub fn has_field(&self, field: CanonicalField) -> bool {
        self.fields.contains(&field)
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn report(&self) -> &CoercionReport {
        &self.report
    }

    pub fn rows_with_date(&self) -> usize {
        self.rows.iter().filter(|row| row.date().is_some()).count()
    }
}

/// True when the column has numeric cells and all of them lie in [0, 1].
fn holds_fractions(raw: &RawTable, index: usize) -> bool {
    let mut numbers = raw
        .records()
        .iter()
        .filter_map(|record| match record.get(index) {
            Cell::Number(value) => Some(*value),
            _ => None,
        })
        .peekable();
    numbers.peek().is_some() && numbers.all(|value| (0.0..=1.0).contains(&value))
}

fn coerce_record(
    record: &RawRecord,
    schema: &ResolvedSchema,
    policy: &CoercionPolicy,
    fractional: &[CanonicalField],
    report: &mut CoercionReport,
) -> CanonicalRow {
    let mut row = CanonicalRow::new(record.line());
    for column in schema.columns() {
        let cell = record.get(column.index);
        let field = column.field;
        let value = match field.kind() {
            FieldKind::Date => match coerce_date(cell) {
                Coerced::Value(date) => Some(FieldValue::Date(date)),
                Coerced::Empty => None,
                Coerced::Invalid => {
                    report.record(field);
                    None
                }
            },
            FieldKind::Numeric => match coerce_number(cell) {
                Coerced::Value(value) => Some(FieldValue::Number(value)),
                Coerced::Empty => None,
                Coerced::Invalid => {
                    report.record(field);
                    apply_policy(policy.missing(field))
                }
            },
            FieldKind::Percentage => match coerce_percentage(cell, fractional.contains(&field)) {
                Coerced::Value(value) => Some(FieldValue::Number(value)),
                Coerced::Empty => Some(FieldValue::Number(0.0)),
                Coerced::Invalid => {
                    report.record(field);
                    apply_policy(policy.missing(field))
                }
            },
            FieldKind::Categorical => coerce_text(cell).map(FieldValue::Text),
        };
        row.set(field, value);
    }
    row
}

fn apply_policy(policy: MissingPolicy) -> Option<FieldValue> {
    match policy {
        MissingPolicy::Zero => Some(FieldValue::Number(0.0)),
        MissingPolicy::Null => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced<T> {
    Value(T),
    Empty,
    Invalid,
}

/// Smallest serial accepted from a text cell (1901-01-01); below it `"7"` or
/// `"2024"` are far more likely typos than dates.
const MIN_TEXT_SERIAL: f64 = 367.0;

pub fn coerce_date(cell: &Cell) -> Coerced<NaiveDate> {
    let date = match cell {
        Cell::Empty => return Coerced::Empty,
        Cell::Text(text) if text.trim().is_empty() => return Coerced::Empty,
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Number(serial) => excel_serial_to_datetime(*serial).map(|dt| dt.date()),
        Cell::Text(text) => parse_naive_date(text).ok().or_else(|| {
            text.trim()
                .parse::<f64>()
                .ok()
                .filter(|serial| *serial >= MIN_TEXT_SERIAL)
                .and_then(excel_serial_to_datetime)
                .map(|dt| dt.date())
        }),
        Cell::Bool(_) | Cell::Error(_) => None,
    };
    match date {
        Some(date) if in_calendar_range(date) => Coerced::Value(date),
        _ => Coerced::Invalid,
    }
}

pub fn coerce_number(cell: &Cell) -> Coerced<f64> {
    match cell {
        Cell::Empty => Coerced::Empty,
        Cell::Number(value) if value.is_finite() => Coerced::Value(*value),
        Cell::Text(text) if text.trim().is_empty() => Coerced::Empty,
        Cell::Text(text) => match parse_number(text) {
            Some(value) => Coerced::Value(value),
            None => Coerced::Invalid,
        },
        Cell::Number(_) | Cell::Bool(_) | Cell::DateTime(_) | Cell::Error(_) => Coerced::Invalid,
    }
}

/// Normalizes a percentage cell onto the 0-100 scale.
pub fn coerce_percentage(cell: &Cell, fractional: bool) -> Coerced<f64> {
    let scale = |value: f64| {
        if fractional && (-1.0..=1.0).contains(&value) {
            value * 100.0
        } else {
            value
        }
    };
    match cell {
        Cell::Error(_) => Coerced::Value(0.0),
        Cell::Text(text) if is_error_sentinel(text) => Coerced::Value(0.0),
        Cell::Text(text) if text.trim().ends_with('%') => coerce_number(cell),
        Cell::Text(_) | Cell::Number(_) => match coerce_number(cell) {
            Coerced::Value(value) => Coerced::Value(scale(value)),
            other => other,
        },
        other => coerce_number(other),
    }
}

pub fn coerce_text(cell: &Cell) -> Option<String> {
    let display = cell.as_display();
    let trimmed = display.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alias::AliasTable, resolver::resolve_columns};

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::from_rows(
            "inline",
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| Cell::from(*cell)).collect::<Vec<_>>()),
        )
    }

    #[test]
    fn percentage_normalization_is_scale_stable() {
        let text = |v: &str| Cell::Text(v.to_string());
        assert_eq!(coerce_percentage(&text("85%"), false), Coerced::Value(85.0));
        assert_eq!(coerce_percentage(&text("85"), false), Coerced::Value(85.0));
        assert_eq!(coerce_percentage(&text("85,5 %"), false), Coerced::Value(85.5));
        assert_eq!(coerce_percentage(&text("#DIV/0!"), false), Coerced::Value(0.0));
        assert_eq!(
            coerce_percentage(&Cell::Error("#DIV/0!".into()), false),
            Coerced::Value(0.0)
        );
        assert_eq!(coerce_percentage(&Cell::Empty, false), Coerced::Empty);
        assert_eq!(coerce_percentage(&text("n/a yet"), false), Coerced::Invalid);
    }

    #[test]
    fn fractional_percentages_scale_only_bare_numbers() {
        assert_eq!(coerce_percentage(&Cell::Number(0.85), true), Coerced::Value(85.0));
        assert_eq!(coerce_percentage(&Cell::Number(85.0), true), Coerced::Value(85.0));
        assert_eq!(
            coerce_percentage(&Cell::Text("1%".into()), true),
            Coerced::Value(1.0)
        );
    }

    #[test]
    fn build_applies_field_policies() {
        let table = raw(
            &["Tanggal", "Qty", "Jarak", "Achievement %", "Area"],
            &[
                &["2024-01-05", "100", "12,5", "85%", "North"],
                &["junk", "bad", "far", "#DIV/0!", ""],
                &["", "", "", "", "  "],
            ],
        );
        let schema = resolve_columns(table.headers(), &AliasTable::standard());
        let canonical = CanonicalTable::build(&table, &schema, &CoercionPolicy::default());

        // The fully blank row is dropped.
        assert_eq!(canonical.row_count(), 2);
        let first = &canonical.rows()[0];
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(first.number(CanonicalField::Distance), Some(12.5));
        assert_eq!(first.number(CanonicalField::AchievementPct), Some(85.0));
        assert_eq!(first.text(CanonicalField::Area), Some("North"));

        let second = &canonical.rows()[1];
        assert_eq!(second.line(), 3);
        assert_eq!(second.date(), None);
        assert_eq!(second.number(CanonicalField::Quantity), Some(0.0));
        assert_eq!(second.number(CanonicalField::Distance), None);
        assert_eq!(second.number(CanonicalField::AchievementPct), Some(0.0));
        assert_eq!(second.text(CanonicalField::Area), None);

        let report = canonical.report();
        assert_eq!(report.invalid(CanonicalField::Date), 1);
        assert_eq!(report.invalid(CanonicalField::Quantity), 1);
        assert_eq!(report.invalid(CanonicalField::Distance), 1);
        assert_eq!(report.invalid(CanonicalField::AchievementPct), 0);
        assert_eq!(canonical.rows_with_date(), 1);
    }

    #[test]
    fn null_policy_keeps_invalid_quantity_missing() {
        let table = raw(&["Qty"], &[&["oops"]]);
        let schema = resolve_columns(table.headers(), &AliasTable::standard());
        let policy =
            CoercionPolicy::default().with_missing(CanonicalField::Quantity, MissingPolicy::Null);
        let canonical = CanonicalTable::build(&table, &schema, &policy);
        assert_eq!(canonical.rows()[0].number(CanonicalField::Quantity), None);
    }

    #[test]
    fn fractional_policy_reaches_percentage_columns() {
        let table = RawTable::from_rows(
            "inline",
            vec!["Achievement".to_string()],
            vec![vec![Cell::Number(0.9)], vec![Cell::Text("90%".into())]],
        );
        let schema = resolve_columns(table.headers(), &AliasTable::standard());
        let policy = CoercionPolicy::default().with_fractional_percent(true);
        let canonical = CanonicalTable::build(&table, &schema, &policy);
        let values = canonical
            .rows()
            .iter()
            .map(|row| row.number(CanonicalField::AchievementPct))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![Some(90.0), Some(90.0)]);
    }

    #[test]
    fn fraction_columns_from_workbooks_share_the_text_scale() {
        let table = RawTable::from_rows(
            "inline",
            vec!["Achievement %".to_string(), "Qty".to_string()],
            vec![
                vec![Cell::Number(0.85), Cell::Number(0.5)],
                vec![Cell::Text("85%".into()), Cell::Number(1.0)],
                vec![Cell::Number(1.0), Cell::Number(0.25)],
            ],
        );
        let schema = resolve_columns(table.headers(), &AliasTable::standard());
        let canonical = CanonicalTable::build(&table, &schema, &CoercionPolicy::default());
        let column = |field| {
            canonical
                .rows()
                .iter()
                .map(|row| row.number(field))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            column(CanonicalField::AchievementPct),
            vec![Some(85.0), Some(85.0), Some(100.0)]
        );
        // Only percentage columns are rescaled.
        assert_eq!(
            column(CanonicalField::Quantity),
            vec![Some(0.5), Some(1.0), Some(0.25)]
        );
    }

    #[test]
    fn whole_number_percent_columns_are_left_alone() {
        let table = RawTable::from_rows(
            "inline",
            vec!["Achievement %".to_string()],
            vec![vec![Cell::Number(0.5)], vec![Cell::Number(92.0)]],
        );
        let schema = resolve_columns(table.headers(), &AliasTable::standard());
        let canonical = CanonicalTable::build(&table, &schema, &CoercionPolicy::default());
        let values = canonical
            .rows()
            .iter()
            .map(|row| row.number(CanonicalField::AchievementPct))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![Some(0.5), Some(92.0)]);
    }

    #[test]
    fn dates_outside_the_spreadsheet_calendar_are_invalid() {
        let text = |v: &str| Cell::Text(v.to_string());
        assert_eq!(
            coerce_date(&text("05/01/24")),
            Coerced::Value(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert_eq!(coerce_date(&text("0024-01-05")), Coerced::Invalid);
        let ancient = NaiveDate::from_ymd_opt(24, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(coerce_date(&Cell::DateTime(ancient)), Coerced::Invalid);
    }

    #[test]
    fn small_integers_in_text_are_not_serials() {
        let text = |v: &str| Cell::Text(v.to_string());
        assert_eq!(coerce_date(&text("7")), Coerced::Invalid);
        assert_eq!(coerce_date(&text("2024")), Coerced::Invalid);
        assert_eq!(
            coerce_date(&text("45296")),
            Coerced::Value(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert_eq!(
            coerce_date(&Cell::Number(7.0)),
            Coerced::Value(NaiveDate::from_ymd_opt(1900, 1, 7).unwrap())
        );
    }

    #[test]
    fn categorical_numbers_render_without_fraction() {
        assert_eq!(coerce_text(&Cell::Number(12345.0)), Some("12345".to_string()));
        assert_eq!(
            coerce_text(&Cell::Text("  B 1234 XY ".into())),
            Some("B 1234 XY".to_string())
        );
        assert_eq!(coerce_text(&Cell::Empty), None);
    }
}
