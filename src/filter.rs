use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow, ensure};
use chrono::{Datelike, NaiveDate};
use log::warn;

use crate::{
    alias::CanonicalField,
    canonical::{CanonicalRow, CanonicalTable},
    error::Warning,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    #[default]
    All,
    /// Inclusive on both ends.
    Range { start: NaiveDate, end: NaiveDate },
    Day(NaiveDate),
}

impl DateFilter {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        ensure!(
            start <= end,
            "Date range start {start} is after its end {end}"
        );
        Ok(DateFilter::Range { start, end })
    }

    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            DateFilter::All => None,
            DateFilter::Range { start, end } => Some((*start, *end)),
            DateFilter::Day(day) => Some((*day, *day)),
        }
    }

    pub fn is_bounded(&self) -> bool {
        !matches!(self, DateFilter::All)
    }

    fn matches(&self, date: Option<NaiveDate>) -> bool {
        match (self.bounds(), date) {
            (None, _) => true,
            (Some((start, end)), Some(date)) => start <= date && date <= end,
            (Some(_), None) => false,
        }
    }
}

/// Calendar period selector: a whole year or one month of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub year: i32,
    pub month: Option<u32>,
}

impl Period {
    pub fn new(year: i32, month: Option<u32>) -> Result<Self> {
        if let Some(month) = month {
            ensure!((1..=12).contains(&month), "Month must be 1-12, got {month}");
        }
        Ok(Self { year, month })
    }

    fn matches(&self, date: Option<NaiveDate>) -> bool {
        date.is_some_and(|date| {
            date.year() == self.year && self.month.is_none_or(|month| date.month() == month)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Constraint {
    #[default]
    All,
    AnyOf(BTreeSet<String>),
}

impl Constraint {
    /// Builds a membership constraint; no values, or the token `all`, means no constraint.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = BTreeSet::new();
        for value in values {
            let trimmed = value.as_ref().trim();
            if trimmed.eq_ignore_ascii_case("all") {
                return Constraint::All;
            }
            if !trimmed.is_empty() {
                allowed.insert(trimmed.to_string());
            }
        }
        if allowed.is_empty() {
            Constraint::All
        } else {
            Constraint::AnyOf(allowed)
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Constraint::AnyOf(_))
    }

    pub fn allows(&self, value: Option<&str>) -> bool {
        match self {
            Constraint::All => true,
            Constraint::AnyOf(allowed) => value.is_some_and(|v| allowed.contains(v.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    pub dates: DateFilter,
    pub period: Option<Period>,
    categories: BTreeMap<CanonicalField, Constraint>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dates(mut self, dates: DateFilter) -> Self {
        self.dates = dates;
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_constraint(mut self, field: CanonicalField, constraint: Constraint) -> Self {
        self.categories.insert(field, constraint);
        self
    }

    pub fn constraint(&self, field: CanonicalField) -> Option<&Constraint> {
        self.categories.get(&field)
    }

    pub fn active_constraints(&self) -> impl Iterator<Item = (CanonicalField, &Constraint)> {
        self.categories
            .iter()
            .filter(|(_, constraint)| constraint.is_active())
            .map(|(field, constraint)| (*field, constraint))
    }

    pub fn has_active_constraints(&self) -> bool {
        self.active_constraints().next().is_some()
    }

    /// Same criteria with every categorical constraint dropped.
    pub fn dates_only(&self) -> Self {
        Self {
            dates: self.dates,
            period: self.period,
            categories: BTreeMap::new(),
        }
    }
}

pub fn parse_constraints(filters: &[String]) -> Result<Vec<(CanonicalField, Constraint)>> {
    filters.iter().map(|f| parse_constraint(f)).collect()
}

/// Parses `field=value[,value...]` (for example `area=North,South`).
pub fn parse_constraint(filter: &str) -> Result<(CanonicalField, Constraint)> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }
    let (left, right) = trimmed.split_once('=').ok_or_else(|| {
        anyhow!("Failed to parse filter expression '{trimmed}' (expected field=value)")
    })?;
    let field = left.trim().parse::<CanonicalField>()?;
    let values = right
        .split(',')
        .map(|value| unquote(value.trim()))
        .collect::<Vec<_>>();
    Ok((field, Constraint::from_values(values)))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Rows of a [`CanonicalTable`] that pass a [`FilterCriteria`].
#[derive(Debug, Clone)]
pub struct FilteredTable<'a> {
    table: &'a CanonicalTable,
    rows: Vec<&'a CanonicalRow>,
    warnings: Vec<Warning>,
}

impl<'a> FilteredTable<'a> {
    pub fn fields(&self) -> &'a [CanonicalField] {
        self.table.fields()
    }

    pub fn has_field(&self, field: CanonicalField) -> bool {
        self.table.has_field(field)
    }

    pub fn rows(&self) -> &[&'a CanonicalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

pub fn apply_filter<'a>(table: &'a CanonicalTable, criteria: &FilterCriteria) -> FilteredTable<'a> {
    let mut warnings = Vec::new();
    let has_date = table.has_field(CanonicalField::Date);
    let use_dates = has_date && criteria.dates.is_bounded();
    let period = criteria.period.filter(|_| has_date);
    if !has_date && (criteria.dates.is_bounded() || criteria.period.is_some()) {
        warn!("Date filter ignored: no date column resolved");
        warnings.push(Warning::FilterIgnored {
            field: CanonicalField::Date,
        });
    }

    let mut constraints = Vec::new();
    for (field, constraint) in criteria.active_constraints() {
        if table.has_field(field) {
            constraints.push((field, constraint));
        } else {
            warn!("Filter on '{field}' ignored: column not resolved");
            warnings.push(Warning::FilterIgnored { field });
        }
    }

    let rows = table
        .rows()
        .iter()
        .filter(|row| !use_dates || criteria.dates.matches(row.date()))
        .filter(|row| period.is_none_or(|period| period.matches(row.date())))
        .filter(|row| {
            constraints
                .iter()
                .all(|(field, constraint)| constraint.allows(row.key(*field).as_deref()))
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        warnings.push(Warning::EmptyResult);
    }
    FilteredTable {
        table,
        rows,
        warnings,
    }
}
