//! Grouped aggregation over filtered rows.
//!
//! A view groups rows on one canonical field, reduces another with a
//! [`Measure`], sorts, and optionally keeps the top N. Results come back as
//! ordered `{key, value}` pairs so any chart renderer can draw them.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, ensure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{alias::CanonicalField, canonical::CanonicalRow, filter::FilteredTable};

/// What is computed per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "field", rename_all = "snake_case")]
pub enum Measure {
    /// Number of rows.
    Count,
    /// Missing values add 0.
    Sum(CanonicalField),
    /// Arithmetic mean of the values that are present.
    Mean(CanonicalField),
    /// Distinct non-missing values.
    #[serde(rename = "nunique")]
    CountDistinct(CanonicalField),
}

impl Measure {
    pub fn op_name(&self) -> &'static str {
        match self {
            Measure::Count => "count",
            Measure::Sum(_) => "sum",
            Measure::Mean(_) => "mean",
            Measure::CountDistinct(_) => "nunique",
        }
    }

    pub fn field(&self) -> Option<CanonicalField> {
        match self {
            Measure::Count => None,
            Measure::Sum(field) | Measure::Mean(field) | Measure::CountDistinct(field) => {
                Some(*field)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Largest value first; ties by key.
    #[default]
    ValueDesc,
    /// Key order, for date trends.
    KeyAsc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Grouping candidates; the first one the upload resolved is used.
    pub group_by: Vec<CanonicalField>,
    pub measure: Measure,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AggregationSpec {
    pub fn new(
        name: impl Into<String>,
        group_by: impl IntoIterator<Item = CanonicalField>,
        measure: Measure,
    ) -> Self {
        Self {
            name: name.into(),
            label: None,
            group_by: group_by.into_iter().collect(),
            measure,
            sort: SortOrder::ValueDesc,
            limit: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "View names cannot be empty");
        ensure!(
            !self.group_by.is_empty(),
            "View '{}' needs at least one grouping field",
            self.name
        );
        if let Measure::Sum(field) | Measure::Mean(field) = self.measure {
            ensure!(
                field.is_numeric(),
                "View '{}' cannot {} non-numeric field '{field}'",
                self.name,
                self.measure.op_name()
            );
        }
        ensure!(
            self.limit != Some(0),
            "View '{}' has a limit of 0; omit the limit instead",
            self.name
        );
        Ok(())
    }

    /// Fields this view needs that `available` lacks.
    pub fn missing_fields(&self, available: &[CanonicalField]) -> Vec<CanonicalField> {
        let mut missing = Vec::new();
        if !self.group_by.iter().any(|field| available.contains(field)) {
            missing.extend(self.group_by.iter().copied());
        }
        if let Some(field) = self.measure.field()
            && !available.contains(&field)
        {
            missing.push(field);
        }
        missing
    }

    fn grouping_field(&self, available: &[CanonicalField]) -> Option<CanonicalField> {
        self.group_by
            .iter()
            .copied()
            .find(|field| available.contains(field))
    }

    fn display_label(&self, group: Option<CanonicalField>) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let subject = match self.measure {
            Measure::Count => "Rows".to_string(),
            Measure::Sum(field) => format!("Total {}", field.label()),
            Measure::Mean(field) => format!("Average {}", field.label()),
            Measure::CountDistinct(field) => format!("Distinct {}", field.label()),
        };
        match group {
            Some(field) => format!("{subject} by {}", field.label()),
            None => subject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEntry {
    pub key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewStatus {
    Ready,
    NoData,
    Disabled { missing: Vec<CanonicalField> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewResult {
    pub name: String,
    pub label: String,
    pub op: &'static str,
    pub group_by: Option<CanonicalField>,
    pub value_field: Option<CanonicalField>,
    pub status: ViewStatus,
    pub entries: Vec<ViewEntry>,
}

impl ViewResult {
    pub fn is_ready(&self) -> bool {
        self.status == ViewStatus::Ready
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value)
    }
}

pub fn compute_views(specs: &[AggregationSpec], filtered: &FilteredTable<'_>) -> Vec<ViewResult> {
    specs.iter().map(|spec| compute_view(spec, filtered)).collect()
}

pub fn compute_view(spec: &AggregationSpec, filtered: &FilteredTable<'_>) -> ViewResult {
    let available = filtered.fields();
    let group = spec.grouping_field(available);
    let mut result = ViewResult {
        name: spec.name.clone(),
        label: spec.display_label(group),
        op: spec.measure.op_name(),
        group_by: group,
        value_field: spec.measure.field(),
        status: ViewStatus::Ready,
        entries: Vec::new(),
    };

    let missing = spec.missing_fields(available);
    let Some(group) = group.filter(|_| missing.is_empty()) else {
        result.status = ViewStatus::Disabled { missing };
        return result;
    };

    let mut entries = group_rows(filtered.rows(), group, spec.measure);
    sort_entries(&mut entries, spec.sort);
    if let Some(limit) = spec.limit
        && entries.len() > limit
    {
        entries.truncate(limit);
    }
    if entries.is_empty() {
        result.status = ViewStatus::NoData;
    }
    result.entries = entries;
    result
}

fn group_rows(rows: &[&CanonicalRow], group: CanonicalField, measure: Measure) -> Vec<ViewEntry> {
    let mut groups: HashMap<String, GroupAccumulator> = HashMap::new();
    for row in rows {
        let Some(key) = row.key(group) else {
            continue;
        };
        groups
            .entry(key)
            .or_insert_with(|| GroupAccumulator::for_measure(measure))
            .ingest(row, measure);
    }
    groups
        .into_iter()
        .filter_map(|(key, acc)| acc.finish().map(|value| ViewEntry { key, value }))
        .collect()
}

fn sort_entries(entries: &mut [ViewEntry], order: SortOrder) {
    match order {
        SortOrder::ValueDesc => entries.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then_with(|| a.key.cmp(&b.key))
        }),
        SortOrder::KeyAsc => entries.sort_by(|a, b| a.key.cmp(&b.key)),
    }
}

enum GroupAccumulator {
    Rows(usize),
    Sum(f64),
    Mean { sum: f64, count: usize },
    Distinct(HashSet<String>),
}

impl GroupAccumulator {
    fn for_measure(measure: Measure) -> Self {
        match measure {
            Measure::Count => GroupAccumulator::Rows(0),
            Measure::Sum(_) => GroupAccumulator::Sum(0.0),
            Measure::Mean(_) => GroupAccumulator::Mean { sum: 0.0, count: 0 },
            Measure::CountDistinct(_) => GroupAccumulator::Distinct(HashSet::new()),
        }
    }

    fn ingest(&mut self, row: &CanonicalRow, measure: Measure) {
        match (self, measure) {
            (GroupAccumulator::Rows(count), _) => *count += 1,
            (GroupAccumulator::Sum(total), Measure::Sum(field)) => {
                *total += row.number(field).unwrap_or(0.0);
            }
            (GroupAccumulator::Mean { sum, count }, Measure::Mean(field)) => {
                if let Some(value) = row.number(field) {
                    *sum += value;
                    *count += 1;
                }
            }
            (GroupAccumulator::Distinct(seen), Measure::CountDistinct(field)) => {
                if let Some(value) = row.key(field) {
                    seen.insert(value);
                }
            }
            _ => {}
        }
    }

    /// `None` for a mean with nothing to average; such groups are left out.
    fn finish(self) -> Option<f64> {
        match self {
            GroupAccumulator::Rows(count) => Some(count as f64),
            GroupAccumulator::Sum(total) => Some(total),
            GroupAccumulator::Mean { sum, count } => (count > 0).then(|| sum / count as f64),
            GroupAccumulator::Distinct(seen) => Some(seen.len() as f64),
        }
    }
}

/// Sum of `field`; missing values add 0.
pub fn sum(rows: &[&CanonicalRow], field: CanonicalField) -> f64 {
    rows.iter().filter_map(|row| row.number(field)).sum()
}

/// Mean over present values, `None` when there are none.
pub fn mean(rows: &[&CanonicalRow], field: CanonicalField) -> Option<f64> {
    let (total, count) = rows
        .iter()
        .filter_map(|row| row.number(field))
        .fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    (count > 0).then(|| total / count as f64)
}

pub fn count_distinct(rows: &[&CanonicalRow], field: CanonicalField) -> usize {
    rows.iter().filter_map(|row| row.key(field)).unique().count()
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Total quantity divided by the number of distinct trips.
pub fn average_load_per_trip(rows: &[&CanonicalRow]) -> f64 {
    ratio(
        sum(rows, CanonicalField::Quantity),
        count_distinct(rows, CanonicalField::TripId) as f64,
    )
}
