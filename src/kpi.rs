//! Headline numbers shown above the charts.
//!
//! Every entry that depends on a field is `None` when the upload did not
//! resolve that field, so a presentation layer can hide the card instead of
//! showing a misleading zero.

use serde::Serialize;

use crate::{
    aggregate::{average_load_per_trip, count_distinct, mean, ratio, sum},
    alias::CanonicalField,
    filter::FilteredTable,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiPanel {
    pub total_rows: usize,
    pub filtered_rows: usize,
    pub rows_with_date: Option<usize>,
    pub total_quantity: Option<f64>,
    pub areas: Option<usize>,
    pub plants: Option<usize>,
    pub salesmen: Option<usize>,
    pub trucks: Option<usize>,
    pub customers: Option<usize>,
    pub trips: Option<usize>,
    pub avg_load_per_trip: Option<f64>,
    pub total_distance: Option<f64>,
    pub mean_achievement_pct: Option<f64>,
    pub total_target: Option<f64>,
    pub total_actual_supply: Option<f64>,
    pub total_schedule: Option<f64>,
    pub fulfillment_pct: Option<f64>,
}

impl KpiPanel {
    /// `total_rows` counts the upload before filtering.
    pub fn compute(total_rows: usize, filtered: &FilteredTable<'_>) -> Self {
        let rows = filtered.rows();
        let has = |field| filtered.has_field(field);
        let total = |field| has(field).then(|| sum(rows, field));
        let distinct = |field| has(field).then(|| count_distinct(rows, field));

        let total_target = total(CanonicalField::Target);
        let total_actual_supply = total(CanonicalField::ActualSupply);
        let fulfillment_pct = total_target
            .zip(total_actual_supply)
            .map(|(target, actual)| ratio(actual, target) * 100.0);

        Self {
            total_rows,
            filtered_rows: filtered.len(),
            rows_with_date: has(CanonicalField::Date)
                .then(|| rows.iter().filter(|row| row.date().is_some()).count()),
            total_quantity: total(CanonicalField::Quantity),
            areas: distinct(CanonicalField::Area),
            plants: distinct(CanonicalField::Plant),
            salesmen: distinct(CanonicalField::Salesman),
            trucks: distinct(CanonicalField::Truck),
            customers: distinct(CanonicalField::Customer),
            trips: distinct(CanonicalField::TripId),
            avg_load_per_trip: (has(CanonicalField::Quantity) && has(CanonicalField::TripId))
                .then(|| average_load_per_trip(rows)),
            total_distance: total(CanonicalField::Distance),
            mean_achievement_pct: has(CanonicalField::AchievementPct)
                .then(|| mean(rows, CanonicalField::AchievementPct).unwrap_or(0.0)),
            total_target,
            total_actual_supply,
            total_schedule: total(CanonicalField::Schedule),
            fulfillment_pct,
        }
    }

    /// Label/value pairs for the entries that are present, in display order.
    pub fn entries(&self) -> Vec<(&'static str, KpiValue)> {
        let mut entries = vec![
            ("Total rows", KpiValue::Count(self.total_rows)),
            ("Filtered rows", KpiValue::Count(self.filtered_rows)),
        ];
        let counts = [
            ("Rows with date", self.rows_with_date),
            ("Areas", self.areas),
            ("Plants", self.plants),
            ("Salesmen", self.salesmen),
            ("Trucks", self.trucks),
            ("Customers", self.customers),
            ("Trips", self.trips),
        ];
        let amounts = [
            ("Total quantity", self.total_quantity),
            ("Avg load per trip", self.avg_load_per_trip),
            ("Total distance", self.total_distance),
            ("Mean achievement %", self.mean_achievement_pct),
            ("Total target", self.total_target),
            ("Total actual supply", self.total_actual_supply),
            ("Total schedule", self.total_schedule),
            ("Fulfillment %", self.fulfillment_pct),
        ];
        entries.extend(
            counts
                .into_iter()
                .filter_map(|(label, value)| value.map(|v| (label, KpiValue::Count(v)))),
        );
        entries.extend(
            amounts
                .into_iter()
                .filter_map(|(label, value)| value.map(|v| (label, KpiValue::Amount(v)))),
        );
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KpiValue {
    Count(usize),
    Amount(f64),
}

impl std::fmt::Display for KpiValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KpiValue::Count(count) => write!(f, "{count}"),
            KpiValue::Amount(amount) if amount.fract() == 0.0 => write!(f, "{amount:.0}"),
            KpiValue::Amount(amount) => write!(f, "{amount:.2}"),
        }
    }
}
