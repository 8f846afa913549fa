//! Canonical field roles and the alias table that maps header spellings onto them.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow, ensure};
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

use crate::data::normalize_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Date,
    Quantity,
    Salesman,
    TripId,
    Area,
    Plant,
    Customer,
    Truck,
    Distance,
    AchievementPct,
    Status,
    Target,
    Schedule,
    ActualSupply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Numeric,
    Percentage,
    Categorical,
}

impl CanonicalField {
    pub const COUNT: usize = 14;

    pub const ALL: [CanonicalField; CanonicalField::COUNT] = [
        CanonicalField::Date,
        CanonicalField::Quantity,
        CanonicalField::Salesman,
        CanonicalField::TripId,
        CanonicalField::Area,
        CanonicalField::Plant,
        CanonicalField::Customer,
        CanonicalField::Truck,
        CanonicalField::Distance,
        CanonicalField::AchievementPct,
        CanonicalField::Status,
        CanonicalField::Target,
        CanonicalField::Schedule,
        CanonicalField::ActualSupply,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Quantity => "quantity",
            CanonicalField::Salesman => "salesman",
            CanonicalField::TripId => "trip_id",
            CanonicalField::Area => "area",
            CanonicalField::Plant => "plant",
            CanonicalField::Customer => "customer",
            CanonicalField::Truck => "truck",
            CanonicalField::Distance => "distance",
            CanonicalField::AchievementPct => "achievement_pct",
            CanonicalField::Status => "status",
            CanonicalField::Target => "target",
            CanonicalField::Schedule => "schedule",
            CanonicalField::ActualSupply => "actual_supply",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            CanonicalField::Date => FieldKind::Date,
            CanonicalField::Quantity
            | CanonicalField::Distance
            | CanonicalField::Target
            | CanonicalField::Schedule
            | CanonicalField::ActualSupply => FieldKind::Numeric,
            CanonicalField::AchievementPct => FieldKind::Percentage,
            CanonicalField::Salesman
            | CanonicalField::TripId
            | CanonicalField::Area
            | CanonicalField::Plant
            | CanonicalField::Customer
            | CanonicalField::Truck
            | CanonicalField::Status => FieldKind::Categorical,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind(), FieldKind::Numeric | FieldKind::Percentage)
    }

    /// Position in [`CanonicalField::ALL`], used as a dense row slot.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human label for tables and chart titles (`trip_id` -> `Trip Id`).
    pub fn label(&self) -> String {
        match self {
            CanonicalField::AchievementPct => "Achievement %".to_string(),
            other => other.as_str().to_title_case(),
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let key = normalize_key(value);
        CanonicalField::ALL
            .into_iter()
            .find(|field| normalize_key(field.as_str()) == key)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown field '{value}'. Expected one of: {}",
                    CanonicalField::ALL
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub field: CanonicalField,
    pub candidates: Vec<String>,
}

impl AliasEntry {
    pub fn new<I, S>(field: CanonicalField, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered candidate header spellings per field.
///
/// Entry order is resolution order: an earlier field gets first pick of the
/// headers when two fields could match the same one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new(entries: Vec<AliasEntry>) -> Result<Self> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, entry) in self.entries.iter().enumerate() {
            ensure!(
                !self.entries[..idx].iter().any(|e| e.field == entry.field),
                "Alias table lists field '{}' more than once",
                entry.field
            );
            ensure!(
                entry
                    .candidates
                    .iter()
                    .any(|candidate| !normalize_key(candidate).is_empty()),
                "Alias table entry for '{}' has no usable candidates",
                entry.field
            );
        }
        Ok(())
    }

    /// Spellings seen across the delivery, sales and supply dashboards.
    pub fn standard() -> Self {
        use CanonicalField::*;
        Self {
            entries: vec![
                AliasEntry::new(Date, ["date", "tanggal", "tgl", "delivery date", "tanggal kirim"]),
                AliasEntry::new(Quantity, ["qty", "quantity", "volume", "vol", "m3"]),
                AliasEntry::new(Salesman, ["salesman", "sales name", "nama sales", "sales"]),
                AliasEntry::new(TripId, ["trip id", "no trip", "trip no", "ritase", "trip"]),
                AliasEntry::new(Area, ["area", "region", "wilayah"]),
                AliasEntry::new(Plant, ["plant", "batching plant", "bp"]),
                AliasEntry::new(Customer, ["end customer", "customer", "pelanggan", "cust"]),
                AliasEntry::new(Truck, ["truck", "no truck", "nopol", "truck no", "vehicle"]),
                AliasEntry::new(Distance, ["distance", "jarak", "km"]),
                AliasEntry::new(
                    AchievementPct,
                    ["achievement %", "achievement", "ach", "pencapaian"],
                ),
                AliasEntry::new(Status, ["status", "delivery status"]),
                AliasEntry::new(Target, ["target", "target volume"]),
                AliasEntry::new(Schedule, ["schedule", "jadwal", "plan"]),
                AliasEntry::new(ActualSupply, ["actual supply", "actual", "realisasi", "supply"]),
            ],
        }
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn candidates(&self, field: CanonicalField) -> &[String] {
        self.entries
            .iter()
            .find(|entry| entry.field == field)
            .map(|entry| entry.candidates.as_slice())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        self.entries.iter().map(|entry| entry.field)
    }

    /// Puts `candidates` ahead of the existing spellings for `field`.
    pub fn with_preferred<I, S>(mut self, field: CanonicalField, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut preferred: Vec<String> = candidates.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|entry| entry.field == field) {
            Some(entry) => {
                entry.candidates.retain(|existing| !preferred.contains(existing));
                preferred.append(&mut entry.candidates);
                entry.candidates = preferred;
            }
            None => self.entries.push(AliasEntry {
                field,
                candidates: preferred,
            }),
        }
        self
    }

    /// Drops `fields` from the table so they are never resolved.
    pub fn without(mut self, fields: &[CanonicalField]) -> Self {
        self.entries.retain(|entry| !fields.contains(&entry.field));
        self
    }
}
