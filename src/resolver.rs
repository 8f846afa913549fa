//! Column resolution: maps raw headers onto canonical fields.
//!
//! Matching runs in two passes over the [`AliasTable`]. The exact pass compares
//! normalized keys for every field; the substring pass then gives still-unresolved
//! fields a chance to claim a header whose key contains one of their aliases.
//! Each header can be claimed once, so no two fields ever share a column.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::{
    alias::{AliasEntry, AliasTable, CanonicalField},
    data::normalize_key,
    error::SchemaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub field: CanonicalField,
    /// Header text as it appeared in the upload.
    pub header: String,
    /// Zero-based column position in the upload.
    pub index: usize,
    /// Alias that produced the match.
    pub alias: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedSchema {
    columns: BTreeMap<CanonicalField, ResolvedColumn>,
}

impl ResolvedSchema {
    pub fn get(&self, field: CanonicalField) -> Option<&ResolvedColumn> {
        self.columns.get(&field)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.get(field).map(|column| column.header.as_str())
    }

    /// Resolved fields in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = CanonicalField> + '_ {
        self.columns.keys().copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ResolvedColumn> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn missing(&self, fields: &[CanonicalField]) -> Vec<CanonicalField> {
        fields
            .iter()
            .copied()
            .filter(|field| !self.contains(*field))
            .collect()
    }

    pub fn require(&self, fields: &[CanonicalField]) -> Result<(), SchemaError> {
        let missing = self.missing(fields);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::new(missing))
        }
    }
}

pub fn resolve_columns(headers: &[String], aliases: &AliasTable) -> ResolvedSchema {
    let normalized = headers
        .iter()
        .map(|header| normalize_key(header))
        .collect::<Vec<_>>();
    let mut claimed = vec![false; headers.len()];
    let mut columns = BTreeMap::new();

    for kind in [MatchKind::Exact, MatchKind::Substring] {
        for entry in aliases.entries() {
            if columns.contains_key(&entry.field) {
                continue;
            }
            if let Some((index, alias)) = find_match(entry, &normalized, &claimed, kind) {
                claimed[index] = true;
                debug!(
                    "Resolved '{}' -> {} via {:?} match on alias '{}'",
                    headers[index], entry.field, kind, alias
                );
                columns.insert(
                    entry.field,
                    ResolvedColumn {
                        field: entry.field,
                        header: headers[index].clone(),
                        index,
                        alias: alias.to_string(),
                        kind,
                    },
                );
            }
        }
    }

    ResolvedSchema { columns }
}

fn find_match<'a>(
    entry: &'a AliasEntry,
    normalized: &[String],
    claimed: &[bool],
    kind: MatchKind,
) -> Option<(usize, &'a str)> {
    for alias in &entry.candidates {
        let key = normalize_key(alias);
        if key.is_empty() {
            continue;
        }
        let hit = normalized.iter().zip(claimed).position(|(header, taken)| {
            !taken
                && !header.is_empty()
                && match kind {
                    MatchKind::Exact => *header == key,
                    MatchKind::Substring => header.contains(&key),
                }
        });
        if let Some(index) = hit {
            return Some((index, alias.as_str()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn exact_match_beats_substring_in_candidate_order() {
        let schema = resolve_columns(
            &headers(&["Sales Area", "Area", "Tanggal"]),
            &AliasTable::standard(),
        );
        let area = schema.get(CanonicalField::Area).unwrap();
        assert_eq!(area.header, "Area");
        assert_eq!(area.index, 1);
        assert_eq!(area.kind, MatchKind::Exact);
        assert_eq!(schema.header(CanonicalField::Date), Some("Tanggal"));
    }

    #[test]
    fn substring_match_is_a_fallback() {
        let schema = resolve_columns(
            &headers(&["Delivery Qty (m3)", "Plant Name"]),
            &AliasTable::standard(),
        );
        let qty = schema.get(CanonicalField::Quantity).unwrap();
        assert_eq!(qty.kind, MatchKind::Substring);
        assert_eq!(qty.alias, "qty");
        assert_eq!(schema.header(CanonicalField::Plant), Some("Plant Name"));
    }

    #[test]
    fn claimed_headers_are_not_reused() {
        // "Actual Supply" is reachable through three actual_supply aliases.
        let schema = resolve_columns(
            &headers(&["Sales", "Actual Supply"]),
            &AliasTable::standard(),
        );
        let mut seen = std::collections::HashSet::new();
        for column in schema.columns() {
            assert!(seen.insert(column.index), "column {} claimed twice", column.index);
        }
        assert_eq!(schema.header(CanonicalField::Salesman), Some("Sales"));
        assert_eq!(schema.header(CanonicalField::ActualSupply), Some("Actual Supply"));
    }

    #[test]
    fn exact_pass_runs_before_any_substring_pass() {
        // Quantity lists "volume", which is a substring of "Target Volume"; the
        // exact pass hands that header to target first.
        let schema = resolve_columns(
            &headers(&["Target Volume", "Date"]),
            &AliasTable::standard(),
        );
        assert_eq!(schema.header(CanonicalField::Target), Some("Target Volume"));
        assert!(!schema.contains(CanonicalField::Quantity));
    }

    #[test]
    fn blank_headers_never_match() {
        let schema = resolve_columns(&headers(&["", "  ", "--"]), &AliasTable::standard());
        assert!(schema.is_empty());
    }

    #[test]
    fn empty_header_list_yields_empty_schema() {
        let schema = resolve_columns(&[], &AliasTable::standard());
        assert!(schema.is_empty());
        let err = schema.require(&[CanonicalField::Date]).unwrap_err();
        assert_eq!(err.missing, vec![CanonicalField::Date]);
    }
}
