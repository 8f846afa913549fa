//! Dashboard variants.
//!
//! A [`VariantProfile`] bundles everything that used to differ between the
//! delivery, sales and supply dashboards: header spellings, the fields a
//! dashboard cannot do without, coercion policy and the default views. The
//! built-ins can be dumped to YAML, edited, and loaded back with `--profile`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregationSpec, Measure, SortOrder},
    alias::{AliasTable, CanonicalField},
    canonical::CoercionPolicy,
    yaml,
};

pub const DEFAULT_VARIANT: &str = "neon";

const BUILTIN_NAMES: &[&str] = &["neon", "delivery", "sales", "supply"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantProfile {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "AliasTable::standard")]
    pub aliases: AliasTable,
    #[serde(default)]
    pub required: Vec<CanonicalField>,
    #[serde(default)]
    pub policy: CoercionPolicy,
    #[serde(default)]
    pub views: Vec<AggregationSpec>,
}

impl VariantProfile {
    pub fn builtin_names() -> &'static [&'static str] {
        BUILTIN_NAMES
    }

    pub fn builtin(name: &str) -> Result<Self> {
        let profile = match name.trim().to_ascii_lowercase().as_str() {
            "neon" => neon(),
            "delivery" => delivery(),
            "sales" => sales(),
            "supply" => supply(),
            other => {
                return Err(anyhow!(
                    "Unknown variant '{other}'. Available variants: {}",
                    BUILTIN_NAMES.join(", ")
                ));
            }
        };
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let profile: Self = yaml::load_from_path(path)?;
        profile
            .validate()
            .with_context(|| format!("Validating variant profile {path:?}"))?;
        debug!(
            "Loaded variant '{}' with {} view(s) from {path:?}",
            profile.name,
            profile.views.len()
        );
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        yaml::save_to_path(path, self)
    }

    pub fn to_yaml(&self) -> Result<String> {
        yaml::to_string(self)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.name.trim().is_empty(), "Variant name cannot be empty");
        self.aliases
            .validate()
            .with_context(|| format!("Variant '{}' has an invalid alias table", self.name))?;
        for field in &self.required {
            ensure!(
                !self.aliases.candidates(*field).is_empty(),
                "Variant '{}' requires '{field}' but lists no aliases for it",
                self.name
            );
        }
        let mut names = BTreeSet::new();
        for view in &self.views {
            view.validate()?;
            ensure!(
                names.insert(view.name.as_str()),
                "Variant '{}' defines view '{}' more than once",
                self.name,
                view.name
            );
        }
        Ok(())
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

fn volume_by_segment() -> AggregationSpec {
    use CanonicalField::*;
    AggregationSpec::new(
        "volume_by_segment",
        [Area, Plant, Customer],
        Measure::Sum(Quantity),
    )
}

fn daily_trend(measure: Measure) -> AggregationSpec {
    AggregationSpec::new("daily_trend", [CanonicalField::Date], measure)
        .with_sort(SortOrder::KeyAsc)
}

fn top_contributors() -> AggregationSpec {
    use CanonicalField::*;
    AggregationSpec::new(
        "top_contributors",
        [Truck, Salesman, Customer],
        Measure::Sum(Quantity),
    )
    .with_limit(5)
}

fn neon() -> VariantProfile {
    VariantProfile {
        name: "neon".into(),
        title: "Delivery & Sales Overview".into(),
        aliases: AliasTable::standard(),
        required: vec![CanonicalField::Date, CanonicalField::Quantity],
        policy: CoercionPolicy::default(),
        views: vec![
            volume_by_segment(),
            daily_trend(Measure::Sum(CanonicalField::Quantity)),
            top_contributors(),
        ],
    }
}

fn delivery() -> VariantProfile {
    use CanonicalField::*;
    VariantProfile {
        name: "delivery".into(),
        title: "Delivery Performance".into(),
        aliases: AliasTable::standard().with_preferred(TripId, ["no ritase", "trip number"]),
        required: vec![Date, Quantity, TripId],
        policy: CoercionPolicy::default(),
        views: vec![
            volume_by_segment(),
            daily_trend(Measure::Sum(Quantity)),
            AggregationSpec::new("trips_per_truck", [Truck], Measure::CountDistinct(TripId)),
            AggregationSpec::new("distance_by_truck", [Truck], Measure::Sum(Distance)),
            AggregationSpec::new("loads_per_area", [Area, Plant], Measure::Count),
        ],
    }
}

fn sales() -> VariantProfile {
    use CanonicalField::*;
    VariantProfile {
        name: "sales".into(),
        title: "Sales Achievement".into(),
        aliases: AliasTable::standard()
            .with_preferred(Salesman, ["sales person", "salesperson"])
            .with_preferred(AchievementPct, ["ach %", "achievement pct"]),
        required: vec![Date, Salesman],
        policy: CoercionPolicy::default(),
        views: vec![
            AggregationSpec::new("volume_by_salesman", [Salesman], Measure::Sum(Quantity)),
            AggregationSpec::new(
                "achievement_by_salesman",
                [Salesman],
                Measure::Mean(AchievementPct),
            ),
            AggregationSpec::new("target_by_salesman", [Salesman], Measure::Sum(Target)),
            AggregationSpec::new("actual_by_salesman", [Salesman], Measure::Sum(ActualSupply)),
            daily_trend(Measure::Sum(Quantity)),
        ],
    }
}

fn supply() -> VariantProfile {
    use CanonicalField::*;
    VariantProfile {
        name: "supply".into(),
        title: "Supply vs Schedule".into(),
        aliases: AliasTable::standard()
            .with_preferred(Schedule, ["scheduled volume", "rencana"])
            .with_preferred(ActualSupply, ["supplied", "volume supply"]),
        required: vec![Date, Plant],
        policy: CoercionPolicy::default(),
        views: vec![
            AggregationSpec::new("schedule_by_plant", [Plant], Measure::Sum(Schedule)),
            AggregationSpec::new("supply_by_plant", [Plant], Measure::Sum(ActualSupply)),
            AggregationSpec::new("status_breakdown", [Status], Measure::Count),
            daily_trend(Measure::Sum(ActualSupply)),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtins_are_valid() {
        for name in VariantProfile::builtin_names() {
            let profile = VariantProfile::builtin(name).unwrap();
            profile.validate().unwrap();
            assert_eq!(profile.name, *name);
        }
    }

    #[test]
    fn unknown_variant_lists_the_builtins() {
        let err = VariantProfile::builtin("retail").unwrap_err().to_string();
        assert!(err.contains("neon, delivery, sales, supply"));
    }

    #[test]
    fn neon_top_contributors_keeps_five() {
        let neon = VariantProfile::builtin("NEON").unwrap();
        let top = neon
            .views
            .iter()
            .find(|view| view.name == "top_contributors")
            .unwrap();
        assert_eq!(top.limit, Some(5));
        assert_eq!(top.group_by[0], CanonicalField::Truck);
    }

    #[test]
    fn profile_round_trips_through_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.yml");
        let profile = VariantProfile::builtin("sales").unwrap();
        profile.save(&path).unwrap();
        let loaded = VariantProfile::load(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn minimal_yaml_profile_uses_standard_aliases() {
        let yaml = "name: custom\nrequired: [quantity]\nviews:\n  - name: by_area\n    group_by: [area]\n    measure:\n      op: sum\n      field: quantity\n";
        let profile: VariantProfile = yaml::from_str(yaml).unwrap();
        profile.validate().unwrap();
        assert_eq!(profile.aliases, AliasTable::standard());
        assert_eq!(profile.display_title(), "custom");
        assert_eq!(profile.views[0].sort, SortOrder::ValueDesc);
    }

    #[test]
    fn duplicate_view_names_are_rejected() {
        let mut profile = VariantProfile::builtin("neon").unwrap();
        let first = profile.views[0].clone();
        profile.views.push(first);
        assert!(profile.validate().is_err());
    }
}
