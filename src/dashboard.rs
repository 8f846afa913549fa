//! One upload, one variant: resolve → coerce → filter → KPIs → views.

use log::{info, warn};
use serde::Serialize;

use crate::{
    aggregate::{ViewResult, ViewStatus, compute_views},
    canonical::CanonicalTable,
    error::{SchemaError, Warning},
    filter::{FilterCriteria, FilteredTable, apply_filter},
    ingest::RawTable,
    kpi::KpiPanel,
    resolver::{ResolvedSchema, resolve_columns},
    variant::VariantProfile,
};

/// A resolved and coerced upload, ready to be filtered any number of times.
#[derive(Debug, Clone)]
pub struct Dashboard {
    profile: VariantProfile,
    source: String,
    schema: ResolvedSchema,
    table: CanonicalTable,
}

impl Dashboard {
    pub fn new(raw: &RawTable, profile: VariantProfile) -> Self {
        let schema = resolve_columns(raw.headers(), &profile.aliases);
        info!(
            "Resolved {} of {} header(s) for variant '{}'",
            schema.len(),
            raw.headers().len(),
            profile.name
        );
        let table = CanonicalTable::build(raw, &schema, &profile.policy);
        Self {
            profile,
            source: raw.source().to_string(),
            schema,
            table,
        }
    }

    pub fn profile(&self) -> &VariantProfile {
        &self.profile
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    pub fn table(&self) -> &CanonicalTable {
        &self.table
    }

    /// Required roles the upload lacks, with the views they take down.
    pub fn schema_error(&self) -> Option<SchemaError> {
        let err = self.schema.require(&self.profile.required).err()?;
        let available = self.table.fields();
        let disabled = self
            .profile
            .views
            .iter()
            .filter(|view| {
                view.missing_fields(available)
                    .iter()
                    .any(|field| err.is_missing(*field))
            })
            .map(|view| view.name.clone())
            .collect();
        Some(err.with_disabled_views(disabled))
    }

    pub fn filter(&self, criteria: &FilterCriteria) -> FilteredTable<'_> {
        apply_filter(&self.table, criteria)
    }

    /// `top` replaces the limit of every view that declares one.
    pub fn report(&self, criteria: &FilterCriteria, top: Option<usize>) -> DashboardReport {
        let schema_error = self.schema_error();
        if let Some(err) = &schema_error {
            warn!("{err}");
        }

        let filtered = self.filter(criteria);
        let mut warnings = self.table.report().warnings();
        warnings.extend(filtered.warnings().iter().cloned());

        let specs = self
            .profile
            .views
            .iter()
            .cloned()
            .map(|mut spec| {
                if spec.limit.is_some()
                    && let Some(top) = top.filter(|n| *n > 0)
                {
                    spec.limit = Some(top);
                }
                spec
            })
            .collect::<Vec<_>>();
        let views = compute_views(&specs, &filtered);
        let disabled = views
            .iter()
            .filter(|view| matches!(view.status, ViewStatus::Disabled { .. }))
            .count();
        info!(
            "Computed {} view(s) over {} of {} row(s) ({} disabled)",
            views.len(),
            filtered.len(),
            self.table.row_count(),
            disabled
        );

        DashboardReport {
            variant: self.profile.name.clone(),
            title: self.profile.display_title().to_string(),
            source: self.source.clone(),
            schema: self.schema.clone(),
            schema_error,
            warnings,
            kpis: KpiPanel::compute(self.table.row_count(), &filtered),
            views,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub variant: String,
    pub title: String,
    pub source: String,
    pub schema: ResolvedSchema,
    pub schema_error: Option<SchemaError>,
    pub warnings: Vec<Warning>,
    pub kpis: KpiPanel,
    pub views: Vec<ViewResult>,
}

impl DashboardReport {
    pub fn view(&self, name: &str) -> Option<&ViewResult> {
        self.views.iter().find(|view| view.name == name)
    }

    pub fn has_warning(&self, warning: &Warning) -> bool {
        self.warnings.contains(warning)
    }
}

pub fn build_report(
    raw: &RawTable,
    profile: &VariantProfile,
    criteria: &FilterCriteria,
) -> DashboardReport {
    Dashboard::new(raw, profile.clone()).report(criteria, None)
}
