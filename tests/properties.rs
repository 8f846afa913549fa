use chrono::NaiveDate;
use proptest::prelude::*;
use sheetdash::{
    aggregate::{average_load_per_trip, sum},
    alias::{AliasTable, CanonicalField},
    canonical::{CanonicalRow, CanonicalTable, FieldValue},
    data::{Cell, normalize_key},
    filter::{Constraint, DateFilter, FilterCriteria, apply_filter},
    resolver::resolve_columns,
};

const AREAS: &[&str] = &["North", "South", "East", "West"];

fn decorate(base: &str, upper: bool, separator: char, pad: bool) -> String {
    let mut out = String::new();
    if pad {
        out.push(' ');
    }
    for (idx, word) in base.split(' ').enumerate() {
        if idx > 0 {
            out.push(separator);
        }
        if upper {
            out.push_str(&word.to_uppercase());
        } else {
            out.push_str(word);
        }
    }
    if pad {
        out.push(' ');
    }
    out
}

fn row_strategy() -> impl Strategy<Value = (u32, usize, i32)> {
    (1u32..=60, 0..AREAS.len(), -50i32..500)
}

fn table_from(rows: &[(u32, usize, i32)]) -> CanonicalTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let rows = rows
        .iter()
        .enumerate()
        .map(|(idx, (day, area, qty))| {
            CanonicalRow::new(idx + 2)
                .with(
                    CanonicalField::Date,
                    FieldValue::Date(start + chrono::Duration::days(i64::from(*day))),
                )
                .with(CanonicalField::Area, FieldValue::Text(AREAS[*area].into()))
                .with(CanonicalField::Quantity, FieldValue::Number(f64::from(*qty)))
        })
        .collect();
    CanonicalTable::from_rows(
        vec![
            CanonicalField::Date,
            CanonicalField::Area,
            CanonicalField::Quantity,
        ],
        rows,
    )
}

proptest! {
    #[test]
    fn headers_that_normalize_alike_resolve_alike(
        alias_idx in 0usize..6,
        upper in any::<bool>(),
        separator in prop::sample::select(vec![' ', '_', '-', '.']),
        pad in any::<bool>(),
    ) {
        let bases = [
            "sales man",
            "trip id",
            "end customer",
            "delivery date",
            "actual supply",
            "no truck",
        ];
        let base = bases[alias_idx];
        let plain = base.to_string();
        let decorated = decorate(base, upper, separator, pad);
        prop_assert_eq!(normalize_key(&plain), normalize_key(&decorated));

        let aliases = AliasTable::standard();
        let a = resolve_columns(&[plain], &aliases);
        let b = resolve_columns(&[decorated], &aliases);
        prop_assert_eq!(a.fields().collect::<Vec<_>>(), b.fields().collect::<Vec<_>>());
    }

    #[test]
    fn no_header_is_claimed_twice(
        headers in prop::collection::vec(
            prop::sample::select(vec![
                "Date", "Qty", "Sales", "Salesman", "Trip", "Area", "Plant", "Customer",
                "End Customer", "Truck", "Distance", "Achievement %", "Target Volume",
                "Actual Supply", "Supply", "Volume", "Notes", "",
            ]),
            0..12,
        )
    ) {
        let headers = headers.into_iter().map(String::from).collect::<Vec<_>>();
        let schema = resolve_columns(&headers, &AliasTable::standard());
        let mut indices = schema.columns().map(|c| c.index).collect::<Vec<_>>();
        let total = indices.len();
        indices.sort_unstable();
        indices.dedup();
        prop_assert_eq!(indices.len(), total);
    }

    #[test]
    fn empty_constraints_match_the_date_only_filter(
        rows in prop::collection::vec(row_strategy(), 0..40),
        from in 1u32..=60,
        span in 0u32..30,
    ) {
        let table = table_from(&rows);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let lo = start + chrono::Duration::days(i64::from(from));
        let hi = lo + chrono::Duration::days(i64::from(span));
        let with_empty = FilterCriteria::new()
            .with_dates(DateFilter::range(lo, hi).unwrap())
            .with_constraint(CanonicalField::Area, Constraint::from_values(Vec::<String>::new()))
            .with_constraint(CanonicalField::Truck, Constraint::from_values(["all"]));
        prop_assert!(!with_empty.has_active_constraints());

        let a = apply_filter(&table, &with_empty.dates_only());
        let b = apply_filter(&table, &with_empty);
        let lines = |f: &sheetdash::filter::FilteredTable<'_>| {
            f.rows().iter().map(|r| r.line()).collect::<Vec<_>>()
        };
        prop_assert_eq!(lines(&a), lines(&b));
    }

    #[test]
    fn sums_are_additive_over_disjoint_categories(
        rows in prop::collection::vec(row_strategy(), 0..40),
        split in 1usize..AREAS.len(),
    ) {
        let table = table_from(&rows);
        let (left, right) = AREAS.split_at(split);
        let pick = |areas: &[&str]| {
            FilterCriteria::new().with_constraint(
                CanonicalField::Area,
                Constraint::from_values(areas.iter().copied()),
            )
        };
        let all = apply_filter(&table, &pick(AREAS));
        let a = apply_filter(&table, &pick(left));
        let b = apply_filter(&table, &pick(right));
        let total = sum(all.rows(), CanonicalField::Quantity);
        prop_assert_eq!(
            total,
            sum(a.rows(), CanonicalField::Quantity) + sum(b.rows(), CanonicalField::Quantity)
        );
        prop_assert_eq!(average_load_per_trip(all.rows()), 0.0);
    }

    #[test]
    fn percent_suffix_does_not_change_the_value(value in 0u32..=1000) {
        let bare = Cell::from(value.to_string());
        let suffixed = Cell::from(format!("{value}%"));
        let policy = false;
        prop_assert_eq!(
            sheetdash::canonical::coerce_percentage(&bare, policy),
            sheetdash::canonical::coerce_percentage(&suffixed, policy)
        );
    }
}
