use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use sheetdash::alias::{AliasTable, CanonicalField};
use sheetdash::canonical::{CanonicalTable, CoercionPolicy};
use sheetdash::dashboard::Dashboard;
use sheetdash::filter::{Constraint, FilterCriteria, Period, apply_filter};
use sheetdash::ingest::{IngestOptions, RawTable, read_table};
use sheetdash::resolver::resolve_columns;
use sheetdash::variant::VariantProfile;
use tempfile::TempDir;

const AREAS: [&str; 4] = ["North", "South", "East", "West"];

fn generate_deliveries(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("deliveries.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(file, "Tanggal,No Trip,Nopol,Area,Plant,Sales Man,Qty (m3),Jarak").expect("header");
    for i in 0..rows {
        let day = (i % 28) + 1;
        let month = (i % 12) + 1;
        let area = AREAS[i % AREAS.len()];
        let qty = if i % 50 == 0 {
            "n/a".to_string()
        } else {
            format!("{},{}", 4 + i % 6, i % 10)
        };
        writeln!(
            file,
            "{day:02}/{month:02}/2024,R-{},B {} XA,{area},BP {},Sales {},\"{qty}\",{}",
            i / 3,
            9000 + i % 40,
            i % 5,
            i % 15,
            10 + i % 30
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn load(rows: usize) -> (TempDir, RawTable) {
    let (dir, path) = generate_deliveries(rows);
    let raw = read_table(&path, &IngestOptions::default()).expect("read generated csv");
    (dir, raw)
}

fn criteria() -> FilterCriteria {
    FilterCriteria::new()
        .with_period(Period::new(2024, Some(3)).expect("period"))
        .with_constraint(
            CanonicalField::Area,
            Constraint::from_values(["North", "East"]),
        )
}

fn bench_pipeline(c: &mut Criterion) {
    let (_dir, raw) = load(20_000);
    let aliases = AliasTable::standard();
    let policy = CoercionPolicy::default();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    group.bench_function("resolve_headers", |b| {
        b.iter(|| resolve_columns(raw.headers(), &aliases))
    });

    let schema = resolve_columns(raw.headers(), &aliases);
    group.bench_function("coerce_20k_rows", |b| {
        b.iter(|| CanonicalTable::build(&raw, &schema, &policy))
    });

    let table = CanonicalTable::build(&raw, &schema, &policy);
    let criteria = criteria();
    group.bench_function("filter_period_and_area", |b| {
        b.iter(|| apply_filter(&table, &criteria).len())
    });

    group.bench_function("report_neon", |b| {
        b.iter_batched(
            || VariantProfile::builtin("neon").expect("neon profile"),
            |profile| {
                let dashboard = Dashboard::new(&raw, profile);
                dashboard.report(&criteria, None)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
