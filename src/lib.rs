pub mod aggregate;
pub mod alias;
pub mod canonical;
pub mod cli;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod kpi;
pub mod resolver;
pub mod table;
pub mod variant;
pub mod yaml;

use std::{env, fmt::Write as _, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands, FilterArgs, InputArgs, OutputFormat},
    dashboard::{Dashboard, DashboardReport},
    filter::{DateFilter, FilterCriteria, Period, parse_constraints},
    ingest::{IngestOptions, RawTable, read_table},
    variant::VariantProfile,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheetdash", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Resolve(args) => handle_resolve(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Variant(args) => handle_variant(&args),
    }
}

fn load_profile(input: &InputArgs) -> Result<VariantProfile> {
    match &input.profile {
        Some(path) => VariantProfile::load(path)
            .with_context(|| format!("Loading variant profile from {path:?}")),
        None => VariantProfile::builtin(&input.variant),
    }
}

fn read_input(input: &InputArgs) -> Result<RawTable> {
    let options = IngestOptions {
        delimiter: input.delimiter,
        encoding: input.input_encoding.clone(),
        sheet: input.sheet.clone(),
    };
    let raw = read_table(&input.input, &options)
        .with_context(|| format!("Reading input {:?}", input.input))?;
    info!(
        "Loaded {} row(s) with {} column(s) from {}",
        raw.row_count(),
        raw.headers().len(),
        raw.source()
    );
    Ok(raw)
}

fn load_dashboard(input: &InputArgs) -> Result<Dashboard> {
    let profile = load_profile(input)?;
    let raw = read_input(input)?;
    Ok(Dashboard::new(&raw, profile))
}

pub fn build_criteria(args: &FilterArgs) -> Result<FilterCriteria> {
    let dates = match (args.day, args.from, args.to) {
        (Some(day), _, _) => DateFilter::Day(day),
        (None, Some(start), Some(end)) => DateFilter::range(start, end)?,
        (None, Some(start), None) => DateFilter::range(start, chrono::NaiveDate::MAX)?,
        (None, None, Some(end)) => DateFilter::range(chrono::NaiveDate::MIN, end)?,
        (None, None, None) => DateFilter::All,
    };
    let mut criteria = FilterCriteria::new().with_dates(dates);
    if let Some(year) = args.year {
        criteria = criteria.with_period(Period::new(year, args.month)?);
    }
    for (field, constraint) in parse_constraints(&args.filters)? {
        debug!("Constraint on {field}: {constraint:?}");
        criteria = criteria.with_constraint(field, constraint);
    }
    Ok(criteria)
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    variant: &'a str,
    headers: &'a [String],
    schema: &'a resolver::ResolvedSchema,
    missing_required: Vec<alias::CanonicalField>,
}

fn handle_resolve(args: &cli::ResolveArgs) -> Result<()> {
    let profile = load_profile(&args.input)?;
    let raw = read_input(&args.input)?;
    let schema = resolver::resolve_columns(raw.headers(), &profile.aliases);
    let missing = schema.missing(&profile.required);

    match args.format {
        OutputFormat::Json => {
            let output = ResolveOutput {
                variant: &profile.name,
                headers: raw.headers(),
                schema: &schema,
                missing_required: missing.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            let rows = schema
                .columns()
                .map(|column| {
                    vec![
                        column.field.as_str().to_string(),
                        column.header.clone(),
                        (column.index + 1).to_string(),
                        format!("{:?}", column.kind).to_lowercase(),
                        column.alias.clone(),
                    ]
                })
                .collect::<Vec<_>>();
            let headers = ["field", "header", "column", "match", "alias"]
                .map(String::from)
                .to_vec();
            print!("{}", table::render_table(&headers, &rows));
            let unresolved = profile
                .aliases
                .fields()
                .filter(|field| !schema.contains(*field))
                .map(|field| field.as_str())
                .collect::<Vec<_>>();
            if !unresolved.is_empty() {
                println!("\nUnresolved: {}", unresolved.join(", "));
            }
        }
    }

    schema
        .require(&profile.required)
        .map_err(|err| anyhow!("{err} (variant '{}')", profile.name))
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let criteria = build_criteria(&args.filters)?;
    let dashboard = load_dashboard(&args.input)?;
    let report = dashboard.report(&criteria, args.top);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print!("{}", render_report(&report)),
    }
    Ok(())
}

fn render_report(report: &DashboardReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} ({})\n", report.title, report.source);
    output.push_str(&table::render_kpis(&report.kpis));
    for view in &report.views {
        let _ = write!(output, "\n{}", table::render_view(view));
    }
    if let Some(err) = &report.schema_error {
        let _ = writeln!(output, "\nSchema: {err}");
    }
    if !report.warnings.is_empty() {
        let _ = writeln!(output, "\nWarnings:");
        for warning in &report.warnings {
            let _ = writeln!(output, "  - {warning}");
        }
    }
    output
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let criteria = build_criteria(&args.filters)?;
    let dashboard = load_dashboard(&args.input)?;
    let filtered = dashboard.filter(&criteria);
    print!("{}", table::render_preview(&filtered, args.rows));
    info!(
        "Displayed {} of {} filtered row(s)",
        filtered.len().min(args.rows),
        filtered.len()
    );
    Ok(())
}

fn handle_export(args: &cli::ExportArgs) -> Result<()> {
    let criteria = build_criteria(&args.filters)?;
    let dashboard = load_dashboard(&args.input)?;
    let filtered = dashboard.filter(&criteria);
    export::export(&filtered, &args.output)
        .with_context(|| format!("Exporting to {:?}", args.output))
}

fn handle_variant(args: &cli::VariantArgs) -> Result<()> {
    if args.list {
        for name in VariantProfile::builtin_names() {
            println!("{name}");
        }
        return Ok(());
    }
    let profile = VariantProfile::builtin(&args.name)?;
    match &args.output {
        Some(path) => {
            profile
                .save(path)
                .with_context(|| format!("Writing variant profile to {path:?}"))?;
            info!("Variant '{}' written to {path:?}", profile.name);
        }
        None => print!("{}", profile.to_yaml()?),
    }
    Ok(())
}
