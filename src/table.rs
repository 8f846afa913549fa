//! Plain-text tables for the terminal.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    aggregate::{ViewResult, ViewStatus},
    data::format_number,
    filter::FilteredTable,
    kpi::KpiPanel,
};

const BAR_WIDTH: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Renders rows under a header; columns whose cells are all numeric are
/// right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let aligns = (0..headers.len())
        .map(|idx| {
            let mut cells = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .filter(|cell| !cell.is_empty())
                .peekable();
            if cells.peek().is_some() && cells.all(|cell| looks_numeric(cell)) {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect::<Vec<_>>();
    render_aligned(headers, rows, &aligns)
}

pub fn render_aligned(headers: &[String], rows: &[Vec<String>], aligns: &[Align]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| display_width(h).max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, aligns));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, aligns));
    }
    output
}

/// First `limit` filtered rows with their canonical columns.
pub fn render_preview(filtered: &FilteredTable<'_>, limit: usize) -> String {
    let fields = filtered.fields();
    let mut headers = vec!["line".to_string()];
    headers.extend(fields.iter().map(|field| field.as_str().to_string()));
    let rows = filtered
        .rows()
        .iter()
        .take(limit)
        .map(|row| {
            let mut cells = vec![row.line().to_string()];
            cells.extend(
                fields
                    .iter()
                    .map(|field| row.key(*field).unwrap_or_default()),
            );
            cells
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_kpis(panel: &KpiPanel) -> String {
    let rows = panel
        .entries()
        .into_iter()
        .map(|(label, value)| vec![label.to_string(), value.to_string()])
        .collect::<Vec<_>>();
    render_aligned(
        &["metric".to_string(), "value".to_string()],
        &rows,
        &[Align::Left, Align::Right],
    )
}

/// A view as a key/value table with a proportional bar per entry.
pub fn render_view(view: &ViewResult) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} [{}]", view.label, view.name);
    match &view.status {
        ViewStatus::Disabled { missing } => {
            let names = missing
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(output, "  (disabled: missing {names})");
        }
        ViewStatus::NoData => {
            let _ = writeln!(output, "  (no data for the current filters)");
        }
        ViewStatus::Ready => {
            let peak = view
                .entries
                .iter()
                .map(|entry| entry.value.abs())
                .fold(0.0_f64, f64::max);
            let key_header = view
                .group_by
                .map(|field| field.as_str().to_string())
                .unwrap_or_else(|| "key".to_string());
            let rows = view
                .entries
                .iter()
                .map(|entry| {
                    vec![
                        entry.key.clone(),
                        format_value(entry.value),
                        bar(entry.value, peak),
                    ]
                })
                .collect::<Vec<_>>();
            output.push_str(&render_aligned(
                &[key_header, view.op.to_string(), String::new()],
                &rows,
                &[Align::Left, Align::Right, Align::Left],
            ));
        }
    }
    output
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format_number(value)
    } else {
        format!("{value:.2}")
    }
}

fn bar(value: f64, peak: f64) -> String {
    if peak <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / peak) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(len.max(1))
}

fn looks_numeric(value: &str) -> bool {
    value.trim().parse::<f64>().is_ok()
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let cell = sanitize_cell(value);
            let padding = width.saturating_sub(display_width(&cell));
            match aligns.get(idx).copied().unwrap_or(Align::Left) {
                Align::Left => format!("{cell}{}", " ".repeat(padding)),
                Align::Right => format!("{}{cell}", " ".repeat(padding)),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::ViewEntry, alias::CanonicalField};

    #[test]
    fn numeric_columns_are_right_aligned() {
        let out = render_table(
            &["area".into(), "qty".into()],
            &[
                vec!["North".into(), "5".into()],
                vec!["South".into(), "120".into()],
            ],
        );
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "area   qty");
        assert_eq!(lines[1], "-----  ---");
        assert_eq!(lines[2], "North    5");
        assert_eq!(lines[3], "South  120");
    }

    #[test]
    fn embedded_newlines_are_flattened() {
        let out = render_table(&["note".into()], &[vec!["a\nb".into()]]);
        assert!(out.lines().any(|line| line == "a b"));
    }

    #[test]
    fn ready_view_draws_bars_relative_to_peak() {
        let view = ViewResult {
            name: "by_area".into(),
            label: "Total Quantity by Area".into(),
            op: "sum",
            group_by: Some(CanonicalField::Area),
            value_field: Some(CanonicalField::Quantity),
            status: ViewStatus::Ready,
            entries: vec![
                ViewEntry {
                    key: "North".into(),
                    value: 100.0,
                },
                ViewEntry {
                    key: "South".into(),
                    value: 0.0,
                },
            ],
        };
        let out = render_view(&view);
        assert!(out.starts_with("Total Quantity by Area [by_area]\n"));
        assert!(out.contains(&"#".repeat(BAR_WIDTH)));
        let south = out.lines().find(|line| line.starts_with("South")).unwrap();
        assert!(!south.contains('#'));
    }

    #[test]
    fn disabled_view_names_missing_fields() {
        let view = ViewResult {
            name: "trips".into(),
            label: "Distinct Trip Id by Truck".into(),
            op: "nunique",
            group_by: Some(CanonicalField::Truck),
            value_field: Some(CanonicalField::TripId),
            status: ViewStatus::Disabled {
                missing: vec![CanonicalField::TripId],
            },
            entries: Vec::new(),
        };
        assert!(render_view(&view).contains("(disabled: missing trip_id)"));
    }
}
