//! Per-experiment summary statistics and box plots of result columns.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{BenchError, BenchResult};
use crate::record::COLUMNS;
use crate::store::ResultStore;

/// Distribution of one column for one experiment name.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two samples.
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

/// Percentile by linear interpolation between nearest ranks of sorted samples.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = pct / 100.0 * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
        }
    }
}

impl ColumnSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = sorted.len();
        let mean = if count == 0 {
            0.0
        } else {
            sorted.iter().sum::<f64>() / count as f64
        };
        let std = (count > 1).then(|| {
            let squares: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        });
        Self {
            count,
            mean,
            std,
            min: sorted.first().copied().unwrap_or(0.0),
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            max: sorted.last().copied().unwrap_or(0.0),
        }
    }
}

fn check_column(column: &str) -> BenchResult<()> {
    if column == "name" || !COLUMNS.contains(&column) {
        return Err(BenchError::UnknownColumn(format!(
            "{} (expected one of: {})",
            column,
            COLUMNS[1..].join(", ")
        )));
    }
    Ok(())
}

/// Samples of `column` grouped by experiment name, names in sorted order.
pub fn samples_by_name(
    store: &ResultStore,
    column: &str,
) -> BenchResult<BTreeMap<String, Vec<f64>>> {
    check_column(column)?;
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in store.all() {
        if let Some(value) = record.metric(column) {
            groups.entry(record.name.clone()).or_default().push(value);
        }
    }
    Ok(groups)
}

pub fn describe(
    store: &ResultStore,
    column: &str,
) -> BenchResult<Vec<(String, ColumnSummary)>> {
    Ok(samples_by_name(store, column)?
        .into_iter()
        .map(|(name, samples)| {
            let summary = ColumnSummary::from_samples(&samples);
            (name, summary)
        })
        .collect())
}

/// Text table of [`describe`] for printing.
pub fn format_summary(column: &str, rows: &[(String, ColumnSummary)]) -> String {
    let width = rows.iter().map(|(n, _)| n.len()).max().unwrap_or(4).max(4);
    let mut out = String::new();
    let _ = writeln!(out, "Summary for metric `{}`:", column);
    let _ = writeln!(
        out,
        "{:<width$} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "name", "count", "mean", "std", "min", "25%", "50%", "75%", "max",
    );
    for (name, s) in rows {
        let std = s
            .std
            .map(|v| format!("{:.6}", v))
            .unwrap_or_else(|| "NaN".to_string());
        let _ = writeln!(
            out,
            "{:<width$} {:>6} {:>12.6} {:>12} {:>12.6} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            name, s.count, s.mean, std, s.min, s.p25, s.p50, s.p75, s.max,
        );
    }
    out
}

const SVG_WIDTH: f64 = 760.0;
const LABEL_WIDTH: f64 = 160.0;
const RIGHT_MARGIN: f64 = 30.0;
const ROW_HEIGHT: f64 = 28.0;
const PANEL_HEADER: f64 = 30.0;
const PANEL_FOOTER: f64 = 34.0;

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_panel(
    svg: &mut String,
    top: f64,
    column: &str,
    groups: &BTreeMap<String, Vec<f64>>,
) {
    let plot_width = SVG_WIDTH - LABEL_WIDTH - RIGHT_MARGIN;
    let max_value = groups
        .values()
        .flatten()
        .copied()
        .fold(0.0_f64, f64::max);
    let x_max = if max_value > 0.0 { max_value * 1.05 } else { 1.0 };
    let x = |v: f64| LABEL_WIDTH + (v / x_max) * plot_width;
    let rows_height = ROW_HEIGHT * groups.len().max(1) as f64;
    let axis_y = top + PANEL_HEADER + rows_height;

    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" font-size="14" font-weight="bold">{}</text>"#,
        LABEL_WIDTH,
        top + 18.0,
        xml_escape(column)
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
        LABEL_WIDTH,
        axis_y,
        LABEL_WIDTH + plot_width,
        axis_y
    );
    for tick in 0..=5 {
        let value = x_max * tick as f64 / 5.0;
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="10" text-anchor="middle">{}</text>"#,
            x(value),
            axis_y + 14.0,
            format_tick(value)
        );
    }

    for (i, (name, samples)) in groups.iter().enumerate() {
        let s = ColumnSummary::from_samples(samples);
        let center = top + PANEL_HEADER + ROW_HEIGHT * (i as f64 + 0.5);
        let half = ROW_HEIGHT * 0.3;
        let iqr = s.p75 - s.p25;
        let lo_fence = s.p25 - 1.5 * iqr;
        let hi_fence = s.p75 + 1.5 * iqr;
        let inside = samples.iter().copied().filter(|v| *v >= lo_fence && *v <= hi_fence);
        let whisker_lo = inside.clone().fold(s.p25, f64::min);
        let whisker_hi = inside.fold(s.p75, f64::max);

        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{}</text>"#,
            LABEL_WIDTH - 8.0,
            center + 4.0,
            xml_escape(name)
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
            x(whisker_lo),
            center,
            x(whisker_hi),
            center
        );
        let _ = writeln!(
            svg,
            r##"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="#8fb8de" stroke="black"/>"##,
            x(s.p25),
            center - half,
            (x(s.p75) - x(s.p25)).max(1.0),
            half * 2.0
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black" stroke-width="2"/>"#,
            x(s.p50),
            center - half,
            x(s.p50),
            center + half
        );
        for outlier in samples.iter().filter(|v| **v < lo_fence || **v > hi_fence) {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="2.5" fill="none" stroke="black"/>"#,
                x(*outlier),
                center
            );
        }
    }
}

fn format_tick(value: f64) -> String {
    if value >= 100.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// SVG document with one horizontal box plot panel per column; each panel's
/// axis starts at zero.
pub fn render_boxplot_svg<S: AsRef<str>>(
    store: &ResultStore,
    columns: &[S],
) -> BenchResult<String> {
    let mut panels = Vec::new();
    for column in columns {
        let column = column.as_ref();
        panels.push((column, samples_by_name(store, column)?));
    }
    let panel_height = |groups: &BTreeMap<String, Vec<f64>>| {
        PANEL_HEADER + ROW_HEIGHT * groups.len().max(1) as f64 + PANEL_FOOTER
    };
    let height: f64 = panels.iter().map(|(_, g)| panel_height(g)).sum::<f64>() + 10.0;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" font-family="sans-serif">"#,
        SVG_WIDTH, height
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let mut top = 5.0;
    for (column, groups) in &panels {
        render_panel(&mut svg, top, column, groups);
        top += panel_height(groups);
    }
    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Write the box plots for `columns` to `output` and return the printable
/// summaries, one block per column.
pub fn plot<S: AsRef<str>>(
    store: &ResultStore,
    columns: &[S],
    output: &Path,
) -> BenchResult<String> {
    let svg = render_boxplot_svg(store, columns)?;
    fs::write(output, svg)?;
    let mut text = String::new();
    for column in columns {
        let column = column.as_ref();
        text.push_str(&format_summary(column, &describe(store, column)?));
    }
    Ok(text)
}
