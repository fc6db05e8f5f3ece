//! HTML Report Generator Module
//! Writes the table preview, summaries and SVG charts into one HTML file.
//!
//! Sections appear in a fixed order: load summary, transform summary,
//! 3D plot, group means, group means with observations, regression.

use crate::data::GroupCount;
use crate::stats::{GroupStats, GroupYearMean, RegressionFit};
use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the report states in numbers. Also embedded as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub source: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub year_offset: i64,
    pub undefined_logs: usize,
    pub repealed_states: Vec<String>,
    pub group_counts: Vec<GroupCount>,
    pub group_stats: Vec<GroupStats>,
    pub group_year_means: Vec<GroupYearMean>,
    pub regression: Option<RegressionFit>,
}

/// Header and stringified cells of the first transformed rows.
#[derive(Debug, Clone, Default)]
pub struct PreviewTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PreviewTable {
    pub fn from_dataframe(df: &DataFrame) -> Self {
        let headers = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = (0..df.height())
            .map(|i| {
                df.get_columns()
                    .iter()
                    .map(|col| match col.get(i) {
                        Ok(AnyValue::Null) | Err(_) => String::new(),
                        Ok(AnyValue::Float64(v)) => format!("{:.4}", v),
                        Ok(val) => val.to_string().trim_matches('"').to_string(),
                    })
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }
}

/// Rendered SVG documents, one per chart.
#[derive(Debug, Clone, Default)]
pub struct ChartSet {
    pub scatter_3d: String,
    pub group_means: String,
    pub group_means_with_points: String,
    pub regression_plain: String,
    pub regression_styled: String,
}

/// Input of one report render.
#[derive(Debug, Clone)]
pub struct ReportContent {
    pub title: String,
    pub summary: ReportSummary,
    pub preview: PreviewTable,
    pub charts: ChartSet,
}

/// HTML report generator
pub struct ReportGenerator;

impl ReportGenerator {
    /// Render the full document.
    pub fn render(content: &ReportContent) -> Result<String, ReportError> {
        let summary = &content.summary;
        let title = escape_html(&content.title);

        let mut html = String::new();
        html.push_str(&Self::head_html(&title));
        html.push_str(&format!("<h1>{}</h1>\n", title));

        // 1. Loaded data
        html.push_str(&Self::load_section(summary));

        // 2. Transform summary + preview
        html.push_str(&Self::transform_section(summary, &content.preview));

        // 3-5. Charts
        html.push_str(&Self::chart_section(
            "scatter-3d",
            "Observations by state and year",
            &[&content.charts.scatter_3d],
        ));
        html.push_str(&Self::chart_section(
            "group-means",
            "Mean log violent rate by policy group",
            &[&content.charts.group_means],
        ));
        html.push_str(&Self::chart_section(
            "group-means-points",
            "Group means with observations",
            &[&content.charts.group_means_with_points],
        ));

        // 6. Regression
        html.push_str(&Self::chart_section(
            "regression",
            "Shall-issue vs. log violent rate",
            &[
                &content.charts.regression_plain,
                &content.charts.regression_styled,
            ],
        ));
        html.push_str(&Self::regression_table(summary.regression.as_ref()));

        // Machine-readable copy; "</" would end the script element early.
        let json = serde_json::to_string_pretty(summary)?.replace("</", "<\\/");
        html.push_str(&format!(
            "<script type=\"application/json\" id=\"report-summary\">\n{}\n</script>\n",
            json
        ));

        html.push_str("</body>\n</html>\n");
        Ok(html)
    }

    /// Render and write the document to `output_path`.
    pub fn write(content: &ReportContent, output_path: &Path) -> Result<(), ReportError> {
        let html = Self::render(content)?;
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(output_path, html.as_bytes())?;

        info!(
            path = %output_path.display(),
            bytes = html.len(),
            "report written"
        );
        Ok(())
    }

    fn head_html(title: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{}</title>
<style>
body {{ font-family: sans-serif; margin: 2em auto; max-width: 1100px; color: #222; }}
table {{ border-collapse: collapse; margin: 1em 0; font-size: 0.85em; }}
th, td {{ border: 1px solid #bbb; padding: 3px 8px; text-align: right; }}
th {{ background: #eee; }}
section {{ margin-bottom: 2.5em; }}
.chart svg {{ max-width: 100%; height: auto; }}
.warn {{ color: #9c0006; }}
</style>
</head>
<body>
"#,
            title
        )
    }

    fn load_section(summary: &ReportSummary) -> String {
        format!(
            r#"<section id="load">
<h2>Data</h2>
<p>Source: <code>{}</code></p>
<p>{} observations, {} columns: {}</p>
</section>
"#,
            escape_html(&summary.source),
            summary.rows,
            summary.columns.len(),
            escape_html(&summary.columns.join(", "))
        )
    }

    fn transform_section(summary: &ReportSummary, preview: &PreviewTable) -> String {
        let mut html = String::from("<section id=\"transform\">\n<h2>Transformed panel</h2>\n");

        html.push_str(&format!(
            "<p>Years shifted by {}. Log columns added for the three rate series.</p>\n",
            summary.year_offset
        ));
        if summary.undefined_logs > 0 {
            html.push_str(&format!(
                "<p class=\"warn\">{} log values undefined (rate not positive), left empty.</p>\n",
                summary.undefined_logs
            ));
        }
        if !summary.repealed_states.is_empty() {
            html.push_str(&format!(
                "<p class=\"warn\">Shall-issue dropped after the first year in states: {}</p>\n",
                escape_html(&summary.repealed_states.join(", "))
            ));
        }

        html.push_str(&format!("<h3>First {} rows</h3>\n", preview.rows.len()));
        html.push_str(&table_html(&preview.headers, &preview.rows));

        html.push_str("<h3>Policy groups</h3>\n");
        let headers = ["Code", "Group", "States", "Rows"].map(String::from);
        let rows: Vec<Vec<String>> = summary
            .group_counts
            .iter()
            .map(|c| {
                vec![
                    c.group.code().to_string(),
                    c.group.label().to_string(),
                    c.states.to_string(),
                    c.rows.to_string(),
                ]
            })
            .collect();
        html.push_str(&table_html(&headers, &rows));

        html.push_str("<h3>log(violent rate) by group</h3>\n");
        let headers = ["Group", "N", "Mean", "Median", "Std", "P05", "P95"].map(String::from);
        let rows: Vec<Vec<String>> = summary
            .group_stats
            .iter()
            .map(|gs| {
                vec![
                    gs.group.label().to_string(),
                    gs.count.to_string(),
                    format_number(gs.mean),
                    format_number(gs.median),
                    format_number(gs.std),
                    format_number(gs.p05),
                    format_number(gs.p95),
                ]
            })
            .collect();
        html.push_str(&table_html(&headers, &rows));

        html.push_str("</section>\n");
        html
    }

    fn chart_section(id: &str, heading: &str, svgs: &[&String]) -> String {
        let mut html = format!(
            "<section id=\"{}\">\n<h2>{}</h2>\n",
            id,
            escape_html(heading)
        );
        for svg in svgs {
            html.push_str("<div class=\"chart\">\n");
            html.push_str(svg);
            html.push_str("\n</div>\n");
        }
        html.push_str("</section>\n");
        html
    }

    fn regression_table(fit: Option<&RegressionFit>) -> String {
        let Some(fit) = fit else {
            return "<p class=\"warn\">Regression not fitted: shall-issue indicator has no variance.</p>\n"
                .to_string();
        };

        let headers = ["Term", "Estimate", "Std. error", "t", "p"].map(String::from);
        let rows = vec![
            vec![
                "Intercept".to_string(),
                format_number(fit.intercept),
                String::new(),
                String::new(),
                String::new(),
            ],
            vec![
                "shall".to_string(),
                format_number(fit.slope),
                format_number(fit.slope_std_error),
                format_number(fit.t_statistic),
                format_number(fit.p_value),
            ],
        ];

        format!(
            "{}<p>n = {}, R² = {}, residual std. error = {}</p>\n",
            table_html(&headers, &rows),
            fit.n,
            format_number(fit.r_squared),
            format_number(fit.residual_std_error)
        )
    }
}

fn table_html(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut html = String::from("<table>\n<tr>");
    for h in headers {
        html.push_str(&format!("<th>{}</th>", escape_html(h)));
    }
    html.push_str("</tr>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

fn format_number(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else if v != 0.0 && v.abs() < 1e-4 {
        format!("{:.3e}", v)
    } else {
        format!("{:.4}", v)
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
