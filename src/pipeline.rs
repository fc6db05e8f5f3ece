//! Report Pipeline
//! Load, transform, aggregate, chart, write. Any error before the write
//! aborts the run without producing a document.

use crate::charts::{draw_scatter_3d, ChartPlotter};
use crate::config::ReportConfig;
use crate::data::{DataLoader, Observation, PanelTransformer};
use crate::report::{ChartSet, PreviewTable, ReportContent, ReportGenerator, ReportSummary};
use crate::stats::{fit_ols, StatsCalculator};
use anyhow::{Context, Result};
use tracing::{info, warn};

const REPORT_TITLE: &str = "Shall-issue laws and violent crime";

/// `(shall, log violent rate)` pairs with both values defined.
pub fn regression_pairs(observations: &[Observation]) -> Vec<(f64, f64)> {
    observations
        .iter()
        .filter_map(|o| Some((o.shall?, o.log_violent?)))
        .collect()
}

/// Build the report content without touching the output path.
pub fn build_report(config: &ReportConfig) -> Result<ReportContent> {
    let panel = DataLoader::load_csv(&config.input, &config.columns)
        .with_context(|| format!("loading {}", config.input.display()))?;

    let transformed = PanelTransformer::transform(&panel, config.year_offset)
        .context("transforming panel")?;

    let columns = transformed.columns();
    let observations = transformed.observations()?;
    let group_counts = transformed.group_counts()?;
    for count in &group_counts {
        info!(group = %count.group, states = count.states, rows = count.rows, "policy group");
    }

    let group_year_means = StatsCalculator::group_year_means(
        transformed.dataframe(),
        &columns.year,
        &columns.log_violent(),
    )
    .context("aggregating group-year means")?;
    let group_stats = StatsCalculator::compute_group_stats(&observations);

    let regression = fit_ols(&regression_pairs(&observations));
    match &regression {
        Some(fit) => info!(
            slope = fit.slope,
            intercept = fit.intercept,
            r_squared = fit.r_squared,
            "regression fitted"
        ),
        None => warn!("regression skipped, shall-issue indicator has no variance"),
    }

    let plotter = ChartPlotter::new(config.chart.width, config.chart.height);
    let charts = ChartSet {
        scatter_3d: draw_scatter_3d(&observations, plotter.size())?,
        group_means: plotter.draw_group_means(&group_year_means, None)?,
        group_means_with_points: plotter
            .draw_group_means(&group_year_means, Some(&observations))?,
        regression_plain: plotter.draw_regression(&observations, regression.as_ref(), false)?,
        regression_styled: plotter.draw_regression(&observations, regression.as_ref(), true)?,
    };
    info!("charts rendered");

    let summary = ReportSummary {
        source: panel.source().display().to_string(),
        rows: panel.row_count(),
        columns: panel.column_names(),
        year_offset: transformed.year_offset(),
        undefined_logs: transformed.undefined_logs(),
        repealed_states: transformed.repealed_states().to_vec(),
        group_counts,
        group_stats,
        group_year_means,
        regression,
    };

    Ok(ReportContent {
        title: REPORT_TITLE.to_string(),
        summary,
        preview: PreviewTable::from_dataframe(&transformed.preview(config.preview_rows)),
        charts,
    })
}

/// Run the whole pipeline and write the document to `config.output`.
pub fn run(config: &ReportConfig) -> Result<ReportSummary> {
    let content = build_report(config)?;
    ReportGenerator::write(&content, &config.output)
        .with_context(|| format!("writing {}", config.output.display()))?;
    Ok(content.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLoadError, PolicyGroup, TransformError};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_panel(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.join("guns.csv");
        let mut text = String::from("year,vio,mur,rob,incarc_rate,pop,stateid,shall\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn config_for(dir: &TempDir, input: std::path::PathBuf) -> ReportConfig {
        ReportConfig {
            input,
            output: dir.path().join("out").join("report.html"),
            ..ReportConfig::default()
        }
    }

    #[test]
    fn end_to_end_report() {
        let dir = TempDir::new().unwrap();
        let mut rows = Vec::new();
        for (state, law) in [(1, [0, 0, 0]), (2, [0, 1, 1]), (3, [1, 1, 1])] {
            for (i, shall) in law.iter().enumerate() {
                let vio = 300.0 + 100.0 * state as f64 - 40.0 * *shall as f64 + i as f64;
                rows.push(format!(
                    "{},{},{},{},100,4.5,{},{}",
                    77 + i,
                    vio,
                    vio / 40.0,
                    vio / 3.0,
                    state,
                    shall
                ));
            }
        }
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let config = config_for(&dir, write_panel(dir.path(), &rows));

        let summary = run(&config).unwrap();
        assert_eq!(summary.rows, 9);
        assert_eq!(summary.undefined_logs, 0);
        let counts: Vec<(PolicyGroup, usize)> = summary
            .group_counts
            .iter()
            .map(|c| (c.group, c.states))
            .collect();
        assert_eq!(
            counts,
            vec![
                (PolicyGroup::Always, 1),
                (PolicyGroup::Never, 1),
                (PolicyGroup::Transitioned, 1),
            ]
        );
        assert_eq!(summary.group_year_means.len(), 9);
        assert!(summary.group_year_means.iter().all(|m| m.year >= 1977));
        assert!(summary.regression.is_some());

        let html = fs::read_to_string(&config.output).unwrap();
        assert!(html.contains("<h3>First 9 rows</h3>"));
        assert_eq!(html.matches("<svg").count(), 5);
        assert!(html.contains("1977"));
    }

    #[test]
    fn preview_is_capped() {
        let dir = TempDir::new().unwrap();
        let rows: Vec<String> = (0..12)
            .map(|i| format!("{},500,5,100,100,4.5,{},{}", 77 + i, 1 + i % 2, i % 2))
            .collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let config = config_for(&dir, write_panel(dir.path(), &rows));

        let content = build_report(&config).unwrap();
        assert_eq!(content.preview.rows.len(), 10);
        assert_eq!(content.summary.rows, 12);
    }

    #[test]
    fn missing_input_aborts_without_output() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, dir.path().join("absent.csv"));

        let err = run(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataLoadError>(),
            Some(DataLoadError::NotFound(_))
        ));
        assert!(!config.output.exists());
    }

    #[test]
    fn unassigned_state_aborts_without_output() {
        let dir = TempDir::new().unwrap();
        let input = write_panel(
            dir.path(),
            &["77,500,5,100,100,4.5,1,0", "77,500,5,100,100,4.5,2,"],
        );
        let config = config_for(&dir, input);

        let err = run(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransformError>(),
            Some(TransformError::GroupAssignmentIncomplete { .. })
        ));
        assert!(!config.output.exists());
    }

    #[test]
    fn constant_indicator_skips_regression() {
        let dir = TempDir::new().unwrap();
        let input = write_panel(
            dir.path(),
            &["77,500,5,100,100,4.5,1,0", "78,510,5,100,100,4.5,1,0"],
        );
        let config = config_for(&dir, input);

        let content = build_report(&config).unwrap();
        assert!(content.summary.regression.is_none());
        assert!(!content.charts.regression_styled.contains("OLS: y ="));
    }

    #[test]
    fn constant_rate_gives_flat_regression() {
        let dir = TempDir::new().unwrap();
        let input = write_panel(
            dir.path(),
            &[
                "77,500,5,100,100,4.5,1,0",
                "78,500,5,100,100,4.5,1,0",
                "77,500,5,100,100,4.5,2,1",
                "78,500,5,100,100,4.5,2,1",
            ],
        );
        let config = config_for(&dir, input);

        let content = build_report(&config).unwrap();
        let fit = content.summary.regression.unwrap();
        assert_eq!(fit.slope, 0.0);
        assert!(!fit.p_value.is_nan());
        assert!(content.charts.regression_styled.contains("OLS: y ="));
    }
}
