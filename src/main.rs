//! Shall-Issue Report - panel analysis of concealed-carry laws and crime
//!
//! Loads a state-year panel, labels each state by its shall-issue history
//! and writes an HTML report with a table preview and charts.

mod charts;
mod config;
mod data;
mod pipeline;
mod report;
mod stats;

use anyhow::Context;
use clap::Parser;
use config::ReportConfig;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Shall-issue law vs. crime rate panel report.
#[derive(Parser, Debug)]
#[command(name = "shall-issue-report", version, about)]
struct Cli {
    /// Panel CSV (state id, two-digit year, vio/mur/rob rates, shall indicator)
    input: Option<PathBuf>,

    /// Output HTML document
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON settings file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Constant added to the year column
    #[arg(long)]
    year_offset: Option<i64>,

    /// Open the report with the system viewer when done
    #[arg(long)]
    open: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(ReportConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::from_file(path)?,
            None => ReportConfig::default(),
        };
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(offset) = self.year_offset {
            config.year_offset = offset;
        }
        Ok((config, self.open))
    }
}

fn main() -> anyhow::Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env).init();

    let (config, open_report) = Cli::parse().into_config()?;
    info!(
        input = %config.input.display(),
        output = %config.output.display(),
        "generating report"
    );

    let summary = pipeline::run(&config).context("report generation failed")?;
    info!(
        rows = summary.rows,
        buckets = summary.group_year_means.len(),
        "done"
    );

    if open_report {
        if let Err(err) = open::that(&config.output) {
            warn!(error = %err, "could not open report");
        }
    }

    Ok(())
}
