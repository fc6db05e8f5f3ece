//! Statistics Calculator Module
//! Per-group descriptive statistics and (group, year) mean aggregation.

use crate::data::{Observation, PolicyGroup, GROUP_COLUMN};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Descriptive statistics of log violent rate for one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub group: PolicyGroup,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation, 0 for a single value.
    pub std: f64,
    pub p05: f64,
    pub p95: f64,
}

impl GroupStats {
    /// None for an empty sample.
    pub fn from_values(group: PolicyGroup, values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n == 0 {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let ss: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum();
        let std = if n > 1 { (ss / (n - 1) as f64).sqrt() } else { 0.0 };

        Some(Self {
            group,
            count: n,
            mean,
            median: quantile(&sorted, 0.5),
            std,
            p05: quantile(&sorted, 0.05),
            p95: quantile(&sorted, 0.95),
        })
    }
}

/// Linearly interpolated quantile of a non-empty sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// Mean of the value column within one (group, year) bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupYearMean {
    pub group: PolicyGroup,
    pub year: i64,
    pub mean: f64,
    pub count: usize,
}

/// Handles statistical calculations.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Descriptive statistics of log violent rate for each assigned group
    /// that has at least one defined value.
    pub fn compute_group_stats(observations: &[Observation]) -> Vec<GroupStats> {
        PolicyGroup::ASSIGNED
            .iter()
            .filter_map(|&group| {
                let values: Vec<f64> = observations
                    .iter()
                    .filter(|o| o.group == group)
                    .filter_map(|o| o.log_violent)
                    .collect();
                GroupStats::from_values(group, &values)
            })
            .collect()
    }

    /// Mean of `value_col` per (`group`, `year_col`) bucket, sorted by group
    /// then year. Null values are left out; buckets without any value are
    /// absent from the output.
    pub fn group_year_means(
        df: &DataFrame,
        year_col: &str,
        value_col: &str,
    ) -> Result<Vec<GroupYearMean>, StatsError> {
        let agg = df
            .clone()
            .lazy()
            .filter(col(value_col).is_not_null())
            .group_by([col(GROUP_COLUMN), col(year_col)])
            .agg([
                col(value_col).mean().alias("mean"),
                col(value_col).count().alias("count"),
            ])
            .collect()?;

        let groups = agg.column(GROUP_COLUMN)?.cast(&DataType::Int64)?;
        let years = agg.column(year_col)?.cast(&DataType::Int64)?;
        let means = agg.column("mean")?.cast(&DataType::Float64)?;
        let counts = agg.column("count")?.cast(&DataType::Int64)?;

        let mut buckets: Vec<GroupYearMean> = groups
            .i64()?
            .into_iter()
            .zip(years.i64()?.into_iter())
            .zip(means.f64()?.into_iter())
            .zip(counts.i64()?.into_iter())
            .filter_map(|(((group, year), mean), count)| {
                Some(GroupYearMean {
                    group: PolicyGroup::from_code(group?)?,
                    year: year?,
                    mean: mean?,
                    count: count? as usize,
                })
            })
            .collect();

        buckets.sort_by_key(|b| (b.group, b.year));
        debug!(buckets = buckets.len(), "aggregated group-year means");
        Ok(buckets)
    }
}
