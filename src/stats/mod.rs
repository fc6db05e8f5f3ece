//! Stats module - aggregation, descriptive statistics and regression

mod calculator;
mod regression;

pub use calculator::{GroupStats, GroupYearMean, StatsCalculator};
pub use regression::{fit_ols, RegressionFit};
