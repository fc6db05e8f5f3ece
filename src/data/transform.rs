//! Panel Transform Module
//! Log rates, four-digit years and policy-exposure groups.
//!
//! Every step takes an immutable `DataFrame` and returns a new one, so the
//! loaded panel is never touched and each step can be tested on its own.

use crate::config::ColumnMap;
use crate::data::group::{GroupAssigner, PolicyGroup};
use crate::data::loader::PanelFrame;
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the derived group column.
pub const GROUP_COLUMN: &str = "group";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Year {year} is already >= offset {offset}; years were normalized before")]
    YearAlreadyNormalized { year: i64, offset: i64 },
    #[error("State id column '{column}' has {rows} empty values")]
    MissingStateId { column: String, rows: usize },
    #[error("Group assignment incomplete, no valid shall-issue indicator for states: {}", .states.join(", "))]
    GroupAssignmentIncomplete { states: Vec<String> },
}

/// One state-year row as consumed by the charts and the report.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub state: String,
    /// None when the year cell is empty; such rows are left off the charts.
    pub year: Option<i64>,
    pub shall: Option<f64>,
    pub log_violent: Option<f64>,
    pub group: PolicyGroup,
}

/// Number of states and rows in one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub group: PolicyGroup,
    pub states: usize,
    pub rows: usize,
}

/// Panel after the one-time transform. Only reachable through
/// `PanelTransformer::transform`, so the year offset cannot be applied twice.
#[derive(Debug, Clone)]
pub struct TransformedPanel {
    df: DataFrame,
    columns: ColumnMap,
    year_offset: i64,
    undefined_logs: usize,
    repealed_states: Vec<String>,
}

impl TransformedPanel {
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn year_offset(&self) -> i64 {
        self.year_offset
    }

    /// Log values left null because the source rate was not positive.
    pub fn undefined_logs(&self) -> usize {
        self.undefined_logs
    }

    pub fn repealed_states(&self) -> &[String] {
        &self.repealed_states
    }

    /// First `n` rows for the report preview.
    pub fn preview(&self, n: usize) -> DataFrame {
        self.df.head(Some(n))
    }

    /// Typed view of the columns the charts need.
    pub fn observations(&self) -> Result<Vec<Observation>, TransformError> {
        let states = PanelTransformer::state_keys(&self.df, &self.columns.state)?;

        let year_col = self.df.column(&self.columns.year)?.cast(&DataType::Int64)?;
        let shall_col = self.df.column(&self.columns.shall)?.cast(&DataType::Float64)?;
        let log_col = self
            .df
            .column(&self.columns.log_violent())?
            .cast(&DataType::Float64)?;
        let group_col = self.df.column(GROUP_COLUMN)?.cast(&DataType::Int64)?;

        let observations = states
            .into_iter()
            .zip(year_col.i64()?.into_iter())
            .zip(shall_col.f64()?.into_iter())
            .zip(log_col.f64()?.into_iter())
            .zip(group_col.i64()?.into_iter())
            .map(|((((state, year), shall), log_violent), group)| Observation {
                state,
                year,
                shall,
                log_violent,
                group: group
                    .and_then(PolicyGroup::from_code)
                    .unwrap_or(PolicyGroup::Unassigned),
            })
            .collect();

        Ok(observations)
    }

    /// States and rows per assigned group, in group code order.
    pub fn group_counts(&self) -> Result<Vec<GroupCount>, TransformError> {
        let mut states: BTreeMap<PolicyGroup, BTreeSet<String>> = BTreeMap::new();
        let mut rows: BTreeMap<PolicyGroup, usize> = BTreeMap::new();

        for obs in self.observations()? {
            *rows.entry(obs.group).or_default() += 1;
            states.entry(obs.group).or_default().insert(obs.state);
        }

        Ok(PolicyGroup::ASSIGNED
            .iter()
            .map(|&group| GroupCount {
                group,
                states: states.get(&group).map(BTreeSet::len).unwrap_or(0),
                rows: rows.get(&group).copied().unwrap_or(0),
            })
            .collect())
    }
}

/// Handles the panel transform steps.
pub struct PanelTransformer;

impl PanelTransformer {
    /// Run all steps once: log rates, year offset, group labels.
    pub fn transform(
        panel: &PanelFrame,
        year_offset: i64,
    ) -> Result<TransformedPanel, TransformError> {
        let columns = panel.columns();

        let (df, undefined_logs) = Self::add_log_rates(panel.dataframe(), columns)?;
        if undefined_logs > 0 {
            warn!(
                rows = undefined_logs,
                "non-positive or missing rates, log values left null"
            );
        }

        let df = Self::normalize_years(&df, &columns.year, year_offset)?;
        let (df, repealed_states) = Self::assign_groups(&df, columns)?;

        info!(
            rows = df.height(),
            columns = df.width(),
            year_offset,
            "panel transformed"
        );

        Ok(TransformedPanel {
            df,
            columns: columns.clone(),
            year_offset,
            undefined_logs,
            repealed_states,
        })
    }

    /// Natural log of a rate; null when the rate is missing or not positive.
    pub fn log_rate(rate: Option<f64>) -> Option<f64> {
        rate.filter(|v| *v > 0.0).map(f64::ln)
    }

    /// Append `log_<rate>` for each rate column. Also returns how many log
    /// values ended up null.
    pub fn add_log_rates(
        df: &DataFrame,
        columns: &ColumnMap,
    ) -> Result<(DataFrame, usize), TransformError> {
        let mut out = df.clone();
        let mut undefined = 0;

        for rate_col in columns.rate_columns() {
            let rate = df.column(rate_col)?.cast(&DataType::Float64)?;
            let logs: Vec<Option<f64>> = rate
                .f64()?
                .into_iter()
                .map(Self::log_rate)
                .collect();
            undefined += logs.iter().filter(|v| v.is_none()).count();

            let name = ColumnMap::log_column(rate_col);
            debug!(column = %name, "adding log column");
            out.with_column(Column::new(name.into(), logs))?;
        }

        Ok((out, undefined))
    }

    /// Add `offset` to every year. Years already at or past the offset mean
    /// the table was normalized before.
    pub fn normalize_years(
        df: &DataFrame,
        year_col: &str,
        offset: i64,
    ) -> Result<DataFrame, TransformError> {
        let years = df.column(year_col)?.cast(&DataType::Int64)?;
        let years = years.i64()?;

        if offset > 0 {
            if let Some(year) = years.into_iter().flatten().find(|y| *y >= offset) {
                return Err(TransformError::YearAlreadyNormalized { year, offset });
            }
        }

        let shifted: Vec<Option<i64>> = years.into_iter().map(|y| y.map(|y| y + offset)).collect();

        let mut out = df.clone();
        out.with_column(Column::new(year_col.into(), shifted))?;
        Ok(out)
    }

    /// Append the `group` column. Returns the states that started out
    /// shall-issue and later show a 0 indicator.
    pub fn assign_groups(
        df: &DataFrame,
        columns: &ColumnMap,
    ) -> Result<(DataFrame, Vec<String>), TransformError> {
        let states = Self::state_keys(df, &columns.state)?;
        let shall = df.column(&columns.shall)?.cast(&DataType::Float64)?;
        let indicators: Vec<Option<f64>> = shall.f64()?.into_iter().collect();

        let assignment = GroupAssigner::assign(&states, &indicators);

        if !assignment.unassigned.is_empty() {
            return Err(TransformError::GroupAssignmentIncomplete {
                states: assignment.unassigned,
            });
        }
        if !assignment.repealed.is_empty() {
            warn!(
                states = ?assignment.repealed,
                "shall-issue law dropped after first year, kept in always group"
            );
        }

        let codes: Vec<i32> = assignment.groups.iter().map(|g| g.code()).collect();
        let mut out = df.clone();
        out.with_column(Column::new(GROUP_COLUMN.into(), codes))?;
        Ok((out, assignment.repealed))
    }

    /// State ids as text, whatever their dtype in the file. Empty ids are
    /// an error rather than a shared pseudo-state.
    fn state_keys(df: &DataFrame, state_col: &str) -> Result<Vec<String>, TransformError> {
        let states = df.column(state_col)?.cast(&DataType::String)?;
        let states = states.str()?;
        if states.null_count() > 0 {
            return Err(TransformError::MissingStateId {
                column: state_col.to_string(),
                rows: states.null_count(),
            });
        }
        Ok(states
            .into_iter()
            .flatten()
            .map(|v| v.trim_matches('"').to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::DataLoader;
    use std::path::Path;

    /// States A (never), B (transitioned), C (always), years 77-79.
    fn scenario_panel() -> PanelFrame {
        let df = df!(
            "stateid" => [1i64, 1, 1, 2, 2, 2, 3, 3, 3],
            "year" => [77i64, 78, 79, 77, 78, 79, 77, 78, 79],
            "vio" => [400.0, 410.0, 420.0, 300.0, 310.0, 320.0, 200.0, 210.0, 220.0],
            "mur" => [10.0, 11.0, 12.0, 5.0, 6.0, 7.0, 2.0, 3.0, 4.0],
            "rob" => [90.0, 95.0, 99.0, 60.0, 61.0, 62.0, 30.0, 31.0, 32.0],
            "shall" => [0i64, 0, 0, 0, 1, 1, 1, 1, 1],
            "density" => [0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.3, 0.3, 0.3],
        )
        .unwrap();
        DataLoader::from_dataframe(df, Path::new("mem"), &ColumnMap::default()).unwrap()
    }

    fn groups_of(panel: &TransformedPanel) -> Vec<PolicyGroup> {
        panel
            .observations()
            .unwrap()
            .into_iter()
            .map(|o| o.group)
            .collect()
    }

    #[test]
    fn scenario_groups() {
        let panel = PanelTransformer::transform(&scenario_panel(), 1900).unwrap();
        let groups = groups_of(&panel);
        assert_eq!(&groups[0..3], &[PolicyGroup::Never; 3]);
        assert_eq!(&groups[3..6], &[PolicyGroup::Transitioned; 3]);
        assert_eq!(&groups[6..9], &[PolicyGroup::Always; 3]);

        let counts = panel.group_counts().unwrap();
        assert_eq!(
            counts,
            vec![
                GroupCount { group: PolicyGroup::Always, states: 1, rows: 3 },
                GroupCount { group: PolicyGroup::Never, states: 1, rows: 3 },
                GroupCount { group: PolicyGroup::Transitioned, states: 1, rows: 3 },
            ]
        );
    }

    #[test]
    fn years_shifted_by_offset_once() {
        let source = scenario_panel();
        let panel = PanelTransformer::transform(&source, 1900).unwrap();
        let years: Vec<i64> = panel
            .observations()
            .unwrap()
            .iter()
            .filter_map(|o| o.year)
            .collect();
        assert_eq!(years, vec![1977, 1978, 1979, 1977, 1978, 1979, 1977, 1978, 1979]);

        // the loaded panel is untouched
        let raw = source.dataframe().column("year").unwrap().i64().unwrap().get(0);
        assert_eq!(raw, Some(77));

        let again = PanelTransformer::normalize_years(panel.dataframe(), "year", 1900);
        assert!(matches!(
            again,
            Err(TransformError::YearAlreadyNormalized { year: 1977, offset: 1900 })
        ));
    }

    #[test]
    fn log_columns_recompute_exactly() {
        let panel = PanelTransformer::transform(&scenario_panel(), 1900).unwrap();
        let df = panel.dataframe();

        for rate_col in ["vio", "mur", "rob"] {
            let rates: Vec<Option<f64>> =
                df.column(rate_col).unwrap().f64().unwrap().into_iter().collect();
            let logs: Vec<Option<f64>> = df
                .column(&ColumnMap::log_column(rate_col))
                .unwrap()
                .f64()
                .unwrap()
                .into_iter()
                .collect();
            for (rate, log) in rates.into_iter().zip(logs.into_iter()) {
                assert_eq!(PanelTransformer::log_rate(rate), log);
                assert!((log.unwrap().exp() - rate.unwrap()).abs() < 1e-9);
            }
        }

        let second = PanelTransformer::transform(&scenario_panel(), 1900).unwrap();
        assert!(panel.dataframe().equals_missing(second.dataframe()));
    }

    #[test]
    fn non_positive_rates_give_null_logs() {
        assert_eq!(PanelTransformer::log_rate(Some(0.0)), None);
        assert_eq!(PanelTransformer::log_rate(Some(-3.0)), None);
        assert_eq!(PanelTransformer::log_rate(None), None);

        let df = df!(
            "stateid" => [1i64, 1],
            "year" => [77i64, 78],
            "vio" => [0.0, 10.0],
            "mur" => [1.0, 1.0],
            "rob" => [1.0, -1.0],
            "shall" => [0i64, 0],
        )
        .unwrap();
        let source = DataLoader::from_dataframe(df, Path::new("mem"), &ColumnMap::default())
            .unwrap();
        let panel = PanelTransformer::transform(&source, 1900).unwrap();
        assert_eq!(panel.undefined_logs(), 2);
        assert_eq!(panel.observations().unwrap()[0].log_violent, None);
    }

    #[test]
    fn state_without_valid_indicator_is_an_error() {
        let df = df!(
            "stateid" => ["AL", "AL", "AK"],
            "year" => [77i64, 78, 77],
            "vio" => [1.0, 2.0, 3.0],
            "mur" => [1.0, 2.0, 3.0],
            "rob" => [1.0, 2.0, 3.0],
            "shall" => [0.0, 0.0, 5.0],
        )
        .unwrap();
        let source = DataLoader::from_dataframe(df, Path::new("mem"), &ColumnMap::default())
            .unwrap();

        match PanelTransformer::transform(&source, 1900) {
            Err(TransformError::GroupAssignmentIncomplete { states }) => {
                assert_eq!(states, vec!["AK".to_string()]);
            }
            other => panic!("expected incomplete assignment, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_year_stays_empty_and_counts() {
        let df = df!(
            "stateid" => [1i64, 1, 2],
            "year" => [Some(77i64), None, Some(77)],
            "vio" => [1.0, 2.0, 3.0],
            "mur" => [1.0, 2.0, 3.0],
            "rob" => [1.0, 2.0, 3.0],
            "shall" => [0i64, 0, 1],
        )
        .unwrap();
        let source = DataLoader::from_dataframe(df, Path::new("mem"), &ColumnMap::default())
            .unwrap();
        let panel = PanelTransformer::transform(&source, 1900).unwrap();

        let years: Vec<Option<i64>> =
            panel.observations().unwrap().iter().map(|o| o.year).collect();
        assert_eq!(years, vec![Some(1977), None, Some(1977)]);

        let never = panel.group_counts().unwrap()[1];
        assert_eq!(never, GroupCount { group: PolicyGroup::Never, states: 1, rows: 2 });
    }

    #[test]
    fn empty_state_id_is_an_error() {
        let df = df!(
            "stateid" => [Some("null"), None],
            "shall" => [0.0, 1.0],
        )
        .unwrap();
        let columns = ColumnMap::default();
        match PanelTransformer::assign_groups(&df, &columns) {
            Err(TransformError::MissingStateId { rows, .. }) => assert_eq!(rows, 1),
            other => panic!("expected missing state id, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn covariates_pass_through() {
        let panel = PanelTransformer::transform(&scenario_panel(), 1900).unwrap();
        let names: Vec<String> = panel
            .dataframe()
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for expected in ["density", "log_vio", "log_mur", "log_rob", GROUP_COLUMN] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(panel.preview(4).height(), 4);
    }
}
