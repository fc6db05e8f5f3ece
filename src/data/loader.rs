//! Panel CSV Loader Module
//! Reads the state-year panel with Polars and checks the fixed schema.

use crate::config::ColumnMap;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Input file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to load CSV: {0}")]
    Csv(#[from] PolarsError),
    #[error("Required column '{0}' is missing")]
    MissingColumn(String),
    #[error("Column '{column}' must be numeric, found {dtype}")]
    NonNumericColumn { column: String, dtype: String },
    #[error("State id column '{column}' has {rows} empty values")]
    MissingStateId { column: String, rows: usize },
    #[error("Input file has no rows")]
    Empty,
}

/// Loaded panel, one row per state-year observation.
#[derive(Debug, Clone)]
pub struct PanelFrame {
    df: DataFrame,
    source: PathBuf,
    columns: ColumnMap,
}

impl PanelFrame {
    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn row_count(&self) -> usize {
        self.df.height()
    }

    /// Column names in file order, pass-through covariates included.
    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Handles panel loading and schema checks.
pub struct DataLoader;

impl DataLoader {
    /// Load the panel CSV at `path`.
    pub fn load_csv(path: &Path, columns: &ColumnMap) -> Result<PanelFrame, DataLoadError> {
        if !path.is_file() {
            return Err(DataLoadError::NotFound(path.to_path_buf()));
        }

        info!(path = %path.display(), "reading panel csv");
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(10000))
            .finish()?
            .collect()?;

        Self::from_dataframe(df, path, columns)
    }

    /// Validate an in-memory table against the column map and coerce the
    /// required columns to their working dtypes.
    pub fn from_dataframe(
        df: DataFrame,
        source: &Path,
        columns: &ColumnMap,
    ) -> Result<PanelFrame, DataLoadError> {
        if df.height() == 0 {
            return Err(DataLoadError::Empty);
        }

        for name in [
            &columns.state,
            &columns.year,
            &columns.violent,
            &columns.murder,
            &columns.robbery,
            &columns.shall,
        ] {
            if df.column(name).is_err() {
                return Err(DataLoadError::MissingColumn(name.clone()));
            }
        }

        let missing_states = df.column(&columns.state)?.null_count();
        if missing_states > 0 {
            return Err(DataLoadError::MissingStateId {
                column: columns.state.clone(),
                rows: missing_states,
            });
        }

        let mut df = df;

        let year = Self::numeric_column(&df, &columns.year)?.cast(&DataType::Int64)?;
        df.with_column(year)?;

        for rate_col in columns.rate_columns() {
            let rate = Self::numeric_column(&df, rate_col)?.cast(&DataType::Float64)?;
            df.with_column(rate)?;
        }

        let shall = Self::indicator_column(&df, &columns.shall)?;
        df.with_column(shall)?;

        info!(
            rows = df.height(),
            columns = df.width(),
            "panel loaded"
        );

        Ok(PanelFrame {
            df,
            source: source.to_path_buf(),
            columns: columns.clone(),
        })
    }

    fn numeric_column(df: &DataFrame, name: &str) -> Result<Column, DataLoadError> {
        let column = df.column(name)?;
        if Self::is_numeric(column.dtype()) {
            Ok(column.clone())
        } else {
            Err(DataLoadError::NonNumericColumn {
                column: name.to_string(),
                dtype: column.dtype().to_string(),
            })
        }
    }

    /// The shall-issue indicator as Float64. Text encodings (yes/no,
    /// true/false) map to 1/0; anything unrecognised becomes null.
    fn indicator_column(df: &DataFrame, name: &str) -> Result<Column, DataLoadError> {
        let column = df.column(name)?;
        if Self::is_numeric(column.dtype()) {
            return Ok(column.cast(&DataType::Float64)?);
        }

        match column.dtype() {
            DataType::String => {
                debug!(column = name, "mapping text shall-issue indicator");
                let values: Vec<Option<f64>> = column
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(Self::parse_indicator))
                    .collect();
                Ok(Column::new(name.into(), values))
            }
            DataType::Boolean => Ok(column.cast(&DataType::Float64)?),
            other => Err(DataLoadError::NonNumericColumn {
                column: name.to_string(),
                dtype: other.to_string(),
            }),
        }
    }

    fn parse_indicator(raw: &str) -> Option<f64> {
        match raw.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" => Some(1.0),
            "0" | "no" | "false" => Some(0.0),
            _ => None,
        }
    }

    fn is_numeric(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Float32
                | DataType::Float64
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }
}
