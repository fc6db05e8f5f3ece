//! Report Configuration Module
//! Column mapping, transform settings and output options, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Offset added to the two-digit year field (77 -> 1977).
pub const DEFAULT_YEAR_OFFSET: i64 = 1900;

/// Number of transformed rows shown in the report preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Physical column names in the input panel file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub state: String,
    pub year: String,
    pub violent: String,
    pub murder: String,
    pub robbery: String,
    pub shall: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            state: "stateid".to_string(),
            year: "year".to_string(),
            violent: "vio".to_string(),
            murder: "mur".to_string(),
            robbery: "rob".to_string(),
            shall: "shall".to_string(),
        }
    }
}

impl ColumnMap {
    /// The three rate columns that get a log transform.
    pub fn rate_columns(&self) -> [&str; 3] {
        [&self.violent, &self.murder, &self.robbery]
    }

    /// Name of the log column derived from a rate column.
    pub fn log_column(rate_col: &str) -> String {
        format!("log_{}", rate_col)
    }

    pub fn log_violent(&self) -> String {
        Self::log_column(&self.violent)
    }
}

/// Chart canvas size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartSize {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
        }
    }
}

/// Full report settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub year_offset: i64,
    pub preview_rows: usize,
    pub columns: ColumnMap,
    pub chart: ChartSize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/guns.csv"),
            output: PathBuf::from("shall_issue_report.html"),
            year_offset: DEFAULT_YEAR_OFFSET,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            columns: ColumnMap::default(),
            chart: ChartSize::default(),
        }
    }
}

impl ReportConfig {
    /// Load settings from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
