// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Table has no columns or no rows")]
    EmptyTable,
    #[error("Invalid binding for {kind} chart: {reason}")]
    InvalidBinding { kind: String, reason: String },
    #[error("Language-model augmentation unavailable: {0}")]
    AugmentationUnavailable(String),
    #[error("No dataset has been loaded into the session")]
    NoDataset,
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error("Table error: {0}")]
    Table(#[from] TableError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
    #[cfg(feature = "polars")]
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("Row {row} has {actual} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Duplicate column name: '{name}'")]
    DuplicateColumn { name: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Failed to parse YAML configuration: {source}")]
    YamlParse {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Non-fatal conditions. They travel with the artifact they affect instead of
/// aborting the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum Flag {
    ClassificationDegraded { column: String, reason: String },
    StatisticsApproximate { sample_size: usize, seed: u64, population: usize },
    AugmentationUnavailable { reason: String },
}

impl Flag {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Flag::ClassificationDegraded { .. } => ErrorSeverity::Warning,
            Flag::StatisticsApproximate { .. } => ErrorSeverity::Info,
            Flag::AugmentationUnavailable { .. } => ErrorSeverity::Info,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Flag::ClassificationDegraded { .. } => "ClassificationDegraded",
            Flag::StatisticsApproximate { .. } => "StatisticsApproximate",
            Flag::AugmentationUnavailable { .. } => "AugmentationUnavailable",
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flag::ClassificationDegraded { column, reason } => {
                write!(f, "column '{column}' defaulted to text: {reason}")
            }
            Flag::StatisticsApproximate {
                sample_size,
                seed,
                population,
            } => write!(
                f,
                "statistics sampled from {sample_size} of {population} rows (seed {seed})"
            ),
            Flag::AugmentationUnavailable { reason } => {
                write!(f, "language-model augmentation skipped: {reason}")
            }
        }
    }
}

impl AnalysisError {
    pub fn invalid_binding(kind: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidBinding {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// The request failed but the session and its cached results are still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidBinding { .. }
                | AnalysisError::AugmentationUnavailable(_)
                | AnalysisError::EmptyQuestion
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            AnalysisError::EmptyTable | AnalysisError::NoDataset | AnalysisError::Table(_) => {
                "Data"
            }
            AnalysisError::InvalidBinding { .. } => "Chart",
            AnalysisError::AugmentationUnavailable(_) | AnalysisError::EmptyQuestion => {
                "Augmentation"
            }
            AnalysisError::Config(_) => "Configuration",
            AnalysisError::Io(_) => "I/O",
            AnalysisError::Serialisation(_) => "Serialisation",
            #[cfg(feature = "polars")]
            AnalysisError::Polars(_) => "Data",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AnalysisError::AugmentationUnavailable(_) => ErrorSeverity::Warning,
            AnalysisError::InvalidBinding { .. } | AnalysisError::EmptyQuestion => {
                ErrorSeverity::Warning
            }
            AnalysisError::Config(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::EmptyTable => {
                "The dataset appears to be empty. Please provide data with at least one row and one column.".to_string()
            }
            AnalysisError::NoDataset => "Load a dataset before asking for analysis.".to_string(),
            AnalysisError::AugmentationUnavailable(_) => {
                "AI insights are not available right now; the computed statistics and insights are still shown.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
}
