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

use crate::error::{ConfigError, ConfigResult};
use llm_contracts::GenerationDefaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub statistics: StatisticsConfig,
    pub relationships: RelationshipConfig,
    pub insights: InsightConfig,
    pub charts: ChartConfig,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub null_tokens: Vec<String>,
    pub boolean_tokens: Vec<[String; 2]>,
    pub temporal_formats: Vec<String>,
    pub max_categorical_distinct: usize,
    pub categorical_ratio: f64,
    pub type_confidence_threshold: f64,
    pub min_ordinal_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub sample_ceiling: usize,
    pub sample_size: usize,
    pub sample_seed: u64,
    pub top_n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    pub correlation_threshold: f64,
    pub trend_r_squared_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub skew_threshold: f64,
    pub dominant_share: f64,
    pub missing_threshold: f64,
    pub outlier_share: f64,
    pub max_model_insights: usize,
    pub max_summary_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub max_auto_charts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub timeout_ms: u64,
    pub generation: GenerationDefaults,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            null_tokens: ["", "na", "n/a", "nan", "null", "none", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            boolean_tokens: [
                ["true", "false"],
                ["yes", "no"],
                ["y", "n"],
                ["t", "f"],
                ["1", "0"],
            ]
            .iter()
            .map(|[a, b]| [a.to_string(), b.to_string()])
            .collect(),
            temporal_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y%m%d".to_string(),
            ],
            max_categorical_distinct: 20,
            categorical_ratio: 0.05,
            type_confidence_threshold: 0.8,
            min_ordinal_rows: 3,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            sample_ceiling: 100_000,
            sample_size: 10_000,
            sample_seed: 42,
            top_n: 10,
        }
    }
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.5,
            trend_r_squared_threshold: 0.3,
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            skew_threshold: 1.0,
            dominant_share: 0.5,
            missing_threshold: 0.1,
            outlier_share: 0.05,
            max_model_insights: 5,
            max_summary_chars: 4_000,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self { max_auto_charts: 6 }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            generation: GenerationDefaults::default(),
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_unit_interval(field: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0.0 and 1.0"))
    }
}

impl EngineConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let classifier = &self.classifier;
        if classifier.temporal_formats.is_empty() {
            return Err(invalid("classifier.temporal_formats", "must not be empty"));
        }
        if classifier
            .boolean_tokens
            .iter()
            .any(|[a, b]| a.trim().is_empty() || a.eq_ignore_ascii_case(b))
        {
            return Err(invalid(
                "classifier.boolean_tokens",
                "each pair needs two distinct, non-empty tokens",
            ));
        }
        check_unit_interval("classifier.categorical_ratio", classifier.categorical_ratio)?;
        check_unit_interval(
            "classifier.type_confidence_threshold",
            classifier.type_confidence_threshold,
        )?;
        if classifier.min_ordinal_rows < 2 {
            return Err(invalid("classifier.min_ordinal_rows", "must be at least 2"));
        }

        let statistics = &self.statistics;
        if statistics.sample_size == 0 {
            return Err(invalid("statistics.sample_size", "must be greater than 0"));
        }
        if statistics.sample_size > statistics.sample_ceiling {
            return Err(invalid(
                "statistics.sample_size",
                "must not exceed statistics.sample_ceiling",
            ));
        }
        if statistics.top_n == 0 {
            return Err(invalid("statistics.top_n", "must be greater than 0"));
        }

        check_unit_interval(
            "relationships.correlation_threshold",
            self.relationships.correlation_threshold,
        )?;
        check_unit_interval(
            "relationships.trend_r_squared_threshold",
            self.relationships.trend_r_squared_threshold,
        )?;

        let insights = &self.insights;
        check_unit_interval("insights.dominant_share", insights.dominant_share)?;
        check_unit_interval("insights.missing_threshold", insights.missing_threshold)?;
        check_unit_interval("insights.outlier_share", insights.outlier_share)?;
        if insights.skew_threshold <= 0.0 {
            return Err(invalid("insights.skew_threshold", "must be positive"));
        }
        if insights.max_summary_chars < 200 {
            return Err(invalid("insights.max_summary_chars", "must be at least 200"));
        }

        if self.charts.max_auto_charts == 0 || self.charts.max_auto_charts > 50 {
            return Err(invalid("charts.max_auto_charts", "must be between 1 and 50"));
        }

        if self.llm.timeout_ms == 0 {
            return Err(invalid("llm.timeout_ms", "must be greater than 0"));
        }
        self.llm
            .generation
            .validate()
            .map_err(|reason| invalid("llm.generation", &reason))?;
        Ok(())
    }

    pub fn for_large_datasets() -> Self {
        Self {
            statistics: StatisticsConfig {
                sample_ceiling: 50_000,
                sample_size: 5_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn for_exploration() -> Self {
        Self {
            relationships: RelationshipConfig {
                correlation_threshold: 0.4,
                trend_r_squared_threshold: 0.2,
            },
            charts: ChartConfig {
                max_auto_charts: 10,
            },
            ..Default::default()
        }
    }

    pub fn for_presentation() -> Self {
        Self {
            relationships: RelationshipConfig {
                correlation_threshold: 0.7,
                trend_r_squared_threshold: 0.5,
            },
            charts: ChartConfig { max_auto_charts: 4 },
            ..Default::default()
        }
    }
}
