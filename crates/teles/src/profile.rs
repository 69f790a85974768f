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

use crate::classifier::{ColumnClassifier, ColumnMetadata, SemanticType};
use crate::config::{EngineConfig, InsightConfig};
use crate::error::{Flag, Result};
use crate::relationships::{Relationship, RelationshipFinder};
use crate::statistics::{StatKey, StatisticRecord, StatisticsEngine};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Everything derived from one table: column metadata, statistics and
/// relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub fingerprint: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnMetadata>,
    pub statistics: Vec<StatisticRecord>,
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
    /// Null share above which a column counts as significantly incomplete.
    #[serde(default = "default_missing_threshold")]
    pub missing_threshold: f64,
}

fn default_missing_threshold() -> f64 {
    InsightConfig::default().missing_threshold
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            fingerprint: String::new(),
            row_count: 0,
            column_count: 0,
            columns: Vec::new(),
            statistics: Vec::new(),
            relationships: Vec::new(),
            flags: Vec::new(),
            missing_threshold: default_missing_threshold(),
        }
    }
}

impl Profile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(table: &Table, config: &EngineConfig) -> Self {
        let columns = ColumnClassifier::with_config(config.classifier.clone()).classify(table);
        let statistics = StatisticsEngine::with_config(config.statistics.clone())
            .with_null_tokens(config.classifier.null_tokens.clone())
            .compute(table, &columns);
        let relationships =
            RelationshipFinder::with_config(config.relationships.clone()).find(&columns, &statistics);

        let mut flags: Vec<Flag> = columns.iter().flat_map(|c| c.flags.clone()).collect();
        if let Some(info) = statistics.iter().find_map(|r| r.approximate) {
            flags.push(Flag::StatisticsApproximate {
                sample_size: info.sample_size,
                seed: info.seed,
                population: info.population,
            });
        }
        debug!(
            columns = columns.len(),
            records = statistics.len(),
            relationships = relationships.len(),
            "Profile built"
        );

        Self {
            fingerprint: table.fingerprint(),
            row_count: table.row_count(),
            column_count: table.column_count(),
            columns,
            statistics,
            relationships,
            flags,
            missing_threshold: config.insights.missing_threshold,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.row_count == 0
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn statistic(&self, key: &StatKey) -> Option<&StatisticRecord> {
        self.statistics.iter().find(|r| &r.key == key)
    }

    pub fn column_statistic(&self, name: &str) -> Option<&StatisticRecord> {
        self.statistic(&StatKey::Column(name.to_string()))
    }

    pub fn is_approximate(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, Flag::StatisticsApproximate { .. }))
    }

    pub fn summary(&self) -> ProfileSummary {
        self.summary_with_threshold(self.missing_threshold)
    }

    pub fn summary_with_threshold(&self, missing_threshold: f64) -> ProfileSummary {
        let mut type_counts = BTreeMap::new();
        for column in &self.columns {
            *type_counts.entry(column.semantic_type).or_insert(0) += 1;
        }
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                semantic_type: c.semantic_type,
                missing: c.null_count,
                missing_share: c.null_share(),
            })
            .collect();
        let significant_missing = self
            .columns
            .iter()
            .filter(|c| c.null_share() > missing_threshold)
            .map(|c| c.name.clone())
            .collect();
        ProfileSummary {
            rows: self.row_count,
            column_count: self.column_count,
            columns,
            type_counts,
            significant_missing,
            relationship_count: self.relationships.len(),
            approximate: self.is_approximate(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub semantic_type: SemanticType,
    pub missing: usize,
    pub missing_share: f64,
}

/// Dataset overview: shape, type mix and missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub rows: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnSummary>,
    pub type_counts: BTreeMap<SemanticType, usize>,
    pub significant_missing: Vec<String>,
    pub relationship_count: usize,
    pub approximate: bool,
}

impl ProfileSummary {
    pub fn count_of(&self, semantic_type: SemanticType) -> usize {
        self.type_counts.get(&semantic_type).copied().unwrap_or(0)
    }

    pub fn type_mix(&self) -> String {
        self.type_counts
            .iter()
            .map(|(t, n)| format!("{n} {t}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn report(&self) -> String {
        let mut report = String::new();
        report.push_str("Dataset Summary\n===============\n");
        report.push_str(&format!("Rows: {}\n", self.rows));
        report.push_str(&format!("Columns: {}\n", self.column_count));
        for (semantic_type, count) in &self.type_counts {
            report.push_str(&format!("  - {semantic_type}: {count}\n"));
        }
        report.push_str("\nColumns:\n");
        for column in &self.columns {
            report.push_str(&format!(
                "  - {} ({}), missing: {} ({:.1}%)\n",
                column.name,
                column.semantic_type,
                column.missing,
                column.missing_share * 100.0
            ));
        }
        if !self.significant_missing.is_empty() {
            report.push_str(&format!(
                "\nColumns with significant missing data: {}\n",
                self.significant_missing.join(", ")
            ));
        }
        report.push_str(&format!("\nRelationships found: {}\n", self.relationship_count));
        if self.approximate {
            report.push_str("Statistics computed on a sample.\n");
        }
        report
    }
}

impl std::fmt::Display for ProfileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dataset: {} rows x {} columns ({})",
            self.rows,
            self.column_count,
            self.type_mix()
        )
    }
}
