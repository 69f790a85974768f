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

use crate::classifier::{ColumnMetadata, SemanticType};
use crate::config::RelationshipConfig;
use crate::statistics::{Metrics, StatKey, StatisticRecord, TrendUnit};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    // declaration order doubles as the tie-break order: trends first
    Trend,
    Correlation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    fn of(value: f64) -> Self {
        if value < 0.0 {
            Direction::Negative
        } else {
            Direction::Positive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub columns: Vec<String>,
    pub kind: RelationshipKind,
    /// Pearson r for correlations, standardized slope for trends.
    pub strength: f64,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    /// Raw slope per [`TrendUnit`], trends only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<TrendUnit>,
    pub description: String,
}

impl Relationship {
    pub fn involves(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn covers(&self, a: &str, b: &str) -> bool {
        self.involves(a) && self.involves(b)
    }

    pub fn stat_key(&self) -> Option<StatKey> {
        let [a, b] = self.columns.as_slice() else {
            return None;
        };
        Some(match self.kind {
            RelationshipKind::Correlation => StatKey::Correlation(a.clone(), b.clone()),
            RelationshipKind::Trend => StatKey::Trend(a.clone(), b.clone()),
        })
    }
}

pub fn strength_label(strength: f64) -> &'static str {
    match strength.abs() {
        s if s >= 0.8 => "strong",
        s if s >= 0.5 => "moderate",
        _ => "weak",
    }
}

pub struct RelationshipFinder {
    config: RelationshipConfig,
}

impl Default for RelationshipFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationshipFinder {
    pub fn new() -> Self {
        Self::with_config(RelationshipConfig::default())
    }

    pub fn with_config(config: RelationshipConfig) -> Self {
        Self { config }
    }

    pub fn find(
        &self,
        metadata: &[ColumnMetadata],
        records: &[StatisticRecord],
    ) -> Vec<Relationship> {
        let by_name: HashMap<&str, &ColumnMetadata> =
            metadata.iter().map(|m| (m.name.as_str(), m)).collect();

        let mut found: Vec<Relationship> = records
            .iter()
            .filter_map(|record| match (&record.key, &record.metrics) {
                (StatKey::Correlation(a, b), Metrics::Correlation { coefficient, .. }) => {
                    let numeric = |name: &str| {
                        by_name
                            .get(name)
                            .is_some_and(|m| m.semantic_type == SemanticType::Numeric)
                    };
                    (numeric(a) && numeric(b))
                        .then(|| self.correlation(a, b, *coefficient))
                        .flatten()
                }
                (
                    StatKey::Trend(time, value),
                    Metrics::Trend {
                        slope,
                        r_squared,
                        standardized_slope,
                        unit,
                        ..
                    },
                ) => {
                    let compatible = by_name.get(time.as_str()).is_some_and(|m| m.is_time_like())
                        && by_name
                            .get(value.as_str())
                            .is_some_and(|m| m.semantic_type == SemanticType::Numeric);
                    compatible
                        .then(|| {
                            self.trend(time, value, *slope, *r_squared, *standardized_slope, *unit)
                        })
                        .flatten()
                }
                _ => None,
            })
            .collect();

        found.sort_by(|a, b| {
            b.strength
                .abs()
                .partial_cmp(&a.strength.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.columns.cmp(&b.columns))
        });
        found
    }

    fn correlation(&self, a: &str, b: &str, coefficient: f64) -> Option<Relationship> {
        if !coefficient.is_finite() || coefficient.abs() < self.config.correlation_threshold {
            return None;
        }
        let direction = Direction::of(coefficient);
        Some(Relationship {
            columns: vec![a.to_string(), b.to_string()],
            kind: RelationshipKind::Correlation,
            strength: coefficient,
            direction,
            r_squared: None,
            slope: None,
            unit: None,
            description: format!(
                "{} {} correlation between {a} and {b} (r = {coefficient:.2})",
                strength_label(coefficient),
                direction.as_str()
            ),
        })
    }

    fn trend(
        &self,
        time: &str,
        value: &str,
        slope: f64,
        r_squared: f64,
        standardized_slope: f64,
        unit: TrendUnit,
    ) -> Option<Relationship> {
        let finite = slope.is_finite() && standardized_slope.is_finite() && r_squared.is_finite();
        if !finite || r_squared <= self.config.trend_r_squared_threshold {
            return None;
        }
        let direction = Direction::of(slope);
        let per = match unit {
            TrendUnit::Day => "per day",
            TrendUnit::Step => "per step",
        };
        let heading = match direction {
            Direction::Positive => "an increasing",
            Direction::Negative => "a decreasing",
        };
        Some(Relationship {
            columns: vec![time.to_string(), value.to_string()],
            kind: RelationshipKind::Trend,
            strength: standardized_slope,
            direction,
            r_squared: Some(r_squared),
            slope: Some(slope),
            unit: Some(unit),
            description: format!(
                "{value} shows {heading} trend over {time} ({slope:+.3} {per}, R² = {r_squared:.2})"
            ),
        })
    }
}
