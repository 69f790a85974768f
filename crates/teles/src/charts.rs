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
use crate::config::ChartConfig;
use crate::error::{AnalysisError, Result};
use crate::profile::Profile;
use crate::relationships::RelationshipKind;
use crate::statistics::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Heatmap,
    Histogram,
    Box,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartKind::Bar),
            "line" => Ok(ChartKind::Line),
            "scatter" => Ok(ChartKind::Scatter),
            "heatmap" => Ok(ChartKind::Heatmap),
            "histogram" => Ok(ChartKind::Histogram),
            "box" => Ok(ChartKind::Box),
            other => Err(AnalysisError::invalid_binding(other, "unknown chart kind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    Color,
    Matrix,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub channel: Channel,
    pub column: String,
}

impl Binding {
    fn new(channel: Channel, column: &str) -> Self {
        Self {
            channel,
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub bindings: Vec<Binding>,
    pub rationale: String,
    pub salience: f64,
}

impl ChartSpec {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.column.as_str())
    }

    pub fn column_for(&self, channel: Channel) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.channel == channel)
            .map(|b| b.column.as_str())
    }

    pub fn title(&self) -> String {
        let columns: Vec<&str> = self.columns().collect();
        match (self.kind, columns.as_slice()) {
            (ChartKind::Heatmap, _) => "Correlation Heatmap".to_string(),
            (ChartKind::Histogram | ChartKind::Bar, [only]) => format!("Distribution of {only}"),
            (ChartKind::Line, [x, y]) => format!("{y} over {x}"),
            _ => columns.join(" vs "),
        }
    }
}

/// Metadata lookup by name and by semantic type.
struct ColumnIndex<'a> {
    by_name: HashMap<&'a str, &'a ColumnMetadata>,
    by_type: HashMap<SemanticType, Vec<&'a ColumnMetadata>>,
}

impl<'a> ColumnIndex<'a> {
    fn new(columns: &'a [ColumnMetadata]) -> Self {
        let mut by_name = HashMap::new();
        let mut by_type: HashMap<SemanticType, Vec<&'a ColumnMetadata>> = HashMap::new();
        for column in columns {
            by_name.insert(column.name.as_str(), column);
            if column.is_chartable() {
                by_type.entry(column.semantic_type).or_default().push(column);
            }
        }
        Self { by_name, by_type }
    }

    fn get_by_type(&self, semantic_type: SemanticType) -> &[&'a ColumnMetadata] {
        self.by_type.get(&semantic_type).map_or(&[], |v| v.as_slice())
    }

    fn get_by_name(&self, name: &str) -> Option<&'a ColumnMetadata> {
        self.by_name.get(name).copied()
    }
}

pub struct VisualizationSelector {
    config: ChartConfig,
}

impl Default for VisualizationSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualizationSelector {
    pub fn new() -> Self {
        Self::with_config(ChartConfig::default())
    }

    pub fn with_config(config: ChartConfig) -> Self {
        Self { config }
    }

    pub fn auto_select(&self, profile: &Profile) -> Vec<ChartSpec> {
        let index = ColumnIndex::new(&profile.columns);
        let mut candidates = Vec::new();

        for column in &profile.columns {
            if !column.is_chartable() {
                continue;
            }
            let stats = profile.column_statistic(&column.name).map(|r| &r.metrics);
            match (column.semantic_type, stats) {
                (SemanticType::Numeric, Some(Metrics::Numeric { skewness, .. })) if !column.ordinal => {
                    let skew = skewness.unwrap_or(0.0).abs().min(3.0);
                    candidates.push(ChartSpec {
                        kind: ChartKind::Histogram,
                        bindings: vec![Binding::new(Channel::X, &column.name)],
                        rationale: format!("Distribution of numeric column {}", column.name),
                        salience: 0.3 + 0.1 * skew,
                    });
                }
                (
                    SemanticType::Categorical | SemanticType::Boolean,
                    Some(Metrics::Frequency { top_share, .. }),
                ) => {
                    candidates.push(ChartSpec {
                        kind: ChartKind::Bar,
                        bindings: vec![Binding::new(Channel::X, &column.name)],
                        rationale: format!("Value counts of {} column {}", column.semantic_type, column.name),
                        salience: 0.3 + 0.3 * top_share,
                    });
                }
                _ => {}
            }
        }

        for relationship in &profile.relationships {
            let [a, b] = relationship.columns.as_slice() else {
                continue;
            };
            if index.get_by_name(a).is_none() || index.get_by_name(b).is_none() {
                continue;
            }
            match relationship.kind {
                RelationshipKind::Trend => candidates.push(ChartSpec {
                    kind: ChartKind::Line,
                    bindings: vec![Binding::new(Channel::X, a), Binding::new(Channel::Y, b)],
                    rationale: relationship.description.clone(),
                    salience: relationship.strength.abs(),
                }),
                RelationshipKind::Correlation => {
                    let has_trend = profile
                        .relationships
                        .iter()
                        .any(|r| r.kind == RelationshipKind::Trend && r.covers(a, b));
                    if !has_trend {
                        candidates.push(ChartSpec {
                            kind: ChartKind::Scatter,
                            bindings: vec![Binding::new(Channel::X, a), Binding::new(Channel::Y, b)],
                            rationale: relationship.description.clone(),
                            salience: relationship.strength.abs(),
                        });
                    }
                }
            }
        }

        let numeric = index.get_by_type(SemanticType::Numeric);
        if numeric.len() >= 3 {
            let max_r = profile
                .statistics
                .iter()
                .filter_map(|r| match r.metrics {
                    Metrics::Correlation { coefficient, .. } => Some(coefficient.abs()),
                    _ => None,
                })
                .fold(0.0, f64::max);
            candidates.push(ChartSpec {
                kind: ChartKind::Heatmap,
                bindings: numeric
                    .iter()
                    .map(|c| Binding::new(Channel::Matrix, &c.name))
                    .collect(),
                rationale: format!("Pairwise correlations across {} numeric columns", numeric.len()),
                salience: max_r,
            });
        }

        candidates.sort_by(|a, b| b.salience.total_cmp(&a.salience));
        let mut seen = HashSet::new();
        let charts: Vec<ChartSpec> = candidates
            .into_iter()
            .filter(|c| seen.insert((c.kind, c.bindings.clone())))
            .take(self.config.max_auto_charts)
            .collect();
        debug!(charts = charts.len(), "Auto-selected charts");
        charts
    }

    pub fn custom(&self, profile: &Profile, kind: ChartKind, columns: &[&str]) -> Result<ChartSpec> {
        let index = ColumnIndex::new(&profile.columns);
        let mut resolved = Vec::with_capacity(columns.len());
        let mut seen = HashSet::new();
        for name in columns {
            let meta = index
                .get_by_name(name)
                .ok_or_else(|| AnalysisError::invalid_binding(kind, format!("unknown column '{name}'")))?;
            if !seen.insert(*name) {
                return Err(AnalysisError::invalid_binding(
                    kind,
                    format!("column '{name}' is bound more than once"),
                ));
            }
            resolved.push(meta);
        }

        let types: Vec<SemanticType> = resolved.iter().map(|m| m.semantic_type).collect();
        let numeric = |t: &SemanticType| *t == SemanticType::Numeric;
        let discrete = |t: &SemanticType| t.is_discrete();

        let channels: Vec<Channel> = match (kind, types.as_slice()) {
            (ChartKind::Histogram, [t]) if numeric(t) => vec![Channel::X],
            (ChartKind::Bar, [t]) if discrete(t) => vec![Channel::X],
            (ChartKind::Bar, [x, y]) if (discrete(x) || *x == SemanticType::Datetime) && numeric(y) => {
                vec![Channel::X, Channel::Y]
            }
            (ChartKind::Line, [x, y]) if (numeric(x) || *x == SemanticType::Datetime) && numeric(y) => {
                vec![Channel::X, Channel::Y]
            }
            (ChartKind::Scatter, [x, y]) if numeric(x) && numeric(y) => vec![Channel::X, Channel::Y],
            (ChartKind::Scatter, [x, y, c]) if numeric(x) && numeric(y) && discrete(c) => {
                vec![Channel::X, Channel::Y, Channel::Color]
            }
            (ChartKind::Heatmap, ts) if ts.len() >= 2 && ts.iter().all(numeric) => {
                vec![Channel::Matrix; ts.len()]
            }
            (ChartKind::Box, [y]) if numeric(y) => vec![Channel::Y],
            (ChartKind::Box, [x, y]) if discrete(x) && numeric(y) => vec![Channel::X, Channel::Y],
            _ => {
                let described = resolved
                    .iter()
                    .map(|m| format!("{} ({})", m.name, m.semantic_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                let described = if described.is_empty() {
                    "no columns".to_string()
                } else {
                    described
                };
                return Err(AnalysisError::invalid_binding(
                    kind,
                    format!("{described} cannot be bound; expected {}", expected_binding(kind)),
                ));
            }
        };

        Ok(ChartSpec {
            kind,
            bindings: channels
                .into_iter()
                .zip(columns)
                .map(|(channel, name)| Binding::new(channel, name))
                .collect(),
            rationale: format!("Requested {kind} chart of {}", columns.join(", ")),
            salience: 1.0,
        })
    }
}

fn expected_binding(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Histogram => "exactly one numeric column",
        ChartKind::Bar => "one categorical column, or a categorical or datetime column and a numeric column",
        ChartKind::Line => "a datetime or numeric column and a numeric column",
        ChartKind::Scatter => "two numeric columns and an optional categorical colour column",
        ChartKind::Heatmap => "two or more numeric columns",
        ChartKind::Box => "one numeric column, or a categorical column and a numeric column",
    }
}
