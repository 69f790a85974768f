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

//! Tabular data analysis: column typing, descriptive statistics,
//! relationship detection, insight synthesis and chart selection.
//!
//! [`AnalysisSession`] ties the passes together and caches their results per
//! dataset. A [`llm_contracts::LanguageModel`] may be attached to augment
//! insights and answer questions; every path works without one.

pub mod charts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod insights;
pub mod profile;
pub mod prompt;
pub mod relationships;
pub mod session;
pub mod statistics;
pub mod table;

pub use charts::{Binding, Channel, ChartKind, ChartSpec, VisualizationSelector};
pub use classifier::{ColumnClassifier, ColumnMetadata, SemanticType};
pub use config::{
    ChartConfig, ClassifierConfig, EngineConfig, InsightConfig, LlmSettings, RelationshipConfig,
    StatisticsConfig,
};
pub use error::{AnalysisError, ConfigError, ErrorSeverity, Flag, Result, TableError};
pub use insights::{Evidence, Insight, InsightReport, InsightSource, InsightSynthesizer};
pub use profile::{ColumnSummary, Profile, ProfileSummary};
pub use relationships::{Direction, Relationship, RelationshipFinder, RelationshipKind};
pub use session::AnalysisSession;
pub use statistics::{Granularity, Metrics, StatKey, StatisticRecord, StatisticsEngine};
pub use table::{Column, Table, Value};
