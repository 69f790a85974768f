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

use crate::config::ClassifierConfig;
use crate::error::Flag;
use crate::table::{Column, Table, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const RFC3339_FORMAT: &str = "rfc3339";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
    Text,
    Boolean,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Datetime => "datetime",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
        }
    }

    /// Types whose values group rows into a small set of buckets.
    pub fn is_discrete(&self) -> bool {
        matches!(self, SemanticType::Categorical | SemanticType::Boolean)
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub semantic_type: SemanticType,
    pub cardinality: usize,
    pub null_count: usize,
    pub row_count: usize,
    pub ordinal: bool,
    pub datetime_format: Option<String>,
    /// Share of non-null values that fit the assigned type.
    pub type_confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

impl ColumnMetadata {
    pub fn non_null_count(&self) -> usize {
        self.row_count - self.null_count
    }

    pub fn null_share(&self) -> f64 {
        if self.row_count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.row_count as f64
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, Flag::ClassificationDegraded { .. }))
    }

    pub fn is_all_null(&self) -> bool {
        self.non_null_count() == 0
    }

    /// Usable as the x axis of a trend: datetime, or an ordinal numeric.
    pub fn is_time_like(&self) -> bool {
        self.semantic_type == SemanticType::Datetime
            || (self.semantic_type == SemanticType::Numeric && self.ordinal)
    }

    /// Eligible for charts and insights beyond the degraded notice.
    pub fn is_chartable(&self) -> bool {
        !self.is_all_null() && !self.is_degraded() && self.semantic_type != SemanticType::Text
    }
}

pub struct ColumnClassifier {
    config: ClassifierConfig,
}

impl Default for ColumnClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnClassifier {
    pub fn new() -> Self {
        Self::with_config(ClassifierConfig::default())
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, table: &Table) -> Vec<ColumnMetadata> {
        table
            .columns()
            .iter()
            .map(|column| self.classify_column(column))
            .collect()
    }

    pub fn is_null(&self, value: &Value) -> bool {
        is_missing(value, &self.config.null_tokens)
    }

    pub fn classify_column(&self, column: &Column) -> ColumnMetadata {
        let row_count = column.len();
        let present: Vec<&Value> = column.values.iter().filter(|v| !self.is_null(v)).collect();
        let null_count = row_count - present.len();
        let cardinality = present
            .iter()
            .filter_map(|v| v.to_text())
            .map(|t| t.trim().to_string())
            .collect::<HashSet<_>>()
            .len();

        let mut metadata = ColumnMetadata {
            name: column.name.clone(),
            semantic_type: SemanticType::Text,
            cardinality,
            null_count,
            row_count,
            ordinal: false,
            datetime_format: None,
            type_confidence: 0.0,
            flags: Vec::new(),
        };

        if present.is_empty() {
            warn!(column = %column.name, "Column has no non-null values");
            metadata.flags.push(Flag::ClassificationDegraded {
                column: column.name.clone(),
                reason: "all values are null".to_string(),
            });
            return metadata;
        }

        if self.is_boolean(&present) {
            metadata.semantic_type = SemanticType::Boolean;
            metadata.type_confidence = 1.0;
            return metadata;
        }

        let numbers: Vec<f64> = present.iter().filter_map(|v| numeric_value(v)).collect();
        if numbers.len() == present.len() {
            metadata.semantic_type = SemanticType::Numeric;
            metadata.type_confidence = 1.0;
            metadata.ordinal = self.is_ordinal(&numbers);
            return metadata;
        }

        if let Some(format) = self.detect_datetime_format(&present) {
            metadata.semantic_type = SemanticType::Datetime;
            metadata.type_confidence = 1.0;
            metadata.datetime_format = Some(format);
            return metadata;
        }

        if cardinality <= self.config.max_categorical_distinct
            || (cardinality as f64) <= self.config.categorical_ratio * row_count as f64
        {
            metadata.semantic_type = SemanticType::Categorical;
            metadata.type_confidence = 1.0;
            return metadata;
        }

        let numeric_share = numbers.len() as f64 / present.len() as f64;
        let datetime_share = self.best_datetime_share(&present);
        let best_share = numeric_share.max(datetime_share);
        metadata.type_confidence = 1.0 - best_share;
        if best_share >= self.config.type_confidence_threshold {
            let parsed_as = if numeric_share >= datetime_share {
                "numbers"
            } else {
                "dates"
            };
            warn!(
                column = %column.name,
                share = best_share,
                "Mixed column defaulted to text"
            );
            metadata.flags.push(Flag::ClassificationDegraded {
                column: column.name.clone(),
                reason: format!(
                    "{:.0}% of values parsed as {parsed_as} but the rest did not",
                    best_share * 100.0
                ),
            });
        }
        debug!(column = %column.name, cardinality, "Classified as text");
        metadata
    }

    fn is_boolean(&self, present: &[&Value]) -> bool {
        if present.iter().all(|v| matches!(v, Value::Bool(_))) {
            return true;
        }
        let tokens: Vec<String> = present
            .iter()
            .filter_map(|v| v.to_text())
            .map(|t| t.trim().to_ascii_lowercase())
            .collect();
        if tokens.len() != present.len() {
            return false;
        }
        self.config.boolean_tokens.iter().any(|[yes, no]| {
            tokens
                .iter()
                .all(|t| t.eq_ignore_ascii_case(yes) || t.eq_ignore_ascii_case(no))
        })
    }

    fn is_ordinal(&self, numbers: &[f64]) -> bool {
        numbers.len() >= self.config.min_ordinal_rows
            && numbers.iter().all(|n| n.fract() == 0.0)
            && numbers.windows(2).all(|w| w[1] > w[0])
    }

    fn detect_datetime_format(&self, present: &[&Value]) -> Option<String> {
        let texts: Vec<&str> = present
            .iter()
            .filter_map(|v| match v {
                Value::Text(s) => Some(s.trim()),
                _ => None,
            })
            .collect();
        let timestamps = present
            .iter()
            .filter(|v| matches!(v, Value::Timestamp(_)))
            .count();
        if texts.len() + timestamps != present.len() {
            return None;
        }
        if texts.is_empty() {
            return Some(RFC3339_FORMAT.to_string());
        }
        std::iter::once(RFC3339_FORMAT)
            .chain(self.config.temporal_formats.iter().map(String::as_str))
            .find(|format| texts.iter().all(|t| parse_with_format(t, format).is_some()))
            .map(str::to_string)
    }

    fn best_datetime_share(&self, present: &[&Value]) -> f64 {
        std::iter::once(RFC3339_FORMAT)
            .chain(self.config.temporal_formats.iter().map(String::as_str))
            .map(|format| {
                present
                    .iter()
                    .filter(|v| timestamp_value(v, format).is_some())
                    .count()
            })
            .max()
            .map_or(0.0, |hits| hits as f64 / present.len() as f64)
    }
}

/// Null cells, non-finite floats and configured null tokens.
pub fn is_missing(value: &Value, null_tokens: &[String]) -> bool {
    match value {
        Value::Null => true,
        Value::Float(f) => !f.is_finite(),
        Value::Text(s) => {
            let trimmed = s.trim();
            null_tokens
                .iter()
                .any(|token| token.eq_ignore_ascii_case(trimmed))
        }
        _ => false,
    }
}

/// Numeric reading of a cell; text is parsed as `f64`.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Timestamp reading of a cell under a detected format.
pub fn timestamp_value(value: &Value, format: &str) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Text(s) => parse_with_format(s.trim(), format),
        _ => None,
    }
}

fn parse_with_format(value: &str, format: &str) -> Option<NaiveDateTime> {
    if format == RFC3339_FORMAT {
        return DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(values: Vec<Value>) -> ColumnMetadata {
        ColumnClassifier::new().classify_column(&Column::new("c", values))
    }

    fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_boolean_tokens_win_over_numeric() {
        let meta = classify(texts(&["1", "0", "1", "1"]));
        assert_eq!(meta.semantic_type, SemanticType::Boolean);
        let meta = classify(texts(&["Yes", "no", " YES "]));
        assert_eq!(meta.semantic_type, SemanticType::Boolean);
        let meta = classify(vec![Value::Bool(true), Value::Null, Value::Bool(false)]);
        assert_eq!(meta.semantic_type, SemanticType::Boolean);
        assert_eq!(meta.null_count, 1);
    }

    #[test]
    fn test_mixed_boolean_sets_are_not_boolean() {
        let meta = classify(texts(&["yes", "false"]));
        assert_ne!(meta.semantic_type, SemanticType::Boolean);
    }

    #[test]
    fn test_numeric_from_text_and_null_tokens() {
        let meta = classify(texts(&["1.5", "2", "N/A", "", "3.25"]));
        assert_eq!(meta.semantic_type, SemanticType::Numeric);
        assert_eq!(meta.null_count, 2);
        assert_eq!(meta.cardinality, 3);
        assert!(!meta.ordinal);
    }

    #[test]
    fn test_ordinal_detection() {
        let meta = classify((2000..2010).map(Value::from).collect());
        assert_eq!(meta.semantic_type, SemanticType::Numeric);
        assert!(meta.ordinal);
        let shuffled = classify(vec![3, 1, 2, 4].into_iter().map(Value::from).collect());
        assert!(!shuffled.ordinal);
        let short = classify(vec![Value::from(1), Value::from(2)]);
        assert!(!short.ordinal);
    }

    #[test]
    fn test_datetime_format_detection() {
        let meta = classify(texts(&["2024-01-01", "2024-01-02", "2024-02-29"]));
        assert_eq!(meta.semantic_type, SemanticType::Datetime);
        assert_eq!(meta.datetime_format.as_deref(), Some("%Y-%m-%d"));

        let meta = classify(texts(&["2024-01-01T10:00:00Z", "2024-01-02T11:30:00+02:00"]));
        assert_eq!(meta.datetime_format.as_deref(), Some(RFC3339_FORMAT));

        let meta = classify(texts(&["12/31/2024", "01/15/2024"]));
        assert_eq!(meta.datetime_format.as_deref(), Some("%m/%d/%Y"));
    }

    #[test]
    fn test_categorical_by_distinct_count() {
        let values: Vec<Value> = (0..100)
            .map(|i| Value::from(["north", "south", "east"][i % 3]))
            .collect();
        let meta = classify(values);
        assert_eq!(meta.semantic_type, SemanticType::Categorical);
        assert_eq!(meta.cardinality, 3);
    }

    #[test]
    fn test_free_text() {
        let values: Vec<Value> = (0..40).map(|i| Value::from(format!("note number {i}"))).collect();
        let meta = classify(values);
        assert_eq!(meta.semantic_type, SemanticType::Text);
        assert!(!meta.is_degraded());
    }

    #[test]
    fn test_all_null_column_is_degraded_text() {
        let meta = classify(vec![Value::Null, Value::from("null"), Value::Float(f64::NAN)]);
        assert_eq!(meta.semantic_type, SemanticType::Text);
        assert_eq!(meta.cardinality, 0);
        assert_eq!(meta.null_count, 3);
        assert!(meta.is_degraded());
    }

    #[test]
    fn test_mostly_numeric_column_is_flagged() {
        let mut values: Vec<Value> = (0..30).map(|i| Value::from(format!("{i}.5"))).collect();
        values.push(Value::from("unknown-a"));
        values.push(Value::from("unknown-b"));
        let meta = classify(values);
        assert_eq!(meta.semantic_type, SemanticType::Text);
        assert!(meta.is_degraded());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let table = Table::new(vec![
            Column::new("a", texts(&["x", "y", "x"])),
            Column::new("b", [1.0, 2.5, 3.0]),
        ])
        .unwrap();
        let classifier = ColumnClassifier::new();
        assert_eq!(classifier.classify(&table), classifier.classify(&table));
    }
}
