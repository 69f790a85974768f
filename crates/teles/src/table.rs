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

//! In-memory tabular input.
//!
//! Ingestion adapters build a [`Table`] once; the engine only ever reads it.

use crate::error::TableError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl Value {
    /// Textual rendering used for token matching and distinct counting.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
            Value::Timestamp(ts) => Some(Cow::Owned(ts.format("%Y-%m-%d %H:%M:%S").to_string())),
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
        }
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Value::Null => {
                hasher.update(&[0]);
            }
            Value::Bool(b) => {
                hasher.update(&[1, u8::from(*b)]);
            }
            Value::Int(i) => {
                hasher.update(&[2]);
                hasher.update(&i.to_le_bytes());
            }
            Value::Float(f) => {
                hasher.update(&[3]);
                hasher.update(&f.to_bits().to_le_bytes());
            }
            Value::Timestamp(ts) => {
                hasher.update(&[4]);
                hasher.update(&ts.and_utc().timestamp_micros().to_le_bytes());
            }
            Value::Text(s) => {
                hasher.update(&[5]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new<V: Into<Value>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let row_count = columns.first().map_or(0, Column::len);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
            if column.len() != row_count {
                return Err(TableError::RaggedColumns {
                    column: column.name.clone(),
                    expected: row_count,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { columns, row_count })
    }

    /// Builds a table from row-major records, as produced by CSV or SQL readers.
    pub fn from_rows<H, R>(headers: &[H], rows: impl IntoIterator<Item = R>) -> Result<Self, TableError>
    where
        H: AsRef<str>,
        R: IntoIterator<Item = Value>,
    {
        let mut columns: Vec<Column> = headers
            .iter()
            .map(|h| Column {
                name: h.as_ref().to_string(),
                values: Vec::new(),
            })
            .collect();
        for (row_index, row) in rows.into_iter().enumerate() {
            let mut cells = 0;
            for (index, value) in row.into_iter().enumerate() {
                cells += 1;
                if let Some(column) = columns.get_mut(index) {
                    column.values.push(value);
                }
            }
            if cells != headers.len() {
                return Err(TableError::RaggedRow {
                    row: row_index,
                    expected: headers.len(),
                    actual: cells,
                });
            }
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// No columns or no rows.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.row_count == 0
    }

    /// Content hash over column names and cell values, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.columns.len() as u64).to_le_bytes());
        hasher.update(&(self.row_count as u64).to_le_bytes());
        for column in &self.columns {
            hasher.update(&(column.name.len() as u64).to_le_bytes());
            hasher.update(column.name.as_bytes());
            for value in &column.values {
                value.hash_into(&mut hasher);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(feature = "polars")]
impl TryFrom<&polars::prelude::DataFrame> for Table {
    type Error = crate::error::AnalysisError;

    fn try_from(df: &polars::prelude::DataFrame) -> Result<Self, Self::Error> {
        use polars::prelude::DataType;

        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();
            let dtype = series.dtype();
            let values: Vec<Value> = if dtype.is_float() || dtype.is_integer() {
                let cast = series.cast(&DataType::Float64)?;
                cast.f64()?.into_iter().map(Value::from).collect()
            } else if matches!(dtype, DataType::Boolean) {
                series.bool()?.into_iter().map(Value::from).collect()
            } else {
                let cast = series.cast(&DataType::String)?;
                cast.str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string).into())
                    .collect()
            };
            columns.push(Column { name, values });
        }
        Ok(Table::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::new("a", [1, 2, 3]),
            Column::new("b", [1, 2]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            TableError::RaggedColumns {
                column: "b".to_string(),
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Table::new(vec![Column::new("a", [1]), Column::new("a", [2])]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_from_rows_transposes() {
        let table = Table::from_rows(
            &["city", "sales"],
            vec![
                vec![Value::from("Oslo"), Value::from(10.0)],
                vec![Value::from("Rome"), Value::Null],
            ],
        )
        .unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("sales").unwrap().values[1], Value::Null);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["city", "sales"]);
    }

    #[test]
    fn test_from_rows_rejects_short_row() {
        let err = Table::from_rows(&["a", "b"], vec![vec![Value::from(1)]]).unwrap_err();
        assert!(matches!(err, TableError::RaggedRow { row: 0, .. }));
    }

    #[test]
    fn test_empty_detection() {
        assert!(Table::default().is_empty());
        let no_rows = Table::new(vec![Column::new::<Value>("a", vec![])]).unwrap();
        assert!(no_rows.is_empty());
        let nulls = Table::new(vec![Column::new("a", [Value::Null, Value::Null])]).unwrap();
        assert!(!nulls.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Table::new(vec![Column::new("x", [1, 2])]).unwrap();
        let b = Table::new(vec![Column::new("x", [1, 2])]).unwrap();
        let c = Table::new(vec![Column::new("x", [1, 3])]).unwrap();
        let d = Table::new(vec![Column::new("y", [1, 2])]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<f64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
