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

//! Per-column and pairwise statistics.
//!
//! Every record is keyed by a [`StatKey`] and carries a [`Metrics`] variant
//! fixed by the semantic type of the column(s) involved. Tables above the
//! configured ceiling are sampled once, with the same row indices reused for
//! every column so pairs stay aligned.

use crate::classifier::{
    is_missing, numeric_value, timestamp_value, ColumnMetadata, SemanticType, RFC3339_FORMAT,
};
use crate::config::{ClassifierConfig, StatisticsConfig};
use crate::error::Flag;
use crate::table::{Column, Table, Value};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKey {
    Column(String),
    /// Unordered numeric pair, stored in column order.
    Correlation(String, String),
    /// Time-like column first, measured numeric column second.
    Trend(String, String),
}

impl std::fmt::Display for StatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatKey::Column(name) => write!(f, "{name}"),
            StatKey::Correlation(a, b) => write!(f, "corr({a}, {b})"),
            StatKey::Trend(a, b) => write!(f, "trend({b} over {a})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInfo {
    pub sample_size: usize,
    pub seed: u64,
    pub population: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Intraday,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Irregular,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Intraday => "intraday",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
            Granularity::Irregular => "irregular",
        }
    }

    fn from_gaps(gaps: &[i64]) -> Option<Self> {
        let min_gap = *gaps.iter().min()?;
        let mut sorted = gaps.to_vec();
        sorted.sort_unstable();
        let median_gap = sorted[sorted.len() / 2];
        if median_gap > min_gap.saturating_mul(3) {
            return Some(Granularity::Irregular);
        }
        let days = min_gap as f64 / SECONDS_PER_DAY;
        Some(match days {
            d if d < 1.0 => Granularity::Intraday,
            d if d < 7.0 => Granularity::Daily,
            d if d < 28.0 => Granularity::Weekly,
            d if d < 90.0 => Granularity::Monthly,
            d if d < 365.0 => Granularity::Quarterly,
            _ => Granularity::Yearly,
        })
    }
}

/// Unit of the x axis of a trend fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendUnit {
    Day,
    Step,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metrics {
    Numeric {
        count: usize,
        mean: f64,
        median: f64,
        std_dev: f64,
        min: f64,
        max: f64,
        q1: f64,
        q3: f64,
        skewness: Option<f64>,
        outlier_count: usize,
    },
    Frequency {
        count: usize,
        distinct_count: usize,
        mode: String,
        top_share: f64,
        frequencies: Vec<FrequencyEntry>,
        other_count: usize,
    },
    Datetime {
        count: usize,
        distinct_count: usize,
        min: NaiveDateTime,
        max: NaiveDateTime,
        span_days: f64,
        granularity: Option<Granularity>,
    },
    Text {
        count: usize,
        distinct_count: usize,
        min_length: usize,
        mean_length: f64,
        max_length: usize,
        mean_words: f64,
    },
    Empty,
    Correlation {
        coefficient: f64,
        n: usize,
    },
    Trend {
        slope: f64,
        intercept: f64,
        r_squared: f64,
        standardized_slope: f64,
        n: usize,
        unit: TrendUnit,
    },
}

impl Metrics {
    pub fn metric_names(&self) -> &'static [&'static str] {
        match self {
            Metrics::Numeric { .. } => &[
                "count",
                "mean",
                "median",
                "std_dev",
                "min",
                "max",
                "q1",
                "q3",
                "skewness",
                "outlier_count",
            ],
            Metrics::Frequency { .. } => &["count", "distinct_count", "top_share", "other_count"],
            Metrics::Datetime { .. } => &["count", "distinct_count", "span_days"],
            Metrics::Text { .. } => &[
                "count",
                "distinct_count",
                "min_length",
                "mean_length",
                "max_length",
                "mean_words",
            ],
            Metrics::Empty => &[],
            Metrics::Correlation { .. } => &["coefficient", "n"],
            Metrics::Trend { .. } => &["slope", "intercept", "r_squared", "standardized_slope", "n"],
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        match (self, name) {
            (Metrics::Numeric { count, .. }, "count") => Some(*count as f64),
            (Metrics::Numeric { mean, .. }, "mean") => Some(*mean),
            (Metrics::Numeric { median, .. }, "median") => Some(*median),
            (Metrics::Numeric { std_dev, .. }, "std_dev") => Some(*std_dev),
            (Metrics::Numeric { min, .. }, "min") => Some(*min),
            (Metrics::Numeric { max, .. }, "max") => Some(*max),
            (Metrics::Numeric { q1, .. }, "q1") => Some(*q1),
            (Metrics::Numeric { q3, .. }, "q3") => Some(*q3),
            (Metrics::Numeric { skewness, .. }, "skewness") => *skewness,
            (Metrics::Numeric { outlier_count, .. }, "outlier_count") => Some(*outlier_count as f64),
            (Metrics::Frequency { count, .. }, "count") => Some(*count as f64),
            (Metrics::Frequency { distinct_count, .. }, "distinct_count") => {
                Some(*distinct_count as f64)
            }
            (Metrics::Frequency { top_share, .. }, "top_share") => Some(*top_share),
            (Metrics::Frequency { other_count, .. }, "other_count") => Some(*other_count as f64),
            (Metrics::Datetime { count, .. }, "count") => Some(*count as f64),
            (Metrics::Datetime { distinct_count, .. }, "distinct_count") => {
                Some(*distinct_count as f64)
            }
            (Metrics::Datetime { span_days, .. }, "span_days") => Some(*span_days),
            (Metrics::Text { count, .. }, "count") => Some(*count as f64),
            (Metrics::Text { distinct_count, .. }, "distinct_count") => Some(*distinct_count as f64),
            (Metrics::Text { min_length, .. }, "min_length") => Some(*min_length as f64),
            (Metrics::Text { mean_length, .. }, "mean_length") => Some(*mean_length),
            (Metrics::Text { max_length, .. }, "max_length") => Some(*max_length as f64),
            (Metrics::Text { mean_words, .. }, "mean_words") => Some(*mean_words),
            (Metrics::Correlation { coefficient, .. }, "coefficient") => Some(*coefficient),
            (Metrics::Correlation { n, .. }, "n") => Some(*n as f64),
            (Metrics::Trend { slope, .. }, "slope") => Some(*slope),
            (Metrics::Trend { intercept, .. }, "intercept") => Some(*intercept),
            (Metrics::Trend { r_squared, .. }, "r_squared") => Some(*r_squared),
            (Metrics::Trend {
                standardized_slope, ..
            }, "standardized_slope") => Some(*standardized_slope),
            (Metrics::Trend { n, .. }, "n") => Some(*n as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRecord {
    pub key: StatKey,
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate: Option<SampleInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

impl StatisticRecord {
    fn new(key: StatKey, metrics: Metrics, sample: Option<SampleInfo>) -> Self {
        let flags = sample
            .map(|s| Flag::StatisticsApproximate {
                sample_size: s.sample_size,
                seed: s.seed,
                population: s.population,
            })
            .into_iter()
            .collect();
        Self {
            key,
            metrics,
            approximate: sample,
            flags,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.metric(name)
    }

    pub fn metric_names(&self) -> &'static [&'static str] {
        self.metrics.metric_names()
    }
}

pub struct StatisticsEngine {
    config: StatisticsConfig,
    null_tokens: Vec<String>,
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Column values read once under the sampled row indices.
enum Series {
    Numbers(Vec<Option<f64>>),
    Timestamps(Vec<Option<NaiveDateTime>>),
    Labels(Vec<Option<String>>),
    Missing,
}

impl StatisticsEngine {
    pub fn new() -> Self {
        Self::with_config(StatisticsConfig::default())
    }

    pub fn with_config(config: StatisticsConfig) -> Self {
        Self {
            config,
            null_tokens: ClassifierConfig::default().null_tokens,
        }
    }

    /// Cells matching these tokens are skipped, as the classifier skips them.
    pub fn with_null_tokens(mut self, null_tokens: Vec<String>) -> Self {
        self.null_tokens = null_tokens;
        self
    }

    pub fn compute(&self, table: &Table, metadata: &[ColumnMetadata]) -> Vec<StatisticRecord> {
        let (rows, sample) = self.select_rows(table.row_count());
        if let Some(info) = sample {
            debug!(
                sample_size = info.sample_size,
                population = info.population,
                seed = info.seed,
                "Sampling rows for statistics"
            );
        }

        let series: Vec<(&ColumnMetadata, Series)> = metadata
            .iter()
            .filter_map(|meta| {
                let column = table.column(&meta.name)?;
                Some((
                    meta,
                    read_series(column, meta, rows.as_deref(), &self.null_tokens),
                ))
            })
            .collect();
        let has_numeric = series
            .iter()
            .any(|(meta, _)| meta.semantic_type == SemanticType::Numeric && !meta.is_all_null());

        let mut records = Vec::new();
        for (meta, values) in &series {
            let metrics = self.column_metrics(meta, values, has_numeric);
            records.push(StatisticRecord::new(
                StatKey::Column(meta.name.clone()),
                metrics,
                sample,
            ));
        }

        let numeric: Vec<(&ColumnMetadata, &Vec<Option<f64>>)> = series
            .iter()
            .filter_map(|(meta, s)| match s {
                Series::Numbers(values) if meta.semantic_type == SemanticType::Numeric => {
                    Some((*meta, values))
                }
                _ => None,
            })
            .collect();

        for (i, (a_meta, a)) in numeric.iter().enumerate() {
            for (b_meta, b) in numeric.iter().skip(i + 1) {
                let (xs, ys) = complete_pairs(a, b);
                if let Some(coefficient) = pearson(&xs, &ys) {
                    records.push(StatisticRecord::new(
                        StatKey::Correlation(a_meta.name.clone(), b_meta.name.clone()),
                        Metrics::Correlation {
                            coefficient,
                            n: xs.len(),
                        },
                        sample,
                    ));
                }
            }
        }

        for (t_index, (t_meta, t_series)) in series.iter().enumerate() {
            if !t_meta.is_time_like() {
                continue;
            }
            let (xs, unit) = match t_series {
                Series::Timestamps(values) => (
                    values
                        .iter()
                        .map(|v| v.map(|ts| ts.and_utc().timestamp() as f64 / SECONDS_PER_DAY))
                        .collect::<Vec<_>>(),
                    TrendUnit::Day,
                ),
                Series::Numbers(values) => (values.clone(), TrendUnit::Step),
                _ => continue,
            };
            for (y_index, (y_meta, y_series)) in series.iter().enumerate() {
                if y_index == t_index || y_meta.semantic_type != SemanticType::Numeric {
                    continue;
                }
                // ordinal x ordinal pairs are fitted once, in column order
                if y_meta.is_time_like() && y_index < t_index {
                    continue;
                }
                let Series::Numbers(ys) = y_series else {
                    continue;
                };
                let (x, y) = complete_pairs(&xs, ys);
                if let Some(metrics) = ols_trend(&x, &y, unit) {
                    records.push(StatisticRecord::new(
                        StatKey::Trend(t_meta.name.clone(), y_meta.name.clone()),
                        metrics,
                        sample,
                    ));
                }
            }
        }

        records
    }

    fn select_rows(&self, row_count: usize) -> (Option<Vec<usize>>, Option<SampleInfo>) {
        if row_count <= self.config.sample_ceiling {
            return (None, None);
        }
        let amount = self.config.sample_size.min(row_count);
        let mut rng = StdRng::seed_from_u64(self.config.sample_seed);
        let mut indices = rand::seq::index::sample(&mut rng, row_count, amount).into_vec();
        indices.sort_unstable();
        (
            Some(indices),
            Some(SampleInfo {
                sample_size: amount,
                seed: self.config.sample_seed,
                population: row_count,
            }),
        )
    }

    fn column_metrics(&self, meta: &ColumnMetadata, series: &Series, has_numeric: bool) -> Metrics {
        match series {
            Series::Missing => Metrics::Empty,
            Series::Numbers(values) => {
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                numeric_metrics(present).unwrap_or(Metrics::Empty)
            }
            Series::Timestamps(values) => {
                let present: Vec<NaiveDateTime> = values.iter().flatten().copied().collect();
                datetime_metrics(present, has_numeric).unwrap_or(Metrics::Empty)
            }
            Series::Labels(values) => {
                let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();
                if present.is_empty() {
                    return Metrics::Empty;
                }
                match meta.semantic_type {
                    SemanticType::Categorical | SemanticType::Boolean => {
                        frequency_metrics(&present, self.config.top_n)
                    }
                    _ => text_metrics(&present),
                }
            }
        }
    }
}

fn read_series(
    column: &Column,
    meta: &ColumnMetadata,
    rows: Option<&[usize]>,
    null_tokens: &[String],
) -> Series {
    if meta.is_all_null() {
        return Series::Missing;
    }
    let cells: Vec<&Value> = match rows {
        Some(indices) => indices
            .iter()
            .filter_map(|&i| column.values.get(i))
            .collect(),
        None => column.values.iter().collect(),
    };
    match meta.semantic_type {
        SemanticType::Numeric => Series::Numbers(cells.into_iter().map(numeric_value).collect()),
        SemanticType::Datetime => {
            let format = meta.datetime_format.as_deref().unwrap_or(RFC3339_FORMAT);
            Series::Timestamps(
                cells
                    .into_iter()
                    .map(|v| timestamp_value(v, format))
                    .collect(),
            )
        }
        SemanticType::Boolean | SemanticType::Categorical | SemanticType::Text => {
            let lowercase = meta.semantic_type == SemanticType::Boolean;
            Series::Labels(
                cells
                    .into_iter()
                    .map(|v| {
                        if is_missing(v, null_tokens) {
                            return None;
                        }
                        let label = v.to_text()?.trim().to_string();
                        Some(if lowercase {
                            label.to_ascii_lowercase()
                        } else {
                            label
                        })
                    })
                    .collect(),
            )
        }
    }
}

/// Linear interpolation between closest ranks on sorted data.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn numeric_metrics(mut values: Vec<f64>) -> Option<Metrics> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len() as f64;
    // central moments are taken on values divided by their magnitude
    let scale = magnitude(&values).unwrap_or(1.0);
    let scaled_mean = values.iter().map(|v| v / scale).sum::<f64>() / n;
    let mean = match values.iter().sum::<f64>() / n {
        direct if direct.is_finite() => direct,
        _ => scaled_mean * scale,
    };
    let deviations = values.iter().map(|v| v / scale - scaled_mean);
    let m2 = deviations.clone().map(|d| d.powi(2)).sum::<f64>() / n;
    let m3 = deviations.map(|d| d.powi(3)).sum::<f64>() / n;
    let mean_sq = values.iter().map(|v| (v / scale).powi(2)).sum::<f64>() / n;
    let std_dev = if values.len() > 1 {
        (m2 * n / (n - 1.0)).sqrt() * scale
    } else {
        0.0
    };
    // adjusted Fisher-Pearson coefficient
    let skewness = (values.len() >= 3 && m2 > f64::EPSILON * mean_sq)
        .then(|| (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5))
        .filter(|s| s.is_finite());
    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    let outlier_count = if iqr > 0.0 {
        let lower_bound = q1 - 1.5 * iqr;
        let upper_bound = q3 + 1.5 * iqr;
        values
            .iter()
            .filter(|&&v| v < lower_bound || v > upper_bound)
            .count()
    } else {
        0
    };
    Some(Metrics::Numeric {
        count: values.len(),
        mean,
        median: quantile(&values, 0.5),
        std_dev,
        min: values[0],
        max: values[values.len() - 1],
        q1,
        q3,
        skewness,
        outlier_count,
    })
}

fn frequency_metrics(values: &[&str], top_n: usize) -> Metrics {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let distinct_count = ranked.len();
    let (mode, top_count) = ranked
        .first()
        .map_or((String::new(), 0), |(v, c)| (v.to_string(), *c));
    let other_count: usize = ranked.iter().skip(top_n).map(|(_, c)| c).sum();
    let frequencies = ranked
        .into_iter()
        .take(top_n)
        .map(|(value, count)| FrequencyEntry {
            value: value.to_string(),
            count,
        })
        .collect();
    Metrics::Frequency {
        count: values.len(),
        distinct_count,
        mode,
        top_share: top_count as f64 / values.len() as f64,
        frequencies,
        other_count,
    }
}

fn datetime_metrics(mut values: Vec<NaiveDateTime>, with_granularity: bool) -> Option<Metrics> {
    values.sort_unstable();
    let min = *values.first()?;
    let max = *values.last()?;
    let mut distinct = values.clone();
    distinct.dedup();
    let granularity = if with_granularity && distinct.len() >= 2 {
        let gaps: Vec<i64> = distinct
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds())
            .collect();
        Granularity::from_gaps(&gaps)
    } else {
        None
    };
    Some(Metrics::Datetime {
        count: values.len(),
        distinct_count: distinct.len(),
        min,
        max,
        span_days: (max - min).num_seconds() as f64 / SECONDS_PER_DAY,
        granularity,
    })
}

fn text_metrics(values: &[&str]) -> Metrics {
    let lengths: Vec<usize> = values.iter().map(|v| v.chars().count()).collect();
    let words: usize = values.iter().map(|v| v.split_whitespace().count()).sum();
    let distinct_count = values.iter().collect::<HashSet<_>>().len();
    let n = values.len() as f64;
    Metrics::Text {
        count: values.len(),
        distinct_count,
        min_length: lengths.iter().copied().min().unwrap_or(0),
        mean_length: lengths.iter().sum::<usize>() as f64 / n,
        max_length: lengths.iter().copied().max().unwrap_or(0),
        mean_words: words as f64 / n,
    }
}

fn complete_pairs(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

/// Largest magnitude in the series, or `None` when it is zero or not finite.
fn magnitude(values: &[f64]) -> Option<f64> {
    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    (scale.is_finite() && scale > 0.0).then_some(scale)
}

/// Centred sums over values divided by their magnitude, so neither tiny nor
/// huge inputs underflow or overflow. Means are in original units.
struct Moments {
    mean_x: f64,
    mean_y: f64,
    scale_x: f64,
    scale_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

fn moments(xs: &[f64], ys: &[f64]) -> Option<Moments> {
    if xs.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    let scale_x = magnitude(xs)?;
    let scale_y = magnitude(ys)?;
    let n = xs.len() as f64;
    let mean_x = xs.iter().map(|x| x / scale_x).sum::<f64>() / n;
    let mean_y = ys.iter().map(|y| y / scale_y).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    let (mut sum_sq_x, mut sum_sq_y) = (0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (x, y) = (x / scale_x, y / scale_y);
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
        sum_sq_x += x * x;
        sum_sq_y += y * y;
    }
    // spread at rounding level counts as constant
    if !(sxx.is_finite() && syy.is_finite())
        || sxx <= f64::EPSILON * sum_sq_x
        || syy <= f64::EPSILON * sum_sq_y
    {
        return None;
    }
    Some(Moments {
        mean_x: mean_x * scale_x,
        mean_y: mean_y * scale_y,
        scale_x,
        scale_y,
        sxx,
        syy,
        sxy,
    })
}

impl Moments {
    fn coefficient(&self) -> Option<f64> {
        let r = self.sxy / (self.sxx * self.syy).sqrt();
        r.is_finite().then(|| r.clamp(-1.0, 1.0))
    }
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    moments(xs, ys)?.coefficient()
}

fn ols_trend(xs: &[f64], ys: &[f64], unit: TrendUnit) -> Option<Metrics> {
    let m = moments(xs, ys)?;
    // slope * sx / sy, which reduces to r for a single regressor
    let standardized_slope = m.coefficient()?;
    let slope = m.sxy / m.sxx * (m.scale_y / m.scale_x);
    let intercept = m.mean_y - slope * m.mean_x;
    let r_squared = ((m.sxy * m.sxy) / (m.sxx * m.syy)).clamp(0.0, 1.0);
    if !(slope.is_finite() && intercept.is_finite() && r_squared.is_finite()) {
        return None;
    }
    Some(Metrics::Trend {
        slope,
        intercept,
        r_squared,
        standardized_slope,
        n: xs.len(),
        unit,
    })
}
