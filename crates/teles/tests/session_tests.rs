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

use async_trait::async_trait;
use chrono::NaiveDate;
use llm_contracts::{LLMRequest, LLMResponse, LLMResult, LanguageModel};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teles::{
    AnalysisError, AnalysisSession, Channel, ChartKind, Column, Direction, EngineConfig, Flag,
    InsightSource, RelationshipKind, SemanticType, Table, Value,
};
use tokio_util::sync::CancellationToken;

fn daily_dates(days: i64) -> Vec<Value> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..days)
        .map(|i| Value::Text((start + chrono::Duration::days(i)).format("%Y-%m-%d").to_string()))
        .collect()
}

/// Strictly increasing sales, optionally whole numbers.
fn steady_daily_sales(whole: bool) -> Table {
    let sales: Vec<Value> = (0..30)
        .map(|i| {
            if whole {
                Value::Int(100 + 2 * i)
            } else {
                Value::Float(100.5 + 2.0 * i as f64)
            }
        })
        .collect();
    Table::new(vec![
        Column::new("date", daily_dates(30)),
        Column::new("sales", sales),
    ])
    .unwrap()
}

fn daily_sales() -> Table {
    let dates = daily_dates(90);
    let sales: Vec<f64> = (0..90)
        .map(|i| 100.0 + 2.0 * i as f64 + ((i * 7) % 5) as f64 + 0.5)
        .collect();
    let regions: Vec<&str> = (0..90)
        .map(|i| ["north", "south", "east", "west"][i % 4])
        .collect();
    Table::new(vec![
        Column::new("date", dates),
        Column::new("sales", sales),
        Column::new("region", regions),
    ])
    .unwrap()
}

struct EchoModel {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if request.prompt.contains("User Question:") {
            "Sales rise by about two units per day.".to_string()
        } else {
            "1. Weekend effects are not visible in this data".to_string()
        };
        Ok(LLMResponse::new(request.id, reply, "echo-1"))
    }
}

struct SlowModel;

#[async_trait]
impl LanguageModel for SlowModel {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(LLMResponse::new(request.id, "too late", "slow"))
    }
}

struct BlankModel;

#[async_trait]
impl LanguageModel for BlankModel {
    fn name(&self) -> &str {
        "blank"
    }

    async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        Ok(LLMResponse::new(request.id, "   \n", "blank"))
    }
}

fn fast_timeout_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.llm.timeout_ms = 50;
    config
}

#[test]
fn test_daily_sales_end_to_end() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    let profile = session.load_dataset(daily_sales()).unwrap();

    assert_eq!(profile.row_count, 90);
    assert_eq!(profile.column("date").unwrap().semantic_type, SemanticType::Datetime);
    assert_eq!(profile.column("sales").unwrap().semantic_type, SemanticType::Numeric);
    assert_eq!(profile.column("region").unwrap().semantic_type, SemanticType::Categorical);

    let trend = profile
        .relationships
        .iter()
        .find(|r| r.kind == RelationshipKind::Trend)
        .expect("trend between date and sales");
    assert_eq!(trend.columns, vec!["date".to_string(), "sales".to_string()]);
    assert_eq!(trend.direction, Direction::Positive);
    assert!(trend.r_squared.unwrap() > 0.9);

    let charts = session.auto_charts().unwrap();
    let line = charts
        .iter()
        .find(|c| c.kind == ChartKind::Line)
        .expect("line chart for the trend");
    assert_eq!(line.column_for(Channel::X), Some("date"));
    assert_eq!(line.column_for(Channel::Y), Some("sales"));
    assert!(charts
        .iter()
        .any(|c| c.kind == ChartKind::Bar && c.column_for(Channel::X) == Some("region")));
    assert!(charts.len() <= session.config().charts.max_auto_charts);
}

#[test]
fn test_strictly_increasing_sales_trend() {
    for whole in [false, true] {
        let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
        let profile = session.load_dataset(steady_daily_sales(whole)).unwrap();
        let sales = profile.column("sales").unwrap();
        assert_eq!(sales.semantic_type, SemanticType::Numeric);
        assert_eq!(sales.ordinal, whole);

        let trend = profile
            .relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::Trend)
            .expect("trend between date and sales");
        assert_eq!(trend.columns, vec!["date".to_string(), "sales".to_string()]);
        assert_eq!(trend.direction, Direction::Positive);
        assert!((trend.slope.unwrap() - 2.0).abs() < 1e-9);
        assert!((trend.r_squared.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(
            profile
                .relationships
                .iter()
                .filter(|r| r.kind == RelationshipKind::Trend)
                .count(),
            1
        );

        let charts = session.auto_charts().unwrap();
        let line = charts.iter().find(|c| c.kind == ChartKind::Line).unwrap();
        assert_eq!(line.column_for(Channel::X), Some("date"));
        assert_eq!(line.column_for(Channel::Y), Some("sales"));
        // ordinal columns are axes, not distributions
        let histogram = charts.iter().any(|c| c.kind == ChartKind::Histogram);
        assert_eq!(histogram, !whole);
    }
}

#[tokio::test]
async fn test_insights_without_model_are_flagged() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    session.load_dataset(daily_sales()).unwrap();

    let report = session.insights().await.unwrap();
    assert!(!report.is_empty());
    assert!(report.augmentation_unavailable());
    assert!(report
        .insights
        .iter()
        .any(|i| i.text.contains("increasing trend")));
    assert_eq!(report.from_source(InsightSource::LanguageModel).count(), 0);
}

#[tokio::test]
async fn test_insights_with_model_are_merged() {
    let model = Arc::new(EchoModel {
        calls: AtomicUsize::new(0),
    });
    let mut session = AnalysisSession::new(EngineConfig::default())
        .unwrap()
        .with_language_model(model.clone());
    session.load_dataset(daily_sales()).unwrap();

    let report = session.insights().await.unwrap();
    assert!(!report.augmentation_unavailable());
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    let rule_based = report.from_source(InsightSource::RuleBased).count();
    let augmented: Vec<_> = report.from_source(InsightSource::LanguageModel).collect();
    assert!(rule_based > 0);
    assert_eq!(augmented.len(), 1);
    assert!(report.insights.last().unwrap().source == InsightSource::LanguageModel);
}

#[tokio::test]
async fn test_ask_answers_from_summary() {
    let mut session = AnalysisSession::new(EngineConfig::default())
        .unwrap()
        .with_language_model(Arc::new(EchoModel {
            calls: AtomicUsize::new(0),
        }));
    session.load_dataset(daily_sales()).unwrap();

    let answer = session.ask("How do sales change over time?").await.unwrap();
    assert_eq!(answer, "Sales rise by about two units per day.");
}

#[tokio::test]
async fn test_ask_without_model_is_unavailable() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    session.load_dataset(daily_sales()).unwrap();
    assert!(matches!(
        session.ask("What is the best region?").await,
        Err(AnalysisError::AugmentationUnavailable(_))
    ));
}

#[tokio::test]
async fn test_ask_before_load_is_no_dataset() {
    let session = AnalysisSession::new(EngineConfig::default()).unwrap();
    assert!(matches!(
        session.ask("Anything?").await,
        Err(AnalysisError::NoDataset)
    ));
}

#[tokio::test]
async fn test_slow_model_times_out() {
    let mut session = AnalysisSession::new(fast_timeout_config())
        .unwrap()
        .with_language_model(Arc::new(SlowModel));
    session.load_dataset(daily_sales()).unwrap();

    let started = Instant::now();
    let result = session.ask("Which region sells most?").await;
    assert!(matches!(result, Err(AnalysisError::AugmentationUnavailable(_))));
    assert!(started.elapsed() < Duration::from_secs(2));

    let started = Instant::now();
    let report = session.insights().await.unwrap();
    assert!(report.augmentation_unavailable());
    assert!(!report.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancelled_request_is_unavailable() {
    let mut session = AnalysisSession::new(EngineConfig::default())
        .unwrap()
        .with_language_model(Arc::new(SlowModel));
    session.load_dataset(daily_sales()).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = session.ask_with_cancel("Which region sells most?", &token).await;
    assert!(matches!(result, Err(AnalysisError::AugmentationUnavailable(_))));

    let report = session.insights_with_cancel(&token).await.unwrap();
    assert!(report.augmentation_unavailable());
}

#[tokio::test]
async fn test_blank_answer_is_unavailable() {
    let mut session = AnalysisSession::new(EngineConfig::default())
        .unwrap()
        .with_language_model(Arc::new(BlankModel));
    session.load_dataset(daily_sales()).unwrap();
    assert!(matches!(
        session.ask("Anything notable?").await,
        Err(AnalysisError::AugmentationUnavailable(_))
    ));
}

#[test]
fn test_custom_chart_rules() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    session.load_dataset(daily_sales()).unwrap();

    let chart = session
        .custom_chart(ChartKind::Bar, &["region", "sales"])
        .unwrap();
    assert_eq!(chart.column_for(Channel::X), Some("region"));
    assert_eq!(chart.column_for(Channel::Y), Some("sales"));

    let err = session
        .custom_chart(ChartKind::Scatter, &["region", "date"])
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidBinding { .. }));

    let err = session
        .custom_chart(ChartKind::Histogram, &["missing"])
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidBinding { .. }));
}

#[test]
fn test_empty_table_is_rejected() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    let empty = Table::new(vec![Column::new("a", Vec::<f64>::new())]).unwrap();
    assert!(matches!(
        session.load_dataset(empty),
        Err(AnalysisError::EmptyTable)
    ));
    let profile = session.profile().unwrap();
    assert!(profile.is_empty());
    assert!(session.auto_charts().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_table_never_reaches_model() {
    let model = Arc::new(EchoModel {
        calls: AtomicUsize::new(0),
    });
    let mut session = AnalysisSession::new(EngineConfig::default())
        .unwrap()
        .with_language_model(model.clone());
    let empty = Table::new(vec![Column::new("a", Vec::<f64>::new())]).unwrap();
    assert!(session.load_dataset(empty).is_err());

    let report = session.insights().await.unwrap();
    assert!(report.augmentation_unavailable());
    assert!(matches!(
        session.ask("What is the average?").await,
        Err(AnalysisError::EmptyTable)
    ));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reloading_same_content_hits_cache() {
    let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
    let first = session.load_dataset(daily_sales()).unwrap().clone();
    let second = session.load_dataset(daily_sales()).unwrap();
    assert_eq!(&first, second);
}

#[test]
fn test_large_table_statistics_are_sampled() {
    let mut config = EngineConfig::default();
    config.statistics.sample_ceiling = 100;
    config.statistics.sample_size = 50;
    let table = Table::new(vec![
        Column::new("x", (0..400).map(|i| i as f64 * 0.5 + 0.25).collect::<Vec<_>>()),
        Column::new("y", (0..400).map(|i| (i % 17) as f64 + 0.5).collect::<Vec<_>>()),
    ])
    .unwrap();

    let mut session = AnalysisSession::new(config).unwrap();
    let profile = session.load_dataset(table).unwrap();
    assert!(profile.is_approximate());
    assert!(profile.flags.iter().any(|f| matches!(
        f,
        Flag::StatisticsApproximate {
            sample_size: 50,
            population: 400,
            ..
        }
    )));
    let count = profile.column_statistic("x").unwrap().metric("count");
    assert_eq!(count, Some(50.0));
}

#[test]
fn test_config_file_is_applied() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "charts:\n  max_auto_charts: 1\nllm:\n  timeout_ms: 250").unwrap();

    let config = EngineConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.llm.timeout(), Duration::from_millis(250));

    let mut session = AnalysisSession::new(config).unwrap();
    session.load_dataset(daily_sales()).unwrap();
    assert_eq!(session.auto_charts().unwrap().len(), 1);
}
