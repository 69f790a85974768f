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

//! Narrative insights in two tiers.
//!
//! The rule-based tier always runs and never fails. The language-model tier
//! is best effort: it is bounded by a timeout, can be cancelled, and on any
//! failure contributes nothing except an `AugmentationUnavailable` flag.

use crate::classifier::ColumnMetadata;
use crate::config::{InsightConfig, LlmSettings};
use crate::error::{Flag, Result};
use crate::profile::Profile;
use crate::prompt::{insight_request, parse_insight_lines, ContextSummary};
use crate::relationships::{strength_label, Direction, Relationship, RelationshipKind};
use crate::statistics::{Metrics, StatKey, TrendUnit};
use llm_contracts::{LLMError, LLMRequest, LLMResponse, LLMResult, LanguageModel, RequestContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OVERVIEW_SALIENCE: f64 = 0.1;
const MODEL_SALIENCE: f64 = 0.09;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    RuleBased,
    LanguageModel,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Statistic(StatKey),
    Relationship {
        kind: RelationshipKind,
        columns: Vec<String>,
    },
}

impl Evidence {
    fn of_relationship(relationship: &Relationship) -> Self {
        Evidence::Relationship {
            kind: relationship.kind,
            columns: relationship.columns.clone(),
        }
    }

    fn of_column(name: &str) -> Self {
        Evidence::Statistic(StatKey::Column(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub text: String,
    pub evidence: Vec<Evidence>,
    pub source: InsightSource,
    pub salience: f64,
}

impl Insight {
    fn rule(text: String, evidence: Vec<Evidence>, salience: f64) -> Self {
        Self {
            text,
            evidence,
            source: InsightSource::RuleBased,
            salience,
        }
    }

    fn evidence_set(&self) -> BTreeSet<&Evidence> {
        self.evidence.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

impl InsightReport {
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn from_source(&self, source: InsightSource) -> impl Iterator<Item = &Insight> {
        self.insights.iter().filter(move |i| i.source == source)
    }

    pub fn augmentation_unavailable(&self) -> bool {
        self.flags
            .iter()
            .any(|f| matches!(f, Flag::AugmentationUnavailable { .. }))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a model call under a deadline and a cancellation token.
///
/// Never retries. Blank replies are reported as [`LLMError::EmptyResponse`].
pub async fn complete_bounded(
    model: &dyn LanguageModel,
    request: LLMRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> LLMResult<LLMResponse> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LLMError::Cancelled),
        outcome = tokio::time::timeout(timeout, model.complete(request)) => match outcome {
            Ok(result) => result,
            Err(_) => Err(LLMError::Timeout),
        },
    }?;
    if response.is_blank() {
        return Err(LLMError::EmptyResponse);
    }
    Ok(response)
}

pub struct InsightSynthesizer {
    config: InsightConfig,
    llm: LlmSettings,
    session_id: Option<String>,
}

impl Default for InsightSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightSynthesizer {
    pub fn new() -> Self {
        Self::with_config(InsightConfig::default(), LlmSettings::default())
    }

    pub fn with_config(config: InsightConfig, llm: LlmSettings) -> Self {
        Self {
            config,
            llm,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub async fn synthesize(
        &self,
        profile: &Profile,
        model: Option<&dyn LanguageModel>,
        cancel: &CancellationToken,
    ) -> InsightReport {
        let mut insights = self.rule_based(profile);
        let mut flags = profile.flags.clone();

        let outcome = match model {
            None => Err("no language model configured".to_string()),
            Some(_) if profile.is_empty() => Err("dataset is empty".to_string()),
            Some(model) => self.model_insights(profile, model, cancel).await,
        };
        match outcome {
            Ok(lines) => {
                let accepted = self.merge_model_insights(&insights, lines, profile);
                info!(
                    rule_based = insights.len(),
                    language_model = accepted.len(),
                    "Insights synthesized"
                );
                insights.extend(accepted);
            }
            Err(reason) => {
                debug!(reason = %reason, "Insight augmentation skipped");
                flags.push(Flag::AugmentationUnavailable { reason });
            }
        }

        insights.sort_by(|a, b| b.salience.total_cmp(&a.salience));
        InsightReport { insights, flags }
    }

    async fn model_insights(
        &self,
        profile: &Profile,
        model: &dyn LanguageModel,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<String>, String> {
        let summary = ContextSummary::from_profile(profile, self.config.max_summary_chars);
        let mut request = insight_request(
            &summary,
            self.config.max_model_insights,
            self.llm.generation.to_generation_config(),
        );
        if let Some(session_id) = &self.session_id {
            request = request.with_context(RequestContext::for_session(session_id.clone()));
        }
        match complete_bounded(model, request, self.llm.timeout(), cancel).await {
            Ok(response) => Ok(parse_insight_lines(
                &response.content,
                self.config.max_model_insights,
            )),
            Err(err) => {
                warn!(model = model.name(), error = %err, "Language model insight request failed");
                Err(err.to_string())
            }
        }
    }

    fn merge_model_insights(
        &self,
        rule_based: &[Insight],
        lines: Vec<String>,
        profile: &Profile,
    ) -> Vec<Insight> {
        let covered: Vec<BTreeSet<&Evidence>> = rule_based
            .iter()
            .map(Insight::evidence_set)
            .filter(|set| !set.is_empty())
            .collect();
        let mut seen_texts: BTreeSet<String> =
            rule_based.iter().map(|i| normalise(&i.text)).collect();

        let mut accepted = Vec::new();
        for line in lines {
            if !seen_texts.insert(normalise(&line)) {
                continue;
            }
            let evidence = model_evidence(&line, profile);
            let set: BTreeSet<&Evidence> = evidence.iter().collect();
            if !set.is_empty() && covered.contains(&set) {
                debug!(text = %line, "Dropping model insight already covered by a rule");
                continue;
            }
            let salience = MODEL_SALIENCE - accepted.len() as f64 * 0.001;
            accepted.push(Insight {
                text: line,
                evidence,
                source: InsightSource::LanguageModel,
                salience,
            });
        }
        accepted
    }

    /// Deterministic insights derived from the profile alone.
    pub fn rule_based(&self, profile: &Profile) -> Vec<Insight> {
        let mut insights: Vec<Insight> = profile
            .relationships
            .iter()
            .map(relationship_insight)
            .collect();

        for column in &profile.columns {
            self.column_insights(profile, column, &mut insights);
        }

        insights.sort_by(|a, b| b.salience.total_cmp(&a.salience));
        if profile.columns.iter().any(|c| !c.is_all_null()) {
            let summary = profile.summary();
            insights.push(Insight::rule(
                format!(
                    "The dataset has {} rows and {} columns ({}).",
                    profile.row_count,
                    profile.column_count,
                    summary.type_mix()
                ),
                Vec::new(),
                OVERVIEW_SALIENCE,
            ));
        }
        insights
    }

    fn column_insights(&self, profile: &Profile, column: &ColumnMetadata, out: &mut Vec<Insight>) {
        let name = column.name.as_str();
        let evidence = || vec![Evidence::of_column(name)];

        for flag in &column.flags {
            if let Flag::ClassificationDegraded { reason, .. } = flag {
                out.push(Insight::rule(
                    format!("{name} could not be typed reliably and is treated as text: {reason}."),
                    evidence(),
                    0.35,
                ));
            }
        }
        if column.is_all_null() {
            return;
        }

        let share = column.null_share();
        if share > self.config.missing_threshold {
            out.push(Insight::rule(
                format!(
                    "{name} is missing {:.0}% of its values ({} of {} rows).",
                    share * 100.0,
                    column.null_count,
                    column.row_count
                ),
                evidence(),
                (0.4 + 0.3 * share).min(0.7),
            ));
        }

        let Some(record) = profile.column_statistic(name) else {
            return;
        };
        match &record.metrics {
            Metrics::Numeric {
                count,
                median,
                std_dev,
                min,
                max,
                skewness,
                outlier_count,
                ..
            } => {
                if *count > 1 && *std_dev == 0.0 {
                    out.push(Insight::rule(
                        format!("{name} is constant at {min} across all {count} values."),
                        evidence(),
                        0.3,
                    ));
                    return;
                }
                if let Some(skew) = skewness.filter(|s| s.abs() >= self.config.skew_threshold) {
                    let (side, tail) = if skew > 0.0 {
                        ("right", max)
                    } else {
                        ("left", min)
                    };
                    out.push(Insight::rule(
                        format!(
                            "{name} is {side}-skewed (skewness {skew:.2}): most values sit near the median {median:.2} while a long tail reaches {tail}."
                        ),
                        evidence(),
                        (0.4 + 0.05 * skew.abs()).min(0.6),
                    ));
                }
                let outlier_share = *outlier_count as f64 / *count as f64;
                if *outlier_count > 0 && outlier_share >= self.config.outlier_share {
                    out.push(Insight::rule(
                        format!(
                            "{name} has {outlier_count} outliers ({:.1}% of values) beyond 1.5 times the interquartile range.",
                            outlier_share * 100.0
                        ),
                        evidence(),
                        0.45,
                    ));
                }
            }
            Metrics::Frequency {
                count,
                distinct_count,
                mode,
                top_share,
                ..
            } => {
                if *distinct_count == 1 {
                    out.push(Insight::rule(
                        format!("{name} has the single value '{mode}' in all {count} rows."),
                        evidence(),
                        0.3,
                    ));
                } else if *top_share > self.config.dominant_share {
                    out.push(Insight::rule(
                        format!(
                            "'{mode}' dominates {name}, accounting for {:.0}% of values.",
                            top_share * 100.0
                        ),
                        evidence(),
                        0.3 + 0.3 * top_share,
                    ));
                }
            }
            Metrics::Datetime {
                distinct_count,
                min,
                max,
                span_days,
                granularity,
                ..
            } => {
                if *distinct_count == 1 {
                    out.push(Insight::rule(
                        format!("{name} holds a single timestamp, {min}."),
                        evidence(),
                        0.3,
                    ));
                    return;
                }
                let mut text = format!(
                    "{name} covers {span_days:.0} days, from {} to {}",
                    min.date(),
                    max.date()
                );
                if let Some(granularity) = granularity {
                    text.push_str(&format!(" at {} granularity", granularity.as_str()));
                }
                text.push('.');
                out.push(Insight::rule(text, evidence(), 0.3));
            }
            Metrics::Text { .. }
            | Metrics::Empty
            | Metrics::Correlation { .. }
            | Metrics::Trend { .. } => {}
        }
    }
}

fn relationship_insight(relationship: &Relationship) -> Insight {
    let text = match (relationship.kind, relationship.columns.as_slice()) {
        (RelationshipKind::Trend, [time, value]) => {
            let heading = match relationship.direction {
                Direction::Positive => "an increasing",
                Direction::Negative => "a decreasing",
            };
            let per = match relationship.unit {
                Some(TrendUnit::Day) => "per day",
                _ => "per step",
            };
            format!(
                "{value} shows {heading} trend over {time}, changing by {:+.3} {per} (R² = {:.2}).",
                relationship.slope.unwrap_or_default(),
                relationship.r_squared.unwrap_or_default()
            )
        }
        (RelationshipKind::Correlation, [a, b]) => {
            let movement = match relationship.direction {
                Direction::Positive => "rise",
                Direction::Negative => "fall",
            };
            format!(
                "{a} and {b} have a {} {} correlation (r = {:.2}): as {a} increases, {b} tends to {movement}.",
                strength_label(relationship.strength),
                relationship.direction.as_str(),
                relationship.strength
            )
        }
        _ => relationship.description.clone(),
    };
    Insight::rule(
        text,
        vec![Evidence::of_relationship(relationship)],
        0.5 + 0.5 * relationship.strength.abs().min(1.0),
    )
}

/// Evidence for a free-form model sentence, from the column names it mentions.
fn model_evidence(text: &str, profile: &Profile) -> Vec<Evidence> {
    let lowered = text.to_lowercase();
    let mentioned: Vec<&str> = profile
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| mentions(&lowered, &name.to_lowercase()))
        .collect();
    if mentioned.len() >= 2 {
        if let Some(relationship) = profile.relationships.iter().find(|r| {
            r.columns.len() == mentioned.len()
                && r.columns.iter().all(|c| mentioned.contains(&c.as_str()))
        }) {
            return vec![Evidence::of_relationship(relationship)];
        }
    }
    mentioned.into_iter().map(Evidence::of_column).collect()
}

fn mentions(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(name).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

fn normalise(text: &str) -> String {
    text.trim()
        .trim_end_matches('.')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::table::{Column, Table, Value};
    use async_trait::async_trait;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
            Ok(LLMResponse::new(request.id, self.reply.clone(), "scripted"))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: LLMRequest) -> LLMResult<LLMResponse> {
            Err(LLMError::Provider("upstream unavailable".to_string()))
        }
    }

    fn profile() -> Profile {
        let mut amounts: Vec<f64> = (1..=20).map(|i| i as f64 + 0.5).collect();
        amounts.extend([400.0, 420.0]);
        let table = Table::new(vec![
            Column::new("amount", amounts),
            Column::new(
                "channel",
                (0..22)
                    .map(|i| if i % 5 == 0 { "store" } else { "web" })
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "coupon",
                (0..22)
                    .map(|i| if i % 3 == 0 { Value::Null } else { Value::from("SAVE10") })
                    .collect::<Vec<_>>(),
            ),
        ])
        .unwrap();
        Profile::build(&table, &EngineConfig::default())
    }

    #[test]
    fn test_rule_based_facts() {
        let insights = InsightSynthesizer::new().rule_based(&profile());
        let texts: Vec<&str> = insights.iter().map(|i| i.text.as_str()).collect();
        assert!(texts.iter().any(|t| t.starts_with("amount is right-skewed")));
        assert!(texts.iter().any(|t| t.starts_with("amount has 2 outliers (9.1% of values)")));
        assert!(texts.iter().any(|t| t.starts_with("'web' dominates channel")));
        assert!(texts.iter().any(|t| t.starts_with("coupon is missing 36%")));
        assert!(texts.iter().any(|t| t.starts_with("coupon has the single value 'SAVE10'")));
        assert!(insights.last().unwrap().text.starts_with("The dataset has 22 rows and 3 columns"));
        assert!(insights
            .iter()
            .all(|i| i.source == InsightSource::RuleBased));
    }

    #[test]
    fn test_all_null_table_has_no_overview() {
        let table = Table::new(vec![Column::new("x", [Value::Null, Value::Null])]).unwrap();
        let profile = Profile::build(&table, &EngineConfig::default());
        let insights = InsightSynthesizer::new().rule_based(&profile);
        assert!(insights.iter().all(|i| !i.text.starts_with("The dataset has")));
    }

    #[tokio::test]
    async fn test_without_model_flags_augmentation() {
        let report = InsightSynthesizer::new()
            .synthesize(&profile(), None, &CancellationToken::new())
            .await;
        assert!(!report.is_empty());
        assert!(report.augmentation_unavailable());
    }

    #[tokio::test]
    async fn test_model_lines_are_merged_below_rules() {
        let model = ScriptedModel {
            reply: "1. Web orders drive most of the business\n2. channel is mostly web\n- Weekend volume is unknown".to_string(),
        };
        let report = InsightSynthesizer::new()
            .synthesize(&profile(), Some(&model), &CancellationToken::new())
            .await;
        assert!(!report.augmentation_unavailable());
        let model_texts: Vec<&str> = report
            .from_source(InsightSource::LanguageModel)
            .map(|i| i.text.as_str())
            .collect();
        // "channel is mostly web" names only channel, already covered by a rule
        assert_eq!(
            model_texts,
            vec![
                "Web orders drive most of the business",
                "Weekend volume is unknown"
            ]
        );
        let first_model = report
            .insights
            .iter()
            .position(|i| i.source == InsightSource::LanguageModel)
            .unwrap();
        assert!(report.insights[..first_model]
            .iter()
            .all(|i| i.source == InsightSource::RuleBased));
    }

    #[tokio::test]
    async fn test_failed_model_keeps_rule_based_tier() {
        let report = InsightSynthesizer::new()
            .synthesize(&profile(), Some(&FailingModel), &CancellationToken::new())
            .await;
        assert!(report.augmentation_unavailable());
        assert_eq!(report.from_source(InsightSource::LanguageModel).count(), 0);
        assert!(report.len() >= 4);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let model = ScriptedModel {
            reply: "anything".to_string(),
        };
        let err = complete_bounded(&model, LLMRequest::new("hi"), Duration::from_secs(5), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Cancelled));
    }

    #[tokio::test]
    async fn test_blank_reply_is_empty_response() {
        let model = ScriptedModel {
            reply: "   \n".to_string(),
        };
        let err = complete_bounded(
            &model,
            LLMRequest::new("hi"),
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LLMError::EmptyResponse));
    }

    #[test]
    fn test_mentions_respects_word_boundaries() {
        assert!(mentions("sales rose in march", "sales"));
        assert!(!mentions("wholesales rose", "sales"));
        assert!(!mentions("sales_tax rose", "sales"));
    }
}
