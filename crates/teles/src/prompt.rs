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

//! Prompt assembly for language-model augmentation.
//!
//! Only the derived profile is ever serialised into a prompt; raw rows never
//! leave the engine.

use crate::profile::Profile;
use crate::statistics::Metrics;
use llm_contracts::{GenerationConfig, LLMRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TRUNCATION_MARKER: &str = "- (summary truncated)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub system_template: String,
    pub user_template: String,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        system_template: impl Into<String>,
        user_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system_template: system_template.into(),
            user_template: user_template.into(),
        }
    }

    /// Fills `{{key}}` placeholders; returns `(system, user)`.
    pub fn render(&self, variables: &[(&str, &str)]) -> (String, String) {
        let system = substitute(&self.system_template, variables);
        let user = substitute(&self.user_template, variables);
        if system.contains("{{") || user.contains("{{") {
            warn!(template = %self.name, "Template contains unsubstituted placeholders");
        }
        debug!(
            template = %self.name,
            variables = variables.len(),
            "Rendered prompt template"
        );
        (system, user)
    }

    pub fn insights() -> Self {
        Self::new(
            "insights",
            "You are a data analyst. Analyze the provided data summary and state the most \
             important findings. Reply with one insight per line and nothing else.",
            "{{summary}}\n\nList up to {{max_insights}} insights about this dataset.",
        )
    }

    pub fn question() -> Self {
        Self::new(
            "question",
            "You are a data analyst. Analyze the provided data and answer the user's question \
             with clear, actionable insights.",
            "{{summary}}\n\nUser Question: {{question}}",
        )
    }
}

fn substitute(template: &str, variables: &[(&str, &str)]) -> String {
    variables
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{{{key}}}}}"), value)
        })
}

/// Bounded plain-text rendering of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSummary {
    pub text: String,
    pub truncated: bool,
}

impl ContextSummary {
    pub fn from_profile(profile: &Profile, max_chars: usize) -> Self {
        let lines = summary_lines(profile);
        let total: usize = lines.iter().map(|l| l.len() + 1).sum();
        if total <= max_chars {
            return Self {
                text: lines.join("\n"),
                truncated: false,
            };
        }

        let budget = max_chars.saturating_sub(TRUNCATION_MARKER.len() + 1);
        let mut kept = Vec::new();
        let mut used = 0;
        for line in lines {
            if used + line.len() + 1 > budget {
                break;
            }
            used += line.len() + 1;
            kept.push(line);
        }
        kept.push(TRUNCATION_MARKER.to_string());
        Self {
            text: kept.join("\n"),
            truncated: true,
        }
    }
}

fn summary_lines(profile: &Profile) -> Vec<String> {
    let mut lines = vec![
        "Data Summary:".to_string(),
        format!("- Rows: {}", profile.row_count),
        format!("- Columns: {}", profile.column_count),
        format!(
            "- Data Types: {}",
            profile
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.semantic_type))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        format!(
            "- Missing Values: {}",
            profile
                .columns
                .iter()
                .map(|c| format!("{}: {}", c.name, c.null_count))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ];
    if profile.is_approximate() {
        lines.push("- Statistics computed on a uniform sample".to_string());
    }

    if !profile.relationships.is_empty() {
        lines.push("Relationships:".to_string());
        lines.extend(
            profile
                .relationships
                .iter()
                .map(|r| format!("- {}", r.description)),
        );
    }

    lines.push("Column Statistics:".to_string());
    for column in &profile.columns {
        let Some(record) = profile.column_statistic(&column.name) else {
            continue;
        };
        let detail = match &record.metrics {
            Metrics::Numeric {
                mean,
                median,
                std_dev,
                min,
                max,
                skewness,
                outlier_count,
                ..
            } => {
                let mut detail = format!(
                    "mean={mean:.3}, median={median:.3}, std_dev={std_dev:.3}, min={min}, max={max}"
                );
                if let Some(skew) = skewness {
                    detail.push_str(&format!(", skewness={skew:.2}"));
                }
                if *outlier_count > 0 {
                    detail.push_str(&format!(", outliers={outlier_count}"));
                }
                detail
            }
            Metrics::Frequency {
                mode,
                top_share,
                distinct_count,
                frequencies,
                ..
            } => format!(
                "distinct={distinct_count}, mode={mode} ({:.0}%), top values: {}",
                top_share * 100.0,
                frequencies
                    .iter()
                    .take(5)
                    .map(|f| format!("{}={}", f.value, f.count))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Metrics::Datetime {
                min,
                max,
                span_days,
                granularity,
                ..
            } => {
                let mut detail = format!("from {min} to {max}, span {span_days:.1} days");
                if let Some(granularity) = granularity {
                    detail.push_str(&format!(", {} granularity", granularity.as_str()));
                }
                detail
            }
            Metrics::Text {
                mean_length,
                distinct_count,
                ..
            } => format!("distinct={distinct_count}, mean length={mean_length:.1} chars"),
            Metrics::Empty => "no values".to_string(),
            Metrics::Correlation { .. } | Metrics::Trend { .. } => continue,
        };
        lines.push(format!("- {} ({}): {detail}", column.name, column.semantic_type));
    }
    lines
}

pub fn insight_request(
    summary: &ContextSummary,
    max_insights: usize,
    generation: GenerationConfig,
) -> LLMRequest {
    let max_insights = max_insights.to_string();
    let (system, user) = PromptTemplate::insights().render(&[
        ("summary", summary.text.as_str()),
        ("max_insights", max_insights.as_str()),
    ]);
    LLMRequest::new(user)
        .with_system_prompt(system)
        .with_generation_config(generation)
}

pub fn question_request(
    summary: &ContextSummary,
    question: &str,
    generation: GenerationConfig,
) -> LLMRequest {
    let (system, user) =
        PromptTemplate::question().render(&[("summary", summary.text.as_str()), ("question", question)]);
    LLMRequest::new(user)
        .with_system_prompt(system)
        .with_generation_config(generation)
}

/// Splits a model reply into insight lines, dropping bullets and numbering.
pub fn parse_insight_lines(reply: &str, limit: usize) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim();
        }
    }
    line
}
