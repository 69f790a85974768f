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

mod ollama;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use teles::{AnalysisError, AnalysisSession, ChartKind, EngineConfig, Table, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::ollama::OllamaModel;

#[derive(Parser, Debug, Clone)]
#[command(name = "teles-demo")]
#[command(about = "Profile a CSV file and print insights and chart suggestions.")]
struct Cli {
    /// CSV file with a header row.
    csv: PathBuf,
    /// YAML engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the profile, insights and charts as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Ask a free-form question about the data (needs --ollama-url).
    #[arg(long)]
    question: Option<String>,
    /// Custom chart as KIND:COL[,COL...], e.g. scatter:price,units.
    #[arg(long)]
    chart: Option<String>,
    /// Base URL of an Ollama server used to augment insights.
    #[arg(long, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = if args.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug,reqwest=info,hyper=info"))
    } else {
        EnvFilter::new("info,reqwest=warn,hyper=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut session = AnalysisSession::new(config)?;
    if let Some(url) = &args.ollama_url {
        info!(url = %url, "Using Ollama for augmentation");
        session = session.with_language_model(Arc::new(OllamaModel::new(url, args.model.clone())));
    }

    let table = read_csv(&args.csv)?;
    let profile = session.load_dataset(table)?.clone();
    let report = session.insights().await?;
    let charts = session.auto_charts()?.to_vec();
    let custom = match &args.chart {
        Some(request) => Some(custom_chart(&session, request)?),
        None => None,
    };

    if args.json {
        let output = serde_json::json!({
            "profile": profile,
            "insights": report,
            "charts": charts,
            "custom_chart": custom,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", profile.summary().report());
        println!("Insights\n========");
        for insight in &report.insights {
            println!("  - {}", insight.text);
        }
        for flag in &report.flags {
            println!("  ! {flag}");
        }
        println!("\nSuggested charts\n================");
        for chart in charts.iter().chain(custom.iter()) {
            println!("  - [{}] {}: {}", chart.kind, chart.title(), chart.rationale);
        }
    }

    if let Some(question) = &args.question {
        match session.ask(question).await {
            Ok(answer) => println!("\nQ: {question}\nA: {answer}"),
            Err(AnalysisError::AugmentationUnavailable(reason)) => {
                warn!(reason = %reason, "Question could not be answered");
                println!("\nQ: {question}\nA: (no answer available: {reason})");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn custom_chart(session: &AnalysisSession, request: &str) -> Result<teles::ChartSpec> {
    let (kind, columns) = request
        .split_once(':')
        .context("chart must look like KIND:COL[,COL...]")?;
    let kind: ChartKind = kind.parse()?;
    let columns: Vec<&str> = columns.split(',').map(str::trim).collect();
    Ok(session.custom_chart(kind, &columns)?)
}

/// Reads every cell as text; typing is left to the classifier.
fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        Value::Null
                    } else {
                        Value::Text(cell.to_string())
                    }
                })
                .collect::<Vec<_>>(),
        );
    }
    let table = Table::from_rows(&headers, rows)?;
    info!(
        rows = table.row_count(),
        columns = table.column_count(),
        path = %path.display(),
        "CSV loaded"
    );
    Ok(table)
}
