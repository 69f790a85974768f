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

use crate::charts::{ChartKind, ChartSpec, VisualizationSelector};
use crate::config::EngineConfig;
use crate::error::{AnalysisError, Result};
use crate::insights::{complete_bounded, InsightReport, InsightSynthesizer};
use crate::profile::Profile;
use crate::prompt::{question_request, ContextSummary};
use crate::table::Table;
use llm_contracts::{LanguageModel, RequestContext};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct SessionState {
    table: Arc<Table>,
    profile: Profile,
    charts: Vec<ChartSpec>,
}

/// One loaded dataset and everything derived from it.
///
/// Loading replaces the cached state wholesale; loading the same content again
/// is a cache hit.
pub struct AnalysisSession {
    config: EngineConfig,
    model: Option<Arc<dyn LanguageModel>>,
    state: Option<SessionState>,
    session_id: Uuid,
}

impl AnalysisSession {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
            state: None,
            session_id: Uuid::new_v4(),
        })
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        info!(model = model.name(), "Language model attached to session");
        self.model = Some(model);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_language_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.state.as_ref().map(|s| &s.profile)
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        self.state.as_ref().map(|s| &s.table)
    }

    pub fn clear(&mut self) {
        self.state = None;
    }

    pub fn load_dataset(&mut self, table: impl Into<Arc<Table>>) -> Result<&Profile> {
        let table: Arc<Table> = table.into();
        if table.is_empty() {
            warn!(
                rows = table.row_count(),
                columns = table.column_count(),
                "Rejected empty dataset"
            );
            self.state = Some(SessionState {
                table,
                profile: Profile::empty(),
                charts: Vec::new(),
            });
            return Err(AnalysisError::EmptyTable);
        }

        let fingerprint = table.fingerprint();
        let cached = self
            .state
            .as_ref()
            .is_some_and(|s| !s.profile.is_empty() && s.profile.fingerprint == fingerprint);
        if cached {
            debug!(fingerprint = %fingerprint, "Dataset unchanged, reusing cached profile");
        } else {
            let profile = Profile::build(&table, &self.config);
            let charts = VisualizationSelector::with_config(self.config.charts.clone())
                .auto_select(&profile);
            info!(
                rows = profile.row_count,
                columns = profile.column_count,
                relationships = profile.relationships.len(),
                charts = charts.len(),
                "Dataset loaded"
            );
            self.state = Some(SessionState {
                table,
                profile,
                charts,
            });
        }
        self.profile().ok_or(AnalysisError::NoDataset)
    }

    fn state(&self) -> Result<&SessionState> {
        self.state.as_ref().ok_or(AnalysisError::NoDataset)
    }

    pub async fn insights(&self) -> Result<InsightReport> {
        self.insights_with_cancel(&CancellationToken::new()).await
    }

    pub async fn insights_with_cancel(&self, cancel: &CancellationToken) -> Result<InsightReport> {
        let state = self.state()?;
        let synthesizer =
            InsightSynthesizer::with_config(self.config.insights.clone(), self.config.llm.clone())
                .with_session(self.session_id.to_string());
        Ok(synthesizer
            .synthesize(&state.profile, self.model.as_deref(), cancel)
            .await)
    }

    pub fn auto_charts(&self) -> Result<&[ChartSpec]> {
        Ok(&self.state()?.charts)
    }

    pub fn custom_chart(&self, kind: ChartKind, columns: &[&str]) -> Result<ChartSpec> {
        let state = self.state()?;
        VisualizationSelector::with_config(self.config.charts.clone()).custom(&state.profile, kind, columns)
    }

    pub async fn ask(&self, question: &str) -> Result<String> {
        self.ask_with_cancel(question, &CancellationToken::new()).await
    }

    /// Answers a free-form question from the cached profile summary. Raw rows
    /// are never sent.
    pub async fn ask_with_cancel(&self, question: &str, cancel: &CancellationToken) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnalysisError::EmptyQuestion);
        }
        let state = self.state()?;
        if state.profile.is_empty() {
            return Err(AnalysisError::EmptyTable);
        }
        let model = self.model.as_deref().ok_or_else(|| {
            AnalysisError::AugmentationUnavailable("no language model configured".to_string())
        })?;

        let summary = ContextSummary::from_profile(&state.profile, self.config.insights.max_summary_chars);
        let request = question_request(
            &summary,
            question,
            self.config.llm.generation.to_generation_config(),
        )
        .with_context(RequestContext::for_session(self.session_id.to_string()));

        match complete_bounded(model, request, self.config.llm.timeout(), cancel).await {
            Ok(response) => {
                debug!(
                    model = %response.model_used,
                    tokens = response.usage.total_tokens,
                    "Question answered"
                );
                Ok(response.content.trim().to_string())
            }
            Err(err) => {
                warn!(model = model.name(), error = %err, "Question could not be answered");
                Err(AnalysisError::AugmentationUnavailable(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::new("a", [1.5, 2.5, 3.0, 4.75]),
            Column::new("b", ["x", "y", "x", "x"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_getters_before_load() {
        let session = AnalysisSession::new(EngineConfig::default()).unwrap();
        assert!(session.profile().is_none());
        assert!(matches!(session.auto_charts(), Err(AnalysisError::NoDataset)));
        assert!(!session.has_language_model());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.charts.max_auto_charts = 0;
        assert!(matches!(
            AnalysisSession::new(config),
            Err(AnalysisError::Config(_))
        ));
    }

    #[test]
    fn test_reload_replaces_state() {
        let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
        session.load_dataset(table()).unwrap();
        let first = session.profile().unwrap().fingerprint.clone();

        let other = Table::new(vec![Column::new("c", [1.0, 2.0, 3.5])]).unwrap();
        session.load_dataset(other).unwrap();
        let profile = session.profile().unwrap();
        assert_ne!(profile.fingerprint, first);
        assert!(profile.column("a").is_none());

        session.clear();
        assert!(session.profile().is_none());
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let mut session = AnalysisSession::new(EngineConfig::default()).unwrap();
        session.load_dataset(table()).unwrap();
        assert!(matches!(
            session.ask("   ").await,
            Err(AnalysisError::EmptyQuestion)
        ));
    }
}
