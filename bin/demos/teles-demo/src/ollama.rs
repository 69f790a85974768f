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
use llm_contracts::{LLMError, LLMRequest, LLMResponse, LLMResult, LanguageModel, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "llama3.2";

/// Single-shot chat client for a local Ollama server.
///
/// Deadlines and cancellation are applied by the caller, so no client-side
/// timeout or retry is configured here.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaModel {
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn payload(&self, request: &LLMRequest) -> Value {
        let config = &request.generation_config;
        let mut payload = json!({
            "model": config.model.as_deref().unwrap_or(&self.model),
            "messages": request.messages().iter().map(|msg| {
                json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                })
            }).collect::<Vec<_>>(),
            "stream": false,
            "options": {}
        });
        if let Some(max_tokens) = config.max_tokens {
            payload["options"]["num_predict"] = json!(max_tokens);
        }
        if let Some(temperature) = config.temperature {
            payload["options"]["temperature"] = json!(temperature);
        }
        if let Some(stop) = &config.stop_sequences {
            payload["options"]["stop"] = json!(stop);
        }
        payload
    }
}

/// Token counts clamp to `u32::MAX` rather than wrapping.
fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |count| u32::try_from(count).unwrap_or(u32::MAX))
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, request_id = %request.id, "Sending request to Ollama");

        let response = self
            .client
            .post(&url)
            .json(&self.payload(&request))
            .send()
            .await
            .map_err(|e| LLMError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        info!("Received response from Ollama API: {}", status);
        if status.as_u16() == 429 {
            return Err(LLMError::RateLimit);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::Provider(format!("Ollama API error {status}: {body}")));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::Serialisation(format!("Failed to parse JSON response: {e}")))?;
        let content = data["message"]["content"].as_str().ok_or_else(|| {
            LLMError::Provider("Failed to extract content from Ollama response".to_string())
        })?;
        let model_used = data["model"].as_str().unwrap_or(&self.model).to_string();
        let usage = Usage::new(token_count(&data["prompt_eval_count"]), token_count(&data["eval_count"]));

        let mut reply = LLMResponse::new(request.id, content, model_used).with_usage(usage);
        if data["done"].as_bool().unwrap_or(false) {
            reply.finish_reason = Some("stop".to_string());
        }
        Ok(reply)
    }
}
