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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LLMError {
    /// Errors a caller may reasonably try again later. The engine itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimit | LLMError::Network(_) | LLMError::Timeout
        )
    }
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialisation(err.to_string())
    }
}

pub type LLMResult<T> = Result<T, LLMError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_string() {
        assert_eq!(Role::from("System".to_string()), Role::System);
        assert_eq!(Role::from("assistant".to_string()), Role::Assistant);
        assert_eq!(Role::from("anything".to_string()), Role::User);
    }

    #[test]
    fn test_transient_errors() {
        assert!(LLMError::Timeout.is_transient());
        assert!(LLMError::Network("reset".into()).is_transient());
        assert!(!LLMError::Authentication("missing key".into()).is_transient());
        assert!(!LLMError::Cancelled.is_transient());
    }
}
