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

use crate::requests::LLMRequest;
use crate::responses::LLMResponse;
use crate::types::LLMResult;
use async_trait::async_trait;

/// An opaque text-generation capability.
///
/// Implementations must be cancel-safe: callers bound every call with a
/// timeout and may drop the future at any await point.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: LLMRequest) -> LLMResult<LLMResponse>;
}
