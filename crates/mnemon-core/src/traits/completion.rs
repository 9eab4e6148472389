// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion capability: structured prompt to text.

use async_trait::async_trait;

use crate::error::MnemonError;
use crate::types::CompletionRequest;

/// Adapter for the language-model completion capability.
///
/// Callers never place untrusted text into a request without first passing
/// it through the validator and the structural sanitizer.
#[async_trait]
pub trait CompletionAdapter: Send + Sync + 'static {
    /// Sends a completion request and returns the full response text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, MnemonError>;
}
