// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed payloads carried by task submissions.
//!
//! Payloads serialize through serde_json (sorted keys), which makes the
//! payload hash, and therefore the task id, stable across submissions.

use serde::{Deserialize, Serialize};

/// Payload for an `extract` task: which stored user message to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractPayload {
    pub message_id: String,
}

/// Payload for a `correct` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectPayload {
    pub memory_id: String,
    pub new_text: String,
}

/// `summarize` and `insights` carry no payload beyond their key; an empty
/// object keeps the hash stable.
pub fn empty_payload() -> serde_json::Value {
    serde_json::json!({})
}
