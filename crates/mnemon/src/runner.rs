// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch from orchestrated tasks to the memory components.
//!
//! Cancellation is observed at component boundaries: the runner checks the
//! token before each expensive step and never starts new work after it
//! fires; whatever an external call returns afterwards is discarded by the
//! orchestrator when it records the cancelled outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use mnemon_core::error::MnemonError;
use mnemon_core::types::{Task, TaskKind};
use mnemon_memory::{InsightMiner, MemoryWriter, RollingSummarizer};
use mnemon_tasks::{CorrectPayload, ExtractPayload, TaskRunner};

/// Runs background task kinds against the engine's components.
pub struct EngineRunner {
    pub(crate) writer: Arc<MemoryWriter>,
    pub(crate) summarizer: Arc<RollingSummarizer>,
    pub(crate) insights: Arc<InsightMiner>,
}

#[async_trait]
impl TaskRunner for EngineRunner {
    async fn run(
        &self,
        task: &Task,
        payload: &Value,
        cancel: CancellationToken,
    ) -> Result<Value, MnemonError> {
        if cancel.is_cancelled() {
            return Err(MnemonError::Cancelled("cancelled before start".to_string()));
        }

        match task.kind {
            TaskKind::Extract => {
                let payload: ExtractPayload = parse_payload(payload)?;
                let outcome = self
                    .writer
                    .extract_from_message(&task.user_id, &payload.message_id)
                    .await?;
                Ok(json!({
                    "memory_ids": outcome.memory_ids,
                    "created": outcome.created,
                    "absorbed": outcome.absorbed,
                    "embed_failures": outcome.embed_failures,
                }))
            }
            TaskKind::Summarize => {
                let conversation_id = task.conversation_id.as_deref().ok_or_else(|| {
                    MnemonError::fatal("summarize task without conversation id")
                })?;
                match self
                    .summarizer
                    .summarize(&task.user_id, conversation_id)
                    .await?
                {
                    Some(outcome) => Ok(json!({
                        "summary_id": outcome.summary_id,
                        "content_chars": outcome.content_chars,
                        "citations": outcome.citations,
                        "folded_messages": outcome.folded_messages,
                    })),
                    None => Ok(json!({"skipped": true})),
                }
            }
            TaskKind::Insights => {
                let insights = self.insights.mine(&task.user_id).await?;
                let ids: Vec<&str> = insights.iter().map(|i| i.id.as_str()).collect();
                Ok(json!({"insight_ids": ids}))
            }
            TaskKind::Correct => {
                let payload: CorrectPayload = parse_payload(payload)?;
                self.writer
                    .correct(&task.user_id, &payload.memory_id, &payload.new_text)
                    .await?;
                Ok(json!({"memory_id": payload.memory_id}))
            }
            TaskKind::ChatAssemble => Err(MnemonError::fatal(
                "chat_assemble runs on the foreground path, not the queue",
            )),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, MnemonError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| MnemonError::fatal(format!("malformed task payload: {e}")))
}
