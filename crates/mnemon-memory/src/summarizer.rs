// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling conversation summaries with memory citations.
//!
//! One `rolling` summary per `(user, conversation)`, rewritten in place.
//! New turns since the last summary are folded into the prior content; a
//! failed attempt leaves the prior summary untouched because the upsert
//! only happens on success.

use std::sync::Arc;

use mnemon_config::model::SummarizerConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::traits::{CompletionAdapter, ValidatorAdapter};
use mnemon_core::types::{
    CompletionRequest, Message, ResponseShape, Role, SummaryScope, ValidationContext,
};
use mnemon_security::sanitize;
use mnemon_storage::Store;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

const SUM_SYSTEM: &str =
    "You produce concise rolling summaries with citations. Be faithful; do not invent.";

const SUM_PROMPT: &str = r#"Update the running summary of this conversation.

Rules:
- Keep it under {max_chars} characters.
- Include only facts grounded in the provided messages or the existing summary.
- Prefer durable facts and decisions over small talk.
- Keep memory citations in [[mem-...]] form for provenance, citing only
  memories created during the covered messages.

Existing summary (may be empty):
{existing}

New messages (chronological):
{messages}

Write the updated summary now.
"#;

const SUM_MAX_TOKENS: u32 = 600;
const SUM_TEMPERATURE: f32 = 0.2;

/// Placeholder substituted for messages the validator refuses.
const UNSAFE_PLACEHOLDER: &str = "[message removed]";

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap());

/// Outcome of a summarize run.
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    pub summary_id: String,
    pub content_chars: usize,
    pub citations: Vec<String>,
    pub folded_messages: usize,
}

/// Maintains the rolling summary for each `(user, conversation)`.
pub struct RollingSummarizer {
    store: Arc<Store>,
    completion: Arc<dyn CompletionAdapter>,
    validator: Arc<dyn ValidatorAdapter>,
    config: SummarizerConfig,
}

impl RollingSummarizer {
    pub fn new(
        store: Arc<Store>,
        completion: Arc<dyn CompletionAdapter>,
        validator: Arc<dyn ValidatorAdapter>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            store,
            completion,
            validator,
            config,
        }
    }

    /// Whether enough new conversation has accumulated to summarize:
    /// `turn_interval` user turns or `char_threshold` characters since the
    /// last summary, whichever first.
    pub async fn should_summarize(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<bool, MnemonError> {
        let since = self.last_summary_time(user_id, conversation_id).await?;
        let messages = self
            .store
            .messages_since(user_id, conversation_id, &since)
            .await?;
        let user_turns = messages.iter().filter(|m| m.role == Role::User).count();
        let chars: usize = messages.iter().map(|m| m.text.chars().count()).sum();
        Ok(user_turns >= self.config.turn_interval || chars >= self.config.char_threshold)
    }

    /// Folds messages since the last summary into a new rolling summary.
    ///
    /// Returns `None` when there is nothing new to fold.
    pub async fn summarize(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<SummarizeOutcome>, MnemonError> {
        let existing = self
            .store
            .get_summary(user_id, conversation_id, SummaryScope::Rolling)
            .await?;
        let since = existing
            .as_ref()
            .map(|s| s.updated_at.clone())
            .unwrap_or_default();

        let messages = self
            .store
            .messages_since(user_id, conversation_id, &since)
            .await?;
        if messages.is_empty() {
            debug!(user_id, conversation_id, "no new messages to summarize");
            return Ok(None);
        }

        let rendered = self.render_messages(&messages).await?;
        let existing_text = existing.map(|s| s.content).unwrap_or_default();
        let prompt = SUM_PROMPT
            .replace("{max_chars}", &self.config.max_chars.to_string())
            .replace("{existing}", &existing_text)
            .replace("{messages}", &rendered);

        let content = self
            .completion
            .complete(CompletionRequest {
                system: SUM_SYSTEM.to_string(),
                user: prompt,
                max_tokens: SUM_MAX_TOKENS,
                temperature: SUM_TEMPERATURE,
                shape: ResponseShape::Text,
            })
            .await?;

        // Enforce the hard bound even when the model overruns.
        let bounded: String = content.trim().chars().take(self.config.max_chars).collect();

        // Keep only citations that resolve to this user's memories.
        let mut citations = Vec::new();
        for id in extract_citations(&bounded) {
            if self.store.get_memory(user_id, &id).await?.is_some() {
                citations.push(id);
            }
        }

        let summary_id = self
            .store
            .upsert_summary(
                user_id,
                conversation_id,
                SummaryScope::Rolling,
                &bounded,
                &citations,
            )
            .await?;

        info!(
            user_id,
            conversation_id,
            chars = bounded.chars().count(),
            citations = citations.len(),
            folded = messages.len(),
            "rolling summary updated"
        );
        Ok(Some(SummarizeOutcome {
            summary_id,
            content_chars: bounded.chars().count(),
            citations,
            folded_messages: messages.len(),
        }))
    }

    async fn last_summary_time(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<String, MnemonError> {
        Ok(self
            .store
            .get_summary(user_id, conversation_id, SummaryScope::Rolling)
            .await?
            .map(|s| s.updated_at)
            .unwrap_or_default())
    }

    /// Render messages as `role: text` lines, replacing any the validator
    /// refuses with a fixed placeholder.
    async fn render_messages(&self, messages: &[Message]) -> Result<String, MnemonError> {
        let mut lines = Vec::with_capacity(messages.len());
        for message in messages {
            let verdict = self
                .validator
                .validate(&message.text, ValidationContext::SummarizerInput)
                .await?;
            let text = if verdict.safe {
                sanitize(&message.text)
            } else {
                UNSAFE_PLACEHOLDER.to_string()
            };
            lines.push(format!("{}: {}", message.role.as_str(), text));
        }
        Ok(lines.join("\n"))
    }
}

/// Pull `[[...]]` citation markers out of summary content, de-duplicated
/// in order of first appearance.
pub fn extract_citations(content: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    CITATION_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
