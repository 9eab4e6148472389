// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Insight mining: higher-order statements over recent high-confidence
//! memories, grouped by type, each with supporting citations.
//!
//! Insights are append-only. Supporting ids are verified against the
//! memory window that was shown to the model; an insight with zero valid
//! supports is dropped.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use mnemon_config::model::InsightsConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::traits::{CompletionAdapter, ValidatorAdapter};
use mnemon_core::types::{
    CompletionRequest, Insight, Memory, MemoryFilter, ResponseShape, ValidationContext,
};
use mnemon_storage::{now_iso, Store};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

const INSIGHT_SYSTEM: &str =
    "You are an analyst. You find helpful, non-obvious patterns in a user's stored memories. Output JSON only.";

const INSIGHT_PROMPT: &str = r#"You are given a user's stored {kind} memories, one per line as "- [id] text".
Identify up to {max} higher-order patterns or recommendations that span several of them.

Output a JSON array of objects:
[{"content": "...", "supporting": ["mem-...", "mem-..."]}]
"supporting" must list the ids of the memories each insight is based on.
If there are no meaningful patterns, output [].

Memories:
{mems}
"#;

const INSIGHT_MAX_TOKENS: u32 = 600;
const INSIGHT_TEMPERATURE: f32 = 0.2;

/// Derives insights from a user's recent high-confidence memories.
pub struct InsightMiner {
    store: Arc<Store>,
    completion: Arc<dyn CompletionAdapter>,
    validator: Arc<dyn ValidatorAdapter>,
    config: InsightsConfig,
}

impl InsightMiner {
    pub fn new(
        store: Arc<Store>,
        completion: Arc<dyn CompletionAdapter>,
        validator: Arc<dyn ValidatorAdapter>,
        config: InsightsConfig,
    ) -> Self {
        Self {
            store,
            completion,
            validator,
            config,
        }
    }

    /// Runs one mining pass for a user. Returns the persisted insights.
    pub async fn mine(&self, user_id: &str) -> Result<Vec<Insight>, MnemonError> {
        let filter = MemoryFilter {
            min_confidence: Some(self.config.min_confidence),
            ..Default::default()
        };
        let memories = self
            .store
            .recent_memories(user_id, self.config.window, &filter)
            .await?;
        if memories.is_empty() {
            debug!(user_id, "no high-confidence memories to mine");
            return Ok(vec![]);
        }

        // Group by type; BTreeMap keeps run order deterministic.
        let mut groups: BTreeMap<&'static str, Vec<&Memory>> = BTreeMap::new();
        for memory in &memories {
            groups.entry(memory.kind.as_str()).or_default().push(memory);
        }

        let mut persisted = Vec::new();
        for (kind, group) in groups {
            let lines = self.render_group(&group).await?;
            if lines.is_empty() {
                continue;
            }
            let valid_ids: HashSet<&str> = group.iter().map(|m| m.id.as_str()).collect();

            let prompt = INSIGHT_PROMPT
                .replace("{kind}", kind)
                .replace("{max}", &self.config.max_per_group.to_string())
                .replace("{mems}", &lines);
            let raw = self
                .completion
                .complete(CompletionRequest {
                    system: INSIGHT_SYSTEM.to_string(),
                    user: prompt,
                    max_tokens: INSIGHT_MAX_TOKENS,
                    temperature: INSIGHT_TEMPERATURE,
                    shape: ResponseShape::Json,
                })
                .await?;

            for (content, supporting) in parse_insights(&raw, self.config.max_per_group) {
                let supporting: Vec<String> = supporting
                    .into_iter()
                    .filter(|id| valid_ids.contains(id.as_str()))
                    .collect();
                if supporting.is_empty() {
                    debug!(user_id, kind, "dropping insight with no valid supports");
                    continue;
                }
                let insight = Insight {
                    id: format!("ins-{}", Uuid::new_v4().simple()),
                    user_id: user_id.to_string(),
                    content,
                    supporting,
                    created_at: now_iso(),
                };
                self.store.insert_insight(&insight).await?;
                persisted.push(insight);
            }
        }

        info!(user_id, count = persisted.len(), "insight mining complete");
        Ok(persisted)
    }

    /// Render a memory group as prompt lines, skipping any the validator
    /// refuses.
    async fn render_group(&self, group: &[&Memory]) -> Result<String, MnemonError> {
        let mut lines = Vec::with_capacity(group.len());
        for memory in group {
            let verdict = self
                .validator
                .validate(&memory.text, ValidationContext::InsightInput)
                .await?;
            if verdict.safe {
                lines.push(format!("- [{}] {}", memory.id, memory.text));
            } else {
                warn!(memory_id = memory.id.as_str(), "skipping unsafe memory in insight input");
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Parse the miner's JSON output into `(content, supporting_ids)` pairs.
///
/// Malformed elements are skipped; at most `max` pairs are returned.
fn parse_insights(raw: &str, max: usize) -> Vec<(String, Vec<String>)> {
    let trimmed = raw.trim();
    let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) else {
        return Vec::new();
    };
    if start >= end {
        return Vec::new();
    }
    let parsed: Value = match serde_json::from_str(&trimmed[start..=end]) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "failed to parse insight output");
            return Vec::new();
        }
    };
    let Value::Array(elements) = parsed else {
        return Vec::new();
    };

    elements
        .into_iter()
        .filter_map(|element| {
            let map = element.as_object()?;
            let content = map.get("content")?.as_str()?.trim().to_string();
            if content.is_empty() {
                return None;
            }
            let supporting = map
                .get("supporting")?
                .as_array()?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>();
            Some((content, supporting))
        })
        .take(max)
        .collect()
}
