// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory extraction and the write path.
//!
//! Turns one user turn into typed, confidence-filtered, de-duplicated
//! memory rows, then embeds them in batches. The whole path is idempotent
//! per message: fingerprints absorb duplicate inserts, and a re-run
//! produces the same `(user, idempotency_key)` set.

use std::sync::Arc;

use mnemon_config::model::{EmbeddingConfig, WriterConfig};
use mnemon_core::error::MnemonError;
use mnemon_core::retry::{with_backoff, Backoff};
use mnemon_core::traits::{CompletionAdapter, EmbeddingAdapter, ValidatorAdapter};
use mnemon_core::types::{
    CompletionRequest, Memory, MemoryKind, MemoryPatch, ResponseShape, Role, ValidationContext,
};
use mnemon_security::{log_security_event, sanitize_with_limit};
use mnemon_storage::{now_iso, Store};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EXTRACT_SYSTEM: &str =
    "You are a precise extractor of durable user memories. Output JSON only.";

const EXTRACT_PROMPT: &str = r#"From the user's latest message, extract durable, user-specific memories worth storing.
Only include stable preferences, facts about the user or their projects, plans with dates, or clear entities and relationships. Skip generic knowledge and assistant content.

Output a JSON array of objects:
[{"text": "...", "type": "preference|fact|plan|entity|relation", "confidence": 0.0-1.0, "importance": 0.0-1.0}]
"importance" is optional. If there is nothing to store, output [].

User message:
{msg}
"#;

const EXTRACT_MAX_TOKENS: u32 = 500;
const EXTRACT_TEMPERATURE: f32 = 0.0;

/// A parsed extraction candidate that survived strict validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub kind: MemoryKind,
    pub confidence: f64,
    pub importance: Option<f64>,
}

/// Result of one writer run over a message.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Ids of all memories this run resolved to (created or pre-existing).
    pub memory_ids: Vec<String>,
    /// Rows newly created by this run.
    pub created: usize,
    /// Conflicts absorbed as success.
    pub absorbed: usize,
    /// Items whose embedding failed after the retry budget.
    pub embed_failures: usize,
}

/// Extracts, deduplicates, and persists memories from user turns.
pub struct MemoryWriter {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingAdapter>,
    completion: Arc<dyn CompletionAdapter>,
    validator: Arc<dyn ValidatorAdapter>,
    config: WriterConfig,
    embedding: EmbeddingConfig,
}

impl MemoryWriter {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingAdapter>,
        completion: Arc<dyn CompletionAdapter>,
        validator: Arc<dyn ValidatorAdapter>,
        config: WriterConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            validator,
            config,
            embedding,
        }
    }

    /// Runs the full extraction pipeline for one stored user message.
    ///
    /// Re-running over the same message yields the same set of memory ids
    /// and performs no further inserts. Partial failure (some rows written,
    /// some embeds failed) is reported but not rolled back.
    pub async fn extract_from_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<WriteOutcome, MnemonError> {
        let message = self
            .store
            .get_message(user_id, message_id)
            .await?
            .ok_or_else(|| MnemonError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            })?;
        if message.role != Role::User {
            debug!(message_id, "skipping non-user message");
            return Ok(WriteOutcome::default());
        }

        // Step 1: validate the raw turn before it goes anywhere near a prompt.
        let verdict = self
            .validator
            .validate(&message.text, ValidationContext::WriterExtract)
            .await?;
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_else(|| "unspecified".to_string());
            log_security_event(user_id, ValidationContext::WriterExtract, &reason);
            return Err(MnemonError::Unsafe {
                context: ValidationContext::WriterExtract.as_str().to_string(),
                reason,
            });
        }

        // Step 2: ask the extraction model for candidates.
        let sanitized = sanitize_with_limit(&message.text, mnemon_security::MAX_SANITIZED_CHARS);
        let raw = self
            .completion
            .complete(CompletionRequest {
                system: EXTRACT_SYSTEM.to_string(),
                user: EXTRACT_PROMPT.replace("{msg}", &sanitized),
                max_tokens: EXTRACT_MAX_TOKENS,
                temperature: EXTRACT_TEMPERATURE,
                shape: ResponseShape::Json,
            })
            .await?;

        let candidates = parse_candidates(&raw, self.config.max_candidate_chars);
        if candidates.is_empty() {
            debug!(message_id, "no extraction candidates");
            return Ok(WriteOutcome::default());
        }

        // Step 3: confidence filter.
        let kept: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.confidence >= self.config.min_confidence)
            .collect();

        // Steps 4-5: fingerprint and insert, absorbing conflicts.
        let mut outcome = WriteOutcome::default();
        let mut to_embed: Vec<(String, String)> = Vec::new();
        for candidate in kept {
            let key = crate::fingerprint::fingerprint(&candidate.text, candidate.kind);
            let importance = candidate
                .importance
                .unwrap_or_else(|| candidate.kind.default_importance());
            let now = now_iso();
            let mut provenance = serde_json::Map::new();
            provenance.insert("source".into(), Value::from("user_message"));
            provenance.insert("message_id".into(), Value::from(message_id));
            let memory = Memory {
                id: format!("mem-{}", Uuid::new_v4().simple()),
                user_id: user_id.to_string(),
                conversation_id: Some(message.conversation_id.clone()),
                text: candidate.text.clone(),
                kind: candidate.kind,
                importance,
                confidence: candidate.confidence,
                bad: false,
                pinned: false,
                idempotency_key: key,
                embedding: None,
                provenance,
                created_at: now.clone(),
                updated_at: now,
            };

            let inserted = self.store.insert_memory(&memory).await?;
            let id = inserted.id().to_string();
            if inserted.created() {
                outcome.created += 1;
                to_embed.push((id.clone(), candidate.text.clone()));
            } else {
                outcome.absorbed += 1;
                self.absorb_conflict(user_id, &id, &candidate, &mut to_embed)
                    .await?;
            }
            outcome.memory_ids.push(id);
        }

        // Step 6: embed everything fresh, with a bounded per-item budget.
        outcome.embed_failures = self.embed_batch(user_id, to_embed).await?;

        info!(
            user_id,
            message_id,
            created = outcome.created,
            absorbed = outcome.absorbed,
            embed_failures = outcome.embed_failures,
            "memory extraction complete"
        );
        Ok(outcome)
    }

    /// Correction path: replace text in place, keep identity, re-embed.
    ///
    /// The fingerprint is NOT recomputed; the corrected memory keeps its
    /// id and idempotency key.
    pub async fn correct(
        &self,
        user_id: &str,
        memory_id: &str,
        new_text: &str,
    ) -> Result<(), MnemonError> {
        let verdict = self
            .validator
            .validate(new_text, ValidationContext::Correction)
            .await?;
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_else(|| "unspecified".to_string());
            log_security_event(user_id, ValidationContext::Correction, &reason);
            return Err(MnemonError::Unsafe {
                context: ValidationContext::Correction.as_str().to_string(),
                reason,
            });
        }

        let current = self
            .store
            .get_memory(user_id, memory_id)
            .await?
            .ok_or_else(|| MnemonError::NotFound {
                entity: "memory",
                id: memory_id.to_string(),
            })?;

        let sanitized = sanitize_with_limit(new_text, self.config.max_candidate_chars);
        let mut provenance = current.provenance.clone();
        provenance.insert("corrected".into(), Value::from(true));
        self.store
            .update_memory(
                user_id,
                memory_id,
                MemoryPatch {
                    text: Some(sanitized.clone()),
                    embedding: Some(None),
                    provenance: Some(provenance),
                    ..Default::default()
                },
            )
            .await?;

        let failures = self
            .embed_batch(user_id, vec![(memory_id.to_string(), sanitized)])
            .await?;
        if failures > 0 {
            warn!(user_id, memory_id, "correction stored but re-embed failed");
        }
        Ok(())
    }

    /// A conflicting insert upgrades the stored confidence when the new
    /// candidate is more certain, and schedules an embed if the existing
    /// row never got one.
    async fn absorb_conflict(
        &self,
        user_id: &str,
        existing_id: &str,
        candidate: &Candidate,
        to_embed: &mut Vec<(String, String)>,
    ) -> Result<(), MnemonError> {
        let Some(existing) = self.store.get_memory(user_id, existing_id).await? else {
            return Ok(());
        };
        if existing.confidence < candidate.confidence {
            let importance = candidate
                .importance
                .unwrap_or_else(|| candidate.kind.default_importance());
            self.store
                .update_memory(
                    user_id,
                    existing_id,
                    MemoryPatch {
                        confidence: Some(candidate.confidence),
                        importance: Some(importance),
                        ..Default::default()
                    },
                )
                .await?;
        }
        if existing.embedding.is_none() {
            to_embed.push((existing_id.to_string(), existing.text));
        }
        Ok(())
    }

    /// Batch-embed `(memory_id, text)` pairs, retrying each failed item up
    /// to the configured budget. Exhausted items are marked degraded in
    /// provenance. Returns the number of permanent failures.
    async fn embed_batch(
        &self,
        user_id: &str,
        items: Vec<(String, String)>,
    ) -> Result<usize, MnemonError> {
        let mut failures = 0;
        for chunk in items.chunks(self.embedding.batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
            let results = self.embedder.embed(texts).await?;
            for ((memory_id, text), result) in chunk.iter().zip(results) {
                match result {
                    Ok(vector) => {
                        self.store_embedding(user_id, memory_id, vector).await?;
                    }
                    Err(first_err) => {
                        if !self
                            .retry_single_embed(user_id, memory_id, text, first_err)
                            .await?
                        {
                            failures += 1;
                        }
                    }
                }
            }
        }
        Ok(failures)
    }

    /// Per-item retry after a batch-level failure. Returns whether the
    /// embedding was eventually stored.
    async fn retry_single_embed(
        &self,
        user_id: &str,
        memory_id: &str,
        text: &str,
        first_err: MnemonError,
    ) -> Result<bool, MnemonError> {
        if !first_err.is_transient() {
            warn!(memory_id, error = %first_err, "embedding failed permanently");
            self.mark_embed_failed(user_id, memory_id).await?;
            return Ok(false);
        }

        // One attempt already happened in the batch.
        let remaining = self.embedding.max_attempts.saturating_sub(1).max(1);
        let text = text.to_string();
        let retried = with_backoff("embed_item", Backoff::new(remaining), || {
            let text = text.clone();
            async move {
                let mut results = self.embedder.embed(vec![text]).await?;
                results
                    .pop()
                    .ok_or_else(|| MnemonError::fatal("embedder returned no results"))?
            }
        })
        .await;

        match retried {
            Ok(vector) => {
                self.store_embedding(user_id, memory_id, vector).await?;
                Ok(true)
            }
            Err(err) => {
                warn!(memory_id, error = %err, "embedding retry budget exhausted");
                self.mark_embed_failed(user_id, memory_id).await?;
                Ok(false)
            }
        }
    }

    async fn store_embedding(
        &self,
        user_id: &str,
        memory_id: &str,
        vector: Vec<f32>,
    ) -> Result<(), MnemonError> {
        if vector.len() != self.embedding.dimensions {
            return Err(MnemonError::fatal(format!(
                "embedding dimension mismatch: got {}, configured {}",
                vector.len(),
                self.embedding.dimensions
            )));
        }
        self.store
            .update_memory(
                user_id,
                memory_id,
                MemoryPatch {
                    embedding: Some(Some(vector)),
                    ..Default::default()
                },
            )
            .await
    }

    async fn mark_embed_failed(&self, user_id: &str, memory_id: &str) -> Result<(), MnemonError> {
        let Some(memory) = self.store.get_memory(user_id, memory_id).await? else {
            return Ok(());
        };
        let mut provenance = memory.provenance;
        provenance.insert("embedding_failed".into(), Value::from(true));
        self.store
            .update_memory(
                user_id,
                memory_id,
                MemoryPatch {
                    provenance: Some(provenance),
                    ..Default::default()
                },
            )
            .await
    }
}

/// Strictly parse the extractor's JSON output.
///
/// Tolerates a markdown code fence around the array, but each element must
/// be an object with only known keys, a non-empty `text` within the length
/// bound, a `type` from the closed set, and `confidence` in `[0, 1]`.
/// Malformed elements are skipped; they never abort the batch.
pub fn parse_candidates(raw: &str, max_text_chars: usize) -> Vec<Candidate> {
    let trimmed = raw.trim();
    let start = trimmed.find('[');
    let end = trimmed.rfind(']');
    let json_str = match (start, end) {
        (Some(s), Some(e)) if s < e => &trimmed[s..=e],
        _ => {
            warn!("extractor output contained no JSON array");
            return Vec::new();
        }
    };

    let parsed: Value = match serde_json::from_str(json_str) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "failed to parse extractor output");
            return Vec::new();
        }
    };
    let Value::Array(elements) = parsed else {
        return Vec::new();
    };

    elements
        .into_iter()
        .filter_map(|element| parse_candidate(element, max_text_chars))
        .collect()
}

fn parse_candidate(element: Value, max_text_chars: usize) -> Option<Candidate> {
    let Value::Object(map) = element else {
        debug!("skipping non-object extraction element");
        return None;
    };
    // Unknown keys mean the model drifted from the schema; reject the element.
    if map
        .keys()
        .any(|k| !matches!(k.as_str(), "text" | "type" | "confidence" | "importance"))
    {
        debug!("skipping extraction element with unknown keys");
        return None;
    }

    let text = sanitize_with_limit(map.get("text")?.as_str()?, mnemon_security::MAX_SANITIZED_CHARS);
    if text.is_empty() || text.chars().count() > max_text_chars {
        return None;
    }
    let kind = MemoryKind::parse(map.get("type")?.as_str()?)?;
    let confidence = map.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    let importance = match map.get("importance") {
        Some(value) => {
            let importance = value.as_f64()?;
            if !(0.0..=1.0).contains(&importance) {
                return None;
            }
            Some(importance)
        }
        None => None,
    };

    Some(Candidate {
        text,
        kind,
        confidence,
        importance,
    })
}
