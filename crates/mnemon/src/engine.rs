// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory engine facade.
//!
//! Wires the store, the three injected capabilities (embedding, completion,
//! validation), the memory components, and the task orchestrator into the
//! surface the API layer consumes. The foreground path assembles context
//! and answers synchronously under its deadline; extraction, summarization,
//! and insight mining run as background tasks submitted after the answer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use mnemon_config::MnemonConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::retry::{with_backoff, Backoff};
use mnemon_core::traits::{CompletionAdapter, EmbeddingAdapter, ValidatorAdapter};
use mnemon_core::types::{
    ChatOutcome, CompletionRequest, Insight, Memory, MemoryPatch, ResponseShape, Role, Task,
    TaskKind, ValidationContext,
};
use mnemon_memory::summarizer::extract_citations;
use mnemon_memory::{
    HybridRetriever, InsightMiner, MemoryWriter, RollingSummarizer, ScoredMemory,
};
use mnemon_security::{log_security_event, sanitize};
use mnemon_storage::{Database, Store};
use mnemon_tasks::{empty_payload, CorrectPayload, ExtractPayload, Orchestrator, SubmitRequest};

use crate::runner::EngineRunner;

const RESPONDER_SYSTEM: &str = "You are a helpful assistant.\n\
Use the Facts to personalize user-specific claims and include the memory id in double brackets like [[mem-...]] after such claims.\n\
For general knowledge or domain questions, answer normally using your knowledge.\n\
Never invent user-specific facts that are not present in Facts. If a personal detail is missing, ask a brief clarifying question.\n\
Be concise and actionable.";

const RESPONDER_TEMPERATURE: f32 = 0.4;

struct InsightTrigger {
    last_run: Instant,
    count_at_last_run: i64,
}

/// Persistent per-user semantic memory for LLM chat applications.
pub struct MemoryEngine {
    config: MnemonConfig,
    store: Arc<Store>,
    completion: Arc<dyn CompletionAdapter>,
    validator: Arc<dyn ValidatorAdapter>,
    retriever: HybridRetriever,
    summarizer: Arc<RollingSummarizer>,
    orchestrator: Orchestrator,
    insight_triggers: Mutex<HashMap<String, InsightTrigger>>,
}

impl MemoryEngine {
    /// Opens the configured database and wires the engine.
    pub async fn new(
        config: MnemonConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
        completion: Arc<dyn CompletionAdapter>,
        validator: Arc<dyn ValidatorAdapter>,
    ) -> Result<Self, MnemonError> {
        let db = Database::open(&config.storage.database_path).await?;
        Ok(Self::from_parts(config, db, embedder, completion, validator))
    }

    /// Wires the engine over an already-open database. Workers start
    /// immediately.
    pub fn from_parts(
        config: MnemonConfig,
        db: Database,
        embedder: Arc<dyn EmbeddingAdapter>,
        completion: Arc<dyn CompletionAdapter>,
        validator: Arc<dyn ValidatorAdapter>,
    ) -> Self {
        let store = Arc::new(Store::new(db));

        let retriever = HybridRetriever::new(
            store.clone(),
            embedder.clone(),
            config.retrieval.clone(),
        );
        let writer = Arc::new(MemoryWriter::new(
            store.clone(),
            embedder.clone(),
            completion.clone(),
            validator.clone(),
            config.writer.clone(),
            config.embedding.clone(),
        ));
        let summarizer = Arc::new(RollingSummarizer::new(
            store.clone(),
            completion.clone(),
            validator.clone(),
            config.summarizer.clone(),
        ));
        let insights = Arc::new(InsightMiner::new(
            store.clone(),
            completion.clone(),
            validator.clone(),
            config.insights.clone(),
        ));

        let runner = Arc::new(EngineRunner {
            writer,
            summarizer: summarizer.clone(),
            insights,
        });
        let orchestrator = Orchestrator::new(runner, config.tasks.clone());
        orchestrator.start();

        Self {
            config,
            store,
            completion,
            validator,
            retriever,
            summarizer,
            orchestrator,
            insight_triggers: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store (tests and maintenance tooling).
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Stops the background workers after their current task.
    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
    }

    // ---------- foreground ----------

    /// The foreground chat turn: validate, persist the turn, retrieve
    /// context, answer, persist the answer, then schedule background work.
    ///
    /// Degrades gracefully: when every retrieval source errors the answer
    /// is produced with no memory context and `cited_memory_ids` is empty.
    pub async fn assemble_and_answer(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<ChatOutcome, MnemonError> {
        let verdict = self
            .validator
            .validate(user_text, ValidationContext::ResponderUser)
            .await?;
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_else(|| "unspecified".to_string());
            log_security_event(user_id, ValidationContext::ResponderUser, &reason);
            return Err(MnemonError::Unsafe {
                context: ValidationContext::ResponderUser.as_str().to_string(),
                reason,
            });
        }

        let payload = json!({ "user_text": user_text });
        let task_id = self
            .orchestrator
            .begin_inline(
                TaskKind::ChatAssemble,
                user_id,
                Some(conversation_id),
                &payload,
            )
            .await;

        let deadline = Duration::from_secs(self.config.tasks.chat_deadline_secs.max(1));
        let answered = tokio::time::timeout(
            deadline,
            self.answer_inner(user_id, conversation_id, user_text),
        )
        .await;

        match answered {
            Ok(Ok((outcome, user_message_id))) => {
                self.orchestrator
                    .finish_inline(
                        &task_id,
                        Ok(json!({
                            "assistant_text": outcome.assistant_text,
                            "cited_memory_ids": outcome.cited_memory_ids,
                            "assistant_message_id": outcome.assistant_message_id,
                        })),
                    )
                    .await;
                self.schedule_background(user_id, conversation_id, &user_message_id)
                    .await;
                Ok(outcome)
            }
            Ok(Err(err)) => {
                self.orchestrator.finish_inline(&task_id, Err(&err)).await;
                Err(err)
            }
            Err(_) => {
                let err = MnemonError::Cancelled("foreground deadline exceeded".to_string());
                self.orchestrator.finish_inline(&task_id, Err(&err)).await;
                Err(err)
            }
        }
    }

    async fn answer_inner(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_text: &str,
    ) -> Result<(ChatOutcome, String), MnemonError> {
        let clean_text = sanitize(user_text);
        let user_message_id = self
            .store
            .append_message(user_id, conversation_id, Role::User, &clean_text)
            .await?;

        // Retrieval degrades to empty context rather than failing the turn.
        let retrieved = match self
            .retriever
            .retrieve(user_id, &clean_text, Some(conversation_id))
            .await
        {
            Ok(memories) => memories,
            Err(err) if err.is_transient() => {
                warn!(user_id, error = %err, "retrieval degraded, answering without memories");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let summary = match self
            .store
            .get_summary(
                user_id,
                conversation_id,
                mnemon_core::types::SummaryScope::Rolling,
            )
            .await
        {
            Ok(summary) => summary.map(|s| s.content).unwrap_or_default(),
            Err(err) if err.is_transient() => {
                warn!(user_id, error = %err, "summary read degraded");
                String::new()
            }
            Err(err) => return Err(err),
        };

        let history = match self
            .store
            .recent_messages(user_id, conversation_id, self.config.chat.history_limit)
            .await
        {
            Ok(messages) => messages,
            Err(err) if err.is_transient() => {
                warn!(user_id, error = %err, "history read degraded");
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        let messages_block = history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let facts_block = retrieved
            .iter()
            .map(|s| format!("- [{}] {}", s.memory.id, s.memory.text))
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Conversation summary (may be empty)\n{summary}\n\n\
             Prior messages (chronological)\n{messages_block}\n\n\
             Facts (for personalization only)\n{facts_block}\n\n\
             User question\n{clean_text}\n\nAssistant:"
        );

        let answer = with_backoff("responder_complete", Backoff::default(), || {
            self.completion.complete(CompletionRequest {
                system: RESPONDER_SYSTEM.to_string(),
                user: user_prompt.clone(),
                max_tokens: self.config.chat.max_tokens,
                temperature: RESPONDER_TEMPERATURE,
                shape: ResponseShape::Text,
            })
        })
        .await?;

        // Citations the model produced, restricted to what was retrieved.
        let retrieved_ids: HashSet<&str> =
            retrieved.iter().map(|s| s.memory.id.as_str()).collect();
        let cited_memory_ids: Vec<String> = extract_citations(&answer)
            .into_iter()
            .filter(|id| retrieved_ids.contains(id.as_str()))
            .collect();

        let assistant_message_id = self
            .store
            .append_message(user_id, conversation_id, Role::Assistant, &answer)
            .await?;

        info!(
            user_id,
            conversation_id,
            cited = cited_memory_ids.len(),
            "chat turn answered"
        );
        Ok((
            ChatOutcome {
                assistant_text: answer,
                cited_memory_ids,
                assistant_message_id,
            },
            user_message_id,
        ))
    }

    /// Background work after a successful turn: extraction always,
    /// summarization and insights when their triggers fire. Submission
    /// failures are logged, never surfaced to the chat caller.
    async fn schedule_background(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_message_id: &str,
    ) {
        if let Err(err) = self
            .submit_extract(user_id, conversation_id, user_message_id)
            .await
        {
            warn!(user_id, error = %err, "extract submission failed");
        }

        match self
            .summarizer
            .should_summarize(user_id, conversation_id)
            .await
        {
            Ok(true) => {
                if let Err(err) = self.submit_summarize(user_id, conversation_id).await {
                    warn!(user_id, error = %err, "summarize submission failed");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(user_id, error = %err, "summarize trigger check failed"),
        }

        self.maybe_submit_insights(user_id).await;
    }

    async fn maybe_submit_insights(&self, user_id: &str) {
        let count = match self.store.count_memories(user_id).await {
            Ok(count) => count,
            Err(err) => {
                warn!(user_id, error = %err, "insight trigger count failed");
                return;
            }
        };

        let due = {
            let mut triggers = self.insight_triggers.lock().await;
            let trigger = triggers
                .entry(user_id.to_string())
                .or_insert_with(|| InsightTrigger {
                    last_run: Instant::now(),
                    count_at_last_run: count,
                });
            let new_memories = count.saturating_sub(trigger.count_at_last_run);
            let interval = Duration::from_secs(self.config.insights.interval_secs);
            let due = new_memories >= self.config.insights.new_memory_trigger as i64
                || trigger.last_run.elapsed() >= interval;
            if due {
                trigger.last_run = Instant::now();
                trigger.count_at_last_run = count;
            }
            due
        };

        if due {
            if let Err(err) = self.submit_insights(user_id).await {
                warn!(user_id, error = %err, "insights submission failed");
            }
        }
    }

    // ---------- task submission ----------

    pub async fn submit_extract(
        &self,
        user_id: &str,
        conversation_id: &str,
        user_message_id: &str,
    ) -> Result<String, MnemonError> {
        self.orchestrator
            .submit(SubmitRequest {
                kind: TaskKind::Extract,
                user_id: user_id.to_string(),
                conversation_id: Some(conversation_id.to_string()),
                payload: serde_json::to_value(ExtractPayload {
                    message_id: user_message_id.to_string(),
                })
                .expect("payload serializes"),
            })
            .await
    }

    pub async fn submit_summarize(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<String, MnemonError> {
        self.orchestrator
            .submit(SubmitRequest {
                kind: TaskKind::Summarize,
                user_id: user_id.to_string(),
                conversation_id: Some(conversation_id.to_string()),
                payload: empty_payload(),
            })
            .await
    }

    pub async fn submit_insights(&self, user_id: &str) -> Result<String, MnemonError> {
        self.orchestrator
            .submit(SubmitRequest {
                kind: TaskKind::Insights,
                user_id: user_id.to_string(),
                conversation_id: None,
                payload: empty_payload(),
            })
            .await
    }

    pub async fn submit_correction(
        &self,
        user_id: &str,
        memory_id: &str,
        new_text: &str,
    ) -> Result<String, MnemonError> {
        self.orchestrator
            .submit(SubmitRequest {
                kind: TaskKind::Correct,
                user_id: user_id.to_string(),
                conversation_id: None,
                payload: serde_json::to_value(CorrectPayload {
                    memory_id: memory_id.to_string(),
                    new_text: new_text.to_string(),
                })
                .expect("payload serializes"),
            })
            .await
    }

    pub async fn status(&self, task_id: &str) -> Option<Task> {
        self.orchestrator.status(task_id).await
    }

    pub async fn cancel(&self, task_id: &str) -> bool {
        self.orchestrator.cancel(task_id).await
    }

    // ---------- direct reads and small mutations ----------

    /// Hybrid retrieval, exposed for the API layer.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<Vec<ScoredMemory>, MnemonError> {
        self.retriever.retrieve(user_id, query, conversation_id).await
    }

    pub async fn list_memories(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, MnemonError> {
        self.store
            .list_memories(user_id, conversation_id, limit, offset)
            .await
    }

    pub async fn list_insights(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Insight>, MnemonError> {
        self.store.list_insights(user_id, limit).await
    }

    pub async fn set_pinned(
        &self,
        user_id: &str,
        memory_id: &str,
        pinned: bool,
    ) -> Result<(), MnemonError> {
        self.store
            .update_memory(
                user_id,
                memory_id,
                MemoryPatch {
                    pinned: Some(pinned),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn mark_bad(&self, user_id: &str, memory_id: &str) -> Result<(), MnemonError> {
        self.store
            .update_memory(
                user_id,
                memory_id,
                MemoryPatch {
                    bad: Some(true),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<(), MnemonError> {
        self.store.delete_memory(user_id, memory_id).await
    }

    pub async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), MnemonError> {
        self.store.delete_conversation(user_id, conversation_id).await
    }
}
