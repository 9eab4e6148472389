// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the mnemon workspace.
//!
//! Every persistent entity is partitioned by `user_id`; the store enforces
//! the partition on every read and write. Enums that cross the SQLite
//! boundary carry `as_str`/`parse` pairs rather than serde renames so the
//! stored strings stay an explicit part of the contract.

use serde::{Deserialize, Serialize};

/// Closed set of memory types produced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Preference,
    Fact,
    Plan,
    Entity,
    Relation,
}

impl MemoryKind {
    /// Stored/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Preference => "preference",
            MemoryKind::Fact => "fact",
            MemoryKind::Plan => "plan",
            MemoryKind::Entity => "entity",
            MemoryKind::Relation => "relation",
        }
    }

    /// Strict parse; anything outside the closed set is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preference" => Some(MemoryKind::Preference),
            "fact" => Some(MemoryKind::Fact),
            "plan" => Some(MemoryKind::Plan),
            "entity" => Some(MemoryKind::Entity),
            "relation" => Some(MemoryKind::Relation),
            _ => None,
        }
    }

    /// Default importance assigned when the extractor omits one.
    pub fn default_importance(&self) -> f64 {
        match self {
            MemoryKind::Preference => 0.7,
            MemoryKind::Plan => 0.8,
            MemoryKind::Fact => 0.6,
            MemoryKind::Entity => 0.5,
            MemoryKind::Relation => 0.5,
        }
    }
}

/// A single durable, typed statement about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    /// Conversation the memory was extracted from; `None` once detached.
    pub conversation_id: Option<String>,
    pub text: String,
    pub kind: MemoryKind,
    /// Type-derived importance in `[0, 1]`.
    pub importance: f64,
    /// Extractor confidence in `[0, 1]`.
    pub confidence: f64,
    /// Excluded from all retrieval when set.
    pub bad: bool,
    /// Receives a fused-score floor in ranking when set.
    pub pinned: bool,
    /// Fingerprint: stable hash of `(normalized_text, kind)`, unique per user.
    pub idempotency_key: String,
    /// Absent while the embedding is pending or has failed permanently.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Free-form provenance map (source, correction markers, embed failures).
    pub provenance: serde_json::Map<String, serde_json::Value>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// Partial update applied to a memory row. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// Replacing text clears the stored embedding until re-embedded.
    pub text: Option<String>,
    pub embedding: Option<Option<Vec<f32>>>,
    pub bad: Option<bool>,
    pub pinned: Option<bool>,
    pub importance: Option<f64>,
    pub confidence: Option<f64>,
    pub provenance: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Filter shared by the three retrieval source queries.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to one conversation; pinned memories always qualify.
    pub conversation_id: Option<String>,
    /// Keep only memories at or above this confidence.
    pub min_confidence: Option<f64>,
}

/// Message role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

/// A single turn within a conversation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub text: String,
    pub created_at: String,
}

/// A conversation shell. Created lazily on first turn, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub created_at: String,
}

/// Scope of a stored summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryScope {
    Rolling,
    Full,
}

impl SummaryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryScope::Rolling => "rolling",
            SummaryScope::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rolling" => Some(SummaryScope::Rolling),
            "full" => Some(SummaryScope::Full),
            _ => None,
        }
    }
}

/// Bounded compression of a conversation, rewritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub scope: SummaryScope,
    pub content: String,
    pub citations: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Higher-order statement derived from multiple memories. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub supporting: Vec<String>,
    pub created_at: String,
}

/// Kind of a background or foreground task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ChatAssemble,
    Extract,
    Summarize,
    Insights,
    Correct,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ChatAssemble => "chat_assemble",
            TaskKind::Extract => "extract",
            TaskKind::Summarize => "summarize",
            TaskKind::Insights => "insights",
            TaskKind::Correct => "correct",
        }
    }
}

/// Lifecycle state of a task. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A submitted unit of background work with observable status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub state: TaskState,
    pub submitted_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Advisory output shape for a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Text,
    Json,
}

/// A structured prompt for the completion capability.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub shape: ResponseShape,
}

/// Boundary at which untrusted text is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationContext {
    WriterExtract,
    SummarizerInput,
    InsightInput,
    ResponderUser,
    Correction,
}

impl ValidationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationContext::WriterExtract => "writer_extract",
            ValidationContext::SummarizerInput => "summarizer_input",
            ValidationContext::InsightInput => "insight_input",
            ValidationContext::ResponderUser => "responder_user",
            ValidationContext::Correction => "correction",
        }
    }
}

/// Validator decision for one piece of text.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub safe: bool,
    pub reason: Option<String>,
    pub score: f32,
}

impl Verdict {
    pub fn safe() -> Self {
        Verdict {
            safe: true,
            reason: None,
            score: 0.0,
        }
    }

    pub fn unsafe_with(reason: impl Into<String>, score: f32) -> Self {
        Verdict {
            safe: false,
            reason: Some(reason.into()),
            score,
        }
    }
}

/// Result of the foreground assemble-and-answer path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub assistant_text: String,
    pub cited_memory_ids: Vec<String>,
    pub assistant_message_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_kind_round_trip() {
        for kind in [
            MemoryKind::Preference,
            MemoryKind::Fact,
            MemoryKind::Plan,
            MemoryKind::Entity,
            MemoryKind::Relation,
        ] {
            assert_eq!(MemoryKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MemoryKind::parse("correction"), None);
        assert_eq!(MemoryKind::parse(""), None);
    }

    #[test]
    fn default_importance_by_kind() {
        assert_eq!(MemoryKind::Preference.default_importance(), 0.7);
        assert_eq!(MemoryKind::Plan.default_importance(), 0.8);
        assert_eq!(MemoryKind::Fact.default_importance(), 0.6);
        assert_eq!(MemoryKind::Entity.default_importance(), 0.5);
        assert_eq!(MemoryKind::Relation.default_importance(), 0.5);
    }

    #[test]
    fn role_round_trip() {
        for role in [Role::User, Role::Assistant, Role::System, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn summary_scope_round_trip() {
        assert_eq!(SummaryScope::parse("rolling"), Some(SummaryScope::Rolling));
        assert_eq!(SummaryScope::parse("full"), Some(SummaryScope::Full));
        assert_eq!(SummaryScope::parse("partial"), None);
    }

    #[test]
    fn task_kind_strings() {
        assert_eq!(TaskKind::ChatAssemble.as_str(), "chat_assemble");
        assert_eq!(TaskKind::Extract.as_str(), "extract");
        assert_eq!(TaskKind::Summarize.as_str(), "summarize");
        assert_eq!(TaskKind::Insights.as_str(), "insights");
        assert_eq!(TaskKind::Correct.as_str(), "correct");
    }

    #[test]
    fn validation_context_tags_are_closed_set() {
        let tags: Vec<&str> = [
            ValidationContext::WriterExtract,
            ValidationContext::SummarizerInput,
            ValidationContext::InsightInput,
            ValidationContext::ResponderUser,
            ValidationContext::Correction,
        ]
        .iter()
        .map(|c| c.as_str())
        .collect();
        assert_eq!(
            tags,
            vec![
                "writer_extract",
                "summarizer_input",
                "insight_input",
                "responder_user",
                "correction"
            ]
        );
    }

    #[test]
    fn verdict_constructors() {
        let ok = Verdict::safe();
        assert!(ok.safe);
        assert!(ok.reason.is_none());

        let bad = Verdict::unsafe_with("injection pattern", 0.9);
        assert!(!bad.safe);
        assert_eq!(bad.reason.as_deref(), Some("injection pattern"));
        assert!((bad.score - 0.9).abs() < f32::EPSILON);
    }
}
