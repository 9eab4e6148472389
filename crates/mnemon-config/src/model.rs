// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the mnemon memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Every tunable the engine reads lives here with
//! its documented default.

use serde::{Deserialize, Serialize};

/// Top-level mnemon configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemonConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Hybrid retrieval weights and fan-out sizes.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Memory extraction settings.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Rolling summary settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Insight mining settings.
    #[serde(default)]
    pub insights: InsightsConfig,

    /// Embedding capability settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Background task orchestration settings.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Foreground chat settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "mnemon.db".to_string()
}

/// Hybrid retrieval weights and fan-out sizes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Candidates fetched from the vector source.
    #[serde(default = "default_k_vec")]
    pub k_vec: usize,

    /// Candidates fetched from the lexical source.
    #[serde(default = "default_k_lex")]
    pub k_lex: usize,

    /// Candidates fetched from the recency source.
    #[serde(default = "default_k_recent")]
    pub k_recent: usize,

    /// Maximum memories returned per retrieval.
    #[serde(default = "default_k_out")]
    pub k_out: usize,

    /// Weight of the normalized vector score in fusion.
    #[serde(default = "default_w_vec")]
    pub w_vec: f64,

    /// Weight of the normalized lexical score in fusion.
    #[serde(default = "default_w_lex")]
    pub w_lex: f64,

    /// Fused-score floor applied to pinned memories.
    #[serde(default = "default_pinned_floor")]
    pub pinned_floor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_vec: default_k_vec(),
            k_lex: default_k_lex(),
            k_recent: default_k_recent(),
            k_out: default_k_out(),
            w_vec: default_w_vec(),
            w_lex: default_w_lex(),
            pinned_floor: default_pinned_floor(),
        }
    }
}

fn default_k_vec() -> usize {
    40
}

fn default_k_lex() -> usize {
    40
}

fn default_k_recent() -> usize {
    10
}

fn default_k_out() -> usize {
    20
}

fn default_w_vec() -> f64 {
    0.6
}

fn default_w_lex() -> f64 {
    0.4
}

fn default_pinned_floor() -> f64 {
    0.5
}

/// Memory extraction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriterConfig {
    /// Candidates below this confidence are dropped.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Maximum candidate text length after sanitization.
    #[serde(default = "default_max_candidate_chars")]
    pub max_candidate_chars: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_candidate_chars: default_max_candidate_chars(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_max_candidate_chars() -> usize {
    1000
}

/// Rolling summary settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizerConfig {
    /// Summarize after this many new user turns.
    #[serde(default = "default_turn_interval")]
    pub turn_interval: usize,

    /// Summarize when accumulated new-turn characters exceed this.
    #[serde(default = "default_char_threshold")]
    pub char_threshold: usize,

    /// Hard cap on summary content length.
    #[serde(default = "default_summary_max_chars")]
    pub max_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            turn_interval: default_turn_interval(),
            char_threshold: default_char_threshold(),
            max_chars: default_summary_max_chars(),
        }
    }
}

fn default_turn_interval() -> usize {
    8
}

fn default_char_threshold() -> usize {
    4000
}

fn default_summary_max_chars() -> usize {
    2000
}

/// Insight mining settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InsightsConfig {
    /// Only memories at or above this confidence feed insight mining.
    #[serde(default = "default_insight_min_confidence")]
    pub min_confidence: f64,

    /// How many recent high-confidence memories to consider.
    #[serde(default = "default_insight_window")]
    pub window: usize,

    /// Maximum insights requested per type group per run.
    #[serde(default = "default_insights_per_group")]
    pub max_per_group: usize,

    /// Trigger a run after this many new memories for a user.
    #[serde(default = "default_new_memory_trigger")]
    pub new_memory_trigger: usize,

    /// Trigger a run after this much wall time, in seconds.
    #[serde(default = "default_insight_interval_secs")]
    pub interval_secs: u64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_insight_min_confidence(),
            window: default_insight_window(),
            max_per_group: default_insights_per_group(),
            new_memory_trigger: default_new_memory_trigger(),
            interval_secs: default_insight_interval_secs(),
        }
    }
}

fn default_insight_min_confidence() -> f64 {
    0.7
}

fn default_insight_window() -> usize {
    100
}

fn default_insights_per_group() -> usize {
    3
}

fn default_new_memory_trigger() -> usize {
    25
}

fn default_insight_interval_secs() -> u64 {
    3600
}

/// Embedding capability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Fixed embedding dimension; a stored vector of any other length is fatal.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum texts per embed call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-item embed attempts before the row is marked degraded.
    #[serde(default = "default_embed_attempts")]
    pub max_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            max_attempts: default_embed_attempts(),
        }
    }
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    64
}

fn default_embed_attempts() -> u32 {
    3
}

/// Background task orchestration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Bounded queue capacity; submissions above it are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of background worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Duplicate submissions within this window return the same task id.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Deadline for the foreground chat path, in seconds.
    #[serde(default = "default_chat_deadline_secs")]
    pub chat_deadline_secs: u64,

    /// Deadline for extract tasks, in seconds.
    #[serde(default = "default_extract_deadline_secs")]
    pub extract_deadline_secs: u64,

    /// Deadline for summarize tasks, in seconds.
    #[serde(default = "default_summarize_deadline_secs")]
    pub summarize_deadline_secs: u64,

    /// Deadline for insight tasks, in seconds.
    #[serde(default = "default_insights_deadline_secs")]
    pub insights_deadline_secs: u64,

    /// Deadline for correction tasks, in seconds.
    #[serde(default = "default_correct_deadline_secs")]
    pub correct_deadline_secs: u64,

    /// Retry cap for extract tasks.
    #[serde(default = "default_extract_retries")]
    pub extract_retries: u32,

    /// Retry cap for summarize tasks.
    #[serde(default = "default_summarize_retries")]
    pub summarize_retries: u32,

    /// Retry cap for insight tasks.
    #[serde(default = "default_insights_retries")]
    pub insights_retries: u32,

    /// Retry cap for correction tasks.
    #[serde(default = "default_correct_retries")]
    pub correct_retries: u32,

    /// Terminal tasks are garbage-collected after this window, in seconds.
    #[serde(default = "default_task_gc_secs")]
    pub gc_after_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            dedup_window_secs: default_dedup_window_secs(),
            chat_deadline_secs: default_chat_deadline_secs(),
            extract_deadline_secs: default_extract_deadline_secs(),
            summarize_deadline_secs: default_summarize_deadline_secs(),
            insights_deadline_secs: default_insights_deadline_secs(),
            correct_deadline_secs: default_correct_deadline_secs(),
            extract_retries: default_extract_retries(),
            summarize_retries: default_summarize_retries(),
            insights_retries: default_insights_retries(),
            correct_retries: default_correct_retries(),
            gc_after_secs: default_task_gc_secs(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_chat_deadline_secs() -> u64 {
    10
}

fn default_extract_deadline_secs() -> u64 {
    15
}

fn default_summarize_deadline_secs() -> u64 {
    20
}

fn default_insights_deadline_secs() -> u64 {
    20
}

fn default_correct_deadline_secs() -> u64 {
    15
}

fn default_extract_retries() -> u32 {
    3
}

fn default_summarize_retries() -> u32 {
    2
}

fn default_insights_retries() -> u32 {
    2
}

fn default_correct_retries() -> u32 {
    3
}

fn default_task_gc_secs() -> u64 {
    3600
}

/// Foreground chat settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Maximum tokens for the responder completion.
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    /// Recent messages included in the responder prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_chat_max_tokens(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_chat_max_tokens() -> u32 {
    900
}

fn default_history_limit() -> usize {
    12
}
