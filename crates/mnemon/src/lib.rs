// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent, per-user semantic memory for LLM-driven chat applications.
//!
//! Given a stream of user turns, the engine extracts durable typed
//! "memories", stores them with vector and lexical indexes, and on each
//! new turn assembles a bounded context of the most relevant memories plus
//! a rolling conversation summary. The foreground path answers a turn
//! synchronously; extraction, summarization, and insight mining run as
//! idempotent background tasks with observable status.
//!
//! The engine consumes three abstract capabilities — embedding, completion,
//! and validation — injected at construction. Any concrete binding that
//! satisfies the [`mnemon_core::traits`] contracts works; tests use the
//! in-memory fakes from `mnemon-test-utils`.

pub mod engine;
pub mod runner;
pub mod telemetry;

pub use engine::MemoryEngine;
pub use telemetry::init_tracing;

// Re-export the pieces the API layer needs to talk to the engine.
pub use mnemon_config::MnemonConfig;
pub use mnemon_core::error::MnemonError;
pub use mnemon_core::types::{
    ChatOutcome, Insight, Memory, MemoryKind, Message, Role, SummaryScope, Task, TaskKind,
    TaskState,
};
pub use mnemon_memory::ScoredMemory;
