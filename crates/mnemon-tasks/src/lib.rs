// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous task orchestration for the mnemon memory engine.
//!
//! Every LLM-heavy mutation runs as a background task with a deterministic
//! id, idempotent submission inside a dedup window, bounded queueing, a
//! worker pool, per-kind retry caps and deadlines, and single-flight
//! execution for `extract`/`summarize` per `(user, conversation)` key.

pub mod orchestrator;
pub mod payload;
pub mod task_id;

pub use orchestrator::{Orchestrator, SubmitRequest, TaskRunner};
pub use payload::{empty_payload, CorrectPayload, ExtractPayload};
pub use task_id::{payload_hash, task_id};
