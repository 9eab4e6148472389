// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory semantics for the mnemon engine.
//!
//! - **HybridRetriever**: vector + lexical + recency fusion under per-user
//!   isolation, with a pinned-score floor.
//! - **MemoryWriter**: LLM extraction, confidence filtering, fingerprint
//!   dedup, batched embedding with a bounded retry budget, corrections.
//! - **RollingSummarizer**: bounded in-place conversation summaries with
//!   verified memory citations.
//! - **InsightMiner**: append-only higher-order statements grouped by
//!   memory type.

pub mod fingerprint;
pub mod insights;
pub mod retriever;
pub mod summarizer;
pub mod writer;

pub use fingerprint::{fingerprint, normalize};
pub use insights::InsightMiner;
pub use retriever::{HybridRetriever, ScoredMemory};
pub use summarizer::{extract_citations, RollingSummarizer, SummarizeOutcome};
pub use writer::{parse_candidates, Candidate, MemoryWriter, WriteOutcome};
