// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed persistence for the mnemon memory engine.
//!
//! The [`Store`] implements the engine's persistence contract: per-user
//! partitioned memories with vector and lexical indexes, append-only
//! messages with lazy conversation creation, in-place summaries, and
//! append-only insights. Embeddings live in a BLOB column; lexical ranking
//! uses an FTS5 virtual table kept in sync by triggers; migrations are
//! embedded via refinery and run on open.

pub mod database;
pub mod store;
pub mod vector;

pub use database::Database;
pub use store::{now_iso, InsertOutcome, Store};
pub use vector::{blob_to_vec, cosine_distance, cosine_similarity, vec_to_blob};
