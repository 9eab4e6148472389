// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the mnemon memory engine.
//!
//! Provides the error taxonomy, the domain types shared by every crate in
//! the workspace, the capability traits the engine consumes (embedding,
//! completion, validation), and the bounded-backoff retry helper.

pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::MnemonError;
pub use traits::{CompletionAdapter, EmbeddingAdapter, ValidatorAdapter};
