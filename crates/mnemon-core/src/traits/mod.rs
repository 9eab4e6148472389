// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits consumed by the engine.
//!
//! All four capabilities (embedding, completion, validation, and the store
//! itself) are passed by reference into component constructors; nothing is
//! resolved through module-level state, so tests substitute in-memory fakes.

pub mod completion;
pub mod embedding;
pub mod validator;

pub use completion::CompletionAdapter;
pub use embedding::EmbeddingAdapter;
pub use validator::ValidatorAdapter;
