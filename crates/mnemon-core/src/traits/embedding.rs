// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding capability: text to fixed-dimension vectors.

use async_trait::async_trait;

use crate::error::MnemonError;

/// Adapter for generating vector embeddings from text.
///
/// `embed` is order-preserving and reports failure per input: position `i`
/// of the output corresponds to `texts[i]`, and a single bad input does not
/// poison the batch. Returning `Err` at the top level means the whole call
/// failed (network, auth) and may be retried.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync + 'static {
    /// The fixed embedding dimension this adapter produces.
    ///
    /// The engine treats a stored vector of any other length as `Fatal`.
    fn dimensions(&self) -> usize;

    /// Generates one embedding per input, order-preserving.
    async fn embed(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Result<Vec<f32>, MnemonError>>, MnemonError>;
}
