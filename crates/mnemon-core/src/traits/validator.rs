// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation capability applied wherever untrusted text enters a prompt.

use async_trait::async_trait;

use crate::error::MnemonError;
use crate::types::{ValidationContext, Verdict};

/// Adapter for the safety validator.
///
/// When the verdict is unsafe the caller must abandon the operation with
/// [`MnemonError::Unsafe`](crate::error::MnemonError::Unsafe); the text must
/// not be fed to the completion capability.
#[async_trait]
pub trait ValidatorAdapter: Send + Sync + 'static {
    /// Judges one piece of text under the given boundary tag.
    async fn validate(
        &self,
        text: &str,
        context: ValidationContext,
    ) -> Result<Verdict, MnemonError>;
}
