// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock validator capabilities.

use async_trait::async_trait;

use mnemon_core::error::MnemonError;
use mnemon_core::traits::ValidatorAdapter;
use mnemon_core::types::{ValidationContext, Verdict};

/// Accepts everything.
pub struct AllowAllValidator;

#[async_trait]
impl ValidatorAdapter for AllowAllValidator {
    async fn validate(
        &self,
        _text: &str,
        _context: ValidationContext,
    ) -> Result<Verdict, MnemonError> {
        Ok(Verdict::safe())
    }
}

/// Refuses any text containing a fixed substring.
pub struct DenySubstringValidator {
    needle: String,
}

impl DenySubstringValidator {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

#[async_trait]
impl ValidatorAdapter for DenySubstringValidator {
    async fn validate(
        &self,
        text: &str,
        _context: ValidationContext,
    ) -> Result<Verdict, MnemonError> {
        if text.contains(&self.needle) {
            Ok(Verdict::unsafe_with("blocked_substring", 0.9))
        } else {
            Ok(Verdict::safe())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_allows() {
        let verdict = AllowAllValidator
            .validate("anything at all", ValidationContext::ResponderUser)
            .await
            .unwrap();
        assert!(verdict.safe);
    }

    #[tokio::test]
    async fn deny_substring_blocks() {
        let validator = DenySubstringValidator::new("FORBIDDEN");
        let bad = validator
            .validate("this is FORBIDDEN text", ValidationContext::WriterExtract)
            .await
            .unwrap();
        assert!(!bad.safe);

        let ok = validator
            .validate("this is fine", ValidationContext::WriterExtract)
            .await
            .unwrap();
        assert!(ok.safe);
    }
}
