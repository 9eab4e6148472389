// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock embedder.
//!
//! Each whitespace token hashes into a bucket of the output vector, so
//! texts sharing words land near each other in cosine space. Failures can
//! be injected at the call level (transient, consumed per call) or per
//! item via a poison marker.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mnemon_core::error::MnemonError;
use mnemon_core::traits::EmbeddingAdapter;

/// Token-bucket embedder with injectable failures.
pub struct MockEmbedder {
    dimensions: usize,
    fail_next: AtomicU32,
    poison_marker: Mutex<Option<String>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_next: AtomicU32::new(0),
            poison_marker: Mutex::new(None),
        }
    }

    /// The next `n` embed calls fail entirely with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Texts containing `marker` fail per-item with a transient error.
    pub fn poison(&self, marker: impl Into<String>) {
        *self.poison_marker.lock().unwrap() = Some(marker.into());
    }

    /// Clears the per-item poison marker.
    pub fn heal(&self) {
        *self.poison_marker.lock().unwrap() = None;
    }

    /// The deterministic embedding for one text.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let mut token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }
            // Light plural folding so "works" and "work" share a bucket.
            if token.len() > 3 && token.ends_with('s') {
                token.pop();
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Result<Vec<f32>, MnemonError>>, MnemonError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MnemonError::transient("injected embed failure"));
        }

        let marker = self.poison_marker.lock().unwrap().clone();
        Ok(texts
            .into_iter()
            .map(|text| match &marker {
                Some(marker) if text.contains(marker.as_str()) => {
                    Err(MnemonError::transient("poisoned item"))
                }
                _ => Ok(self.vector_for(&text)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_storage::cosine_similarity;

    #[tokio::test]
    async fn deterministic_and_normalized() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.vector_for("data scientist in Berlin");
        let b = embedder.vector_for("data scientist in Berlin");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_tokens_are_closer() {
        let embedder = MockEmbedder::new(64);
        let work = embedder.vector_for("works as a data scientist");
        let query = embedder.vector_for("what data scientist work");
        let unrelated = embedder.vector_for("purple elephants dancing tonight");
        assert!(
            cosine_similarity(&work, &query) > cosine_similarity(&work, &unrelated),
            "overlapping-token texts should be more similar"
        );
    }

    #[tokio::test]
    async fn order_preserving_batch() {
        let embedder = MockEmbedder::new(16);
        let results = embedder
            .embed(vec!["alpha".into(), "beta".into()])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &embedder.vector_for("alpha")
        );
        assert_eq!(results[1].as_ref().unwrap(), &embedder.vector_for("beta"));
    }

    #[tokio::test]
    async fn call_level_failure_consumed() {
        let embedder = MockEmbedder::new(16);
        embedder.fail_next(1);
        assert!(embedder.embed(vec!["x".into()]).await.is_err());
        assert!(embedder.embed(vec!["x".into()]).await.is_ok());
    }

    #[tokio::test]
    async fn poisoned_item_fails_alone() {
        let embedder = MockEmbedder::new(16);
        embedder.poison("BAD");
        let results = embedder
            .embed(vec!["fine text".into(), "this is BAD text".into()])
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());

        embedder.heal();
        let results = embedder.embed(vec!["this is BAD text".into()]).await.unwrap();
        assert!(results[0].is_ok());
    }
}
