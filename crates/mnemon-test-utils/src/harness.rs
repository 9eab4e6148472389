// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness building a full engine over a temp SQLite database with
//! mock capabilities. Each harness is isolated; tests are independent and
//! order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use mnemon::MemoryEngine;
use mnemon_config::MnemonConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::traits::ValidatorAdapter;
use mnemon_core::types::{Task, TaskState};
use mnemon_storage::Database;

use crate::mock_completion::MockCompletion;
use crate::mock_embedder::MockEmbedder;
use crate::mock_validator::AllowAllValidator;

/// A fully wired engine with handles to its mocks.
pub struct TestHarness {
    pub engine: MemoryEngine,
    pub completion: Arc<MockCompletion>,
    pub embedder: Arc<MockEmbedder>,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Polls a task until it reaches a terminal state.
    pub async fn wait_task(&self, task_id: &str) -> Task {
        for _ in 0..500 {
            if let Some(task) = self.engine.status(task_id).await {
                if matches!(task.state, TaskState::Completed | TaskState::Failed) {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not reach a terminal state");
    }
}

/// Builder with test-friendly defaults: small embedding dimension, short
/// deadlines, a couple of workers.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: MnemonConfig,
    validator: Arc<dyn ValidatorAdapter>,
}

impl TestHarnessBuilder {
    pub fn new() -> Self {
        let mut config = MnemonConfig::default();
        config.embedding.dimensions = 32;
        config.tasks.workers = 2;
        config.tasks.chat_deadline_secs = 5;
        config.tasks.extract_deadline_secs = 5;
        config.tasks.summarize_deadline_secs = 5;
        config.tasks.insights_deadline_secs = 5;
        config.tasks.correct_deadline_secs = 5;
        Self {
            responses: Vec::new(),
            config,
            validator: Arc::new(AllowAllValidator),
        }
    }

    /// Queue completion responses, consumed FIFO across all prompts.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Replace the whole config.
    pub fn with_config(mut self, config: MnemonConfig) -> Self {
        self.config = config;
        self
    }

    /// Tweak the config in place.
    pub fn configure(mut self, f: impl FnOnce(&mut MnemonConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Substitute the validator capability.
    pub fn with_validator(mut self, validator: Arc<dyn ValidatorAdapter>) -> Self {
        self.validator = validator;
        self
    }

    pub async fn build(self) -> Result<TestHarness, MnemonError> {
        let dir = tempfile::tempdir()
            .map_err(|e| MnemonError::fatal(format!("tempdir failed: {e}")))?;
        let db_path = dir.path().join("mnemon-test.db");
        let db = Database::open(db_path.to_str().expect("utf8 temp path")).await?;

        let completion = Arc::new(MockCompletion::with_responses(self.responses));
        let embedder = Arc::new(MockEmbedder::new(self.config.embedding.dimensions));

        let engine = MemoryEngine::from_parts(
            self.config,
            db,
            embedder.clone(),
            completion.clone(),
            self.validator,
        );
        Ok(TestHarness {
            engine,
            completion,
            embedder,
            _dir: dir,
        })
    }
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
