// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task orchestration.
//!
//! Tasks are submitted with deterministic ids (hash of kind, key, and
//! payload), deduplicated within a bounded window, queued into a bounded
//! channel, and executed by a worker pool. `extract` and `summarize` are
//! single-flight per `(user, conversation, kind)`: a second submission
//! coalesces onto the in-flight run or waits for it to finish. Tasks never
//! throw; they terminate in `completed` or `failed` with the error recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mnemon_config::model::TasksConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::types::{Task, TaskKind, TaskState};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task_id::{payload_hash, task_id};

/// Executes one task kind's work. Implemented by the engine facade.
///
/// Runners observe the cancellation token between component calls;
/// in-flight external calls are not interrupted but their results are
/// discarded once the token fires.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(
        &self,
        task: &Task,
        payload: &Value,
        cancel: CancellationToken,
    ) -> Result<Value, MnemonError>;
}

/// A task submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub kind: TaskKind,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub payload: Value,
}

struct TaskEntry {
    task: Task,
    payload: Value,
    finished: Option<Instant>,
}

type FlightKey = (String, Option<String>, TaskKind);

struct Inner {
    runner: Arc<dyn TaskRunner>,
    config: TasksConfig,
    queue_tx: mpsc::Sender<String>,
    queue_rx: Mutex<mpsc::Receiver<String>>,
    tasks: RwLock<HashMap<String, TaskEntry>>,
    dedup: Mutex<HashMap<String, Instant>>,
    flights: Mutex<HashMap<FlightKey, Arc<Mutex<()>>>>,
    running_tokens: Mutex<HashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

/// Submits, schedules, and tracks background tasks.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn TaskRunner>, config: TasksConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                runner,
                config,
                queue_tx,
                queue_rx: Mutex::new(queue_rx),
                tasks: RwLock::new(HashMap::new()),
                dedup: Mutex::new(HashMap::new()),
                flights: Mutex::new(HashMap::new()),
                running_tokens: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Spawns the worker pool. Call once after construction.
    pub fn start(&self) {
        let workers = self.inner.config.workers.max(1);
        for worker_id in 0..workers {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                worker_loop(inner, worker_id).await;
            });
        }
        info!(workers, "task workers started");
    }

    /// Submits a task. Duplicate submissions within the dedup window, and
    /// submissions matching a still-active task, return the existing id
    /// without enqueueing a second run. A full queue is `Overload`.
    pub async fn submit(&self, request: SubmitRequest) -> Result<String, MnemonError> {
        let hash = payload_hash(&request.payload);
        let tid = task_id(
            request.kind,
            &request.user_id,
            request.conversation_id.as_deref(),
            &hash,
        );
        let window = Duration::from_secs(self.inner.config.dedup_window_secs);

        {
            let mut dedup = self.inner.dedup.lock().await;
            dedup.retain(|_, submitted| submitted.elapsed() < window);
            if dedup.contains_key(&tid) {
                debug!(task_id = tid.as_str(), "duplicate submission coalesced");
                return Ok(tid);
            }
            // An active run with this id also coalesces, regardless of window.
            let tasks = self.inner.tasks.read().await;
            if let Some(entry) = tasks.get(&tid) {
                if !is_terminal(entry.task.state) {
                    debug!(task_id = tid.as_str(), "submission coalesced onto active task");
                    return Ok(tid);
                }
            }
            drop(tasks);
            dedup.insert(tid.clone(), Instant::now());
        }

        self.gc_terminal().await;

        let task = Task {
            id: tid.clone(),
            kind: request.kind,
            user_id: request.user_id,
            conversation_id: request.conversation_id,
            state: TaskState::Pending,
            submitted_at: now_iso(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        };
        self.inner.tasks.write().await.insert(
            tid.clone(),
            TaskEntry {
                task,
                payload: request.payload,
                finished: None,
            },
        );

        if self.inner.queue_tx.try_send(tid.clone()).is_err() {
            self.inner.tasks.write().await.remove(&tid);
            self.inner.dedup.lock().await.remove(&tid);
            return Err(MnemonError::Overload("task queue full".to_string()));
        }
        Ok(tid)
    }

    /// Current status of a task, if still retained.
    pub async fn status(&self, task_id: &str) -> Option<Task> {
        self.inner
            .tasks
            .read()
            .await
            .get(task_id)
            .map(|entry| entry.task.clone())
    }

    /// Best-effort cancel. A pending task fails immediately; a running
    /// task's token fires and is observed at its next component boundary.
    pub async fn cancel(&self, task_id: &str) -> bool {
        if let Some(token) = self.inner.running_tokens.lock().await.get(task_id) {
            token.cancel();
            return true;
        }
        let mut tasks = self.inner.tasks.write().await;
        if let Some(entry) = tasks.get_mut(task_id) {
            if entry.task.state == TaskState::Pending {
                entry.task.state = TaskState::Failed;
                entry.task.error = Some("cancelled".to_string());
                entry.task.finished_at = Some(now_iso());
                entry.finished = Some(Instant::now());
                return true;
            }
        }
        false
    }

    /// Records a foreground operation as a task so `status` can report it.
    /// Returns the deterministic id; the caller finishes it via
    /// [`finish_inline`](Self::finish_inline).
    pub async fn begin_inline(
        &self,
        kind: TaskKind,
        user_id: &str,
        conversation_id: Option<&str>,
        payload: &Value,
    ) -> String {
        let hash = payload_hash(payload);
        let tid = task_id(kind, user_id, conversation_id, &hash);
        let now = now_iso();
        let task = Task {
            id: tid.clone(),
            kind,
            user_id: user_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            state: TaskState::Running,
            submitted_at: now.clone(),
            started_at: Some(now),
            finished_at: None,
            result: None,
            error: None,
        };
        self.inner.tasks.write().await.insert(
            tid.clone(),
            TaskEntry {
                task,
                payload: payload.clone(),
                finished: None,
            },
        );
        tid
    }

    /// Terminates an inline-recorded task.
    pub async fn finish_inline(&self, task_id: &str, outcome: Result<Value, &MnemonError>) {
        let mut tasks = self.inner.tasks.write().await;
        if let Some(entry) = tasks.get_mut(task_id) {
            apply_outcome(entry, outcome.map_err(|e| e.to_string()));
        }
    }

    /// Stops the workers after their current task.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Drop terminal tasks older than the retention window.
    async fn gc_terminal(&self) {
        let window = Duration::from_secs(self.inner.config.gc_after_secs);
        let mut tasks = self.inner.tasks.write().await;
        tasks.retain(|_, entry| match entry.finished {
            Some(finished) => finished.elapsed() < window,
            None => true,
        });
    }
}

async fn worker_loop(inner: Arc<Inner>, worker_id: usize) {
    debug!(worker_id, "task worker running");
    loop {
        let tid = {
            let mut rx = inner.queue_rx.lock().await;
            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                tid = rx.recv() => match tid {
                    Some(tid) => tid,
                    None => return,
                },
            }
        };
        run_task(&inner, &tid).await;
    }
}

async fn run_task(inner: &Arc<Inner>, tid: &str) {
    // A task cancelled while pending is skipped at dequeue.
    let (task, payload) = {
        let tasks = inner.tasks.read().await;
        match tasks.get(tid) {
            Some(entry) if entry.task.state == TaskState::Pending => {
                (entry.task.clone(), entry.payload.clone())
            }
            _ => return,
        }
    };

    // Single-flight: serialize extract/summarize per (user, conv, kind).
    let flight = if matches!(task.kind, TaskKind::Extract | TaskKind::Summarize) {
        let key: FlightKey = (task.user_id.clone(), task.conversation_id.clone(), task.kind);
        let mutex = {
            let mut flights = inner.flights.lock().await;
            flights
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Some(mutex)
    } else {
        None
    };
    let guard = match &flight {
        Some(mutex) => Some(mutex.lock().await),
        None => None,
    };

    // Running only begins once the flight lock is held.
    {
        let mut tasks = inner.tasks.write().await;
        let Some(entry) = tasks.get_mut(tid) else { return };
        if entry.task.state != TaskState::Pending {
            return;
        }
        entry.task.state = TaskState::Running;
        entry.task.started_at = Some(now_iso());
    }
    let cancel = inner.shutdown.child_token();
    inner
        .running_tokens
        .lock()
        .await
        .insert(tid.to_string(), cancel.clone());

    let deadline = deadline_for(&inner.config, task.kind);
    let max_attempts = retries_for(&inner.config, task.kind).max(1);

    let mut outcome: Result<Value, MnemonError> =
        Err(MnemonError::Cancelled("never attempted".to_string()));
    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            outcome = Err(MnemonError::Cancelled("cancel requested".to_string()));
            break;
        }
        outcome = match tokio::time::timeout(
            deadline,
            inner.runner.run(&task, &payload, cancel.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MnemonError::transient(format!(
                "deadline of {deadline:?} exceeded"
            ))),
        };
        match &outcome {
            Ok(_) => break,
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                warn!(
                    task_id = tid,
                    kind = task.kind.as_str(),
                    attempt = attempt + 1,
                    error = %err,
                    "task attempt failed, retrying"
                );
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            Err(_) => break,
        }
    }

    {
        let mut tasks = inner.tasks.write().await;
        if let Some(entry) = tasks.get_mut(tid) {
            apply_outcome(entry, outcome.map_err(|e| e.to_string()));
        }
    }
    inner.running_tokens.lock().await.remove(tid);

    drop(guard);
    if let Some(mutex) = flight {
        // Drop the flight entry once nobody else holds it.
        let mut flights = inner.flights.lock().await;
        flights.retain(|_, m| !Arc::ptr_eq(m, &mutex) || Arc::strong_count(m) > 2);
    }
}

fn apply_outcome(entry: &mut TaskEntry, outcome: Result<Value, String>) {
    match outcome {
        Ok(value) => {
            entry.task.state = TaskState::Completed;
            entry.task.result = Some(value);
        }
        Err(error) => {
            entry.task.state = TaskState::Failed;
            entry.task.error = Some(error);
        }
    }
    entry.task.finished_at = Some(now_iso());
    entry.finished = Some(Instant::now());
}

fn is_terminal(state: TaskState) -> bool {
    matches!(state, TaskState::Completed | TaskState::Failed)
}

fn deadline_for(config: &TasksConfig, kind: TaskKind) -> Duration {
    let secs = match kind {
        TaskKind::ChatAssemble => config.chat_deadline_secs,
        TaskKind::Extract => config.extract_deadline_secs,
        TaskKind::Summarize => config.summarize_deadline_secs,
        TaskKind::Insights => config.insights_deadline_secs,
        TaskKind::Correct => config.correct_deadline_secs,
    };
    Duration::from_secs(secs.max(1))
}

fn retries_for(config: &TasksConfig, kind: TaskKind) -> u32 {
    match kind {
        TaskKind::ChatAssemble => 1,
        TaskKind::Extract => config.extract_retries,
        TaskKind::Summarize => config.summarize_retries,
        TaskKind::Insights => config.insights_retries,
        TaskKind::Correct => config.correct_retries,
    }
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(200)
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(Duration::from_secs(2))
}

fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
