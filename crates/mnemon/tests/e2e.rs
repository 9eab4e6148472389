// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete memory engine.
//!
//! Each test builds an isolated harness with a temp SQLite database and
//! mock capabilities. Scenarios follow the engine's contract: write then
//! retrieve by semantics, idempotent re-extraction, bad-memory exclusion,
//! the pinned-score floor, summary bounds, and degraded foreground
//! operation.

use std::sync::Arc;
use std::time::Duration;

use mnemon::{MemoryKind, MnemonError, Role, SummaryScope, TaskState};
use mnemon_core::types::Memory;
use mnemon_storage::now_iso;
use mnemon_test_utils::{DenySubstringValidator, TestHarness};

fn extraction_json(items: &[(&str, &str, f64)]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|(text, kind, confidence)| {
            format!(r#"{{"text": "{text}", "type": "{kind}", "confidence": {confidence}}}"#)
        })
        .collect();
    format!("[{}]", elements.join(","))
}

/// Insert a memory directly through the store, embedded with the harness
/// embedder, the way the writer would have stored it.
async fn seed_memory(
    harness: &TestHarness,
    user_id: &str,
    text: &str,
    kind: MemoryKind,
    confidence: f64,
    pinned: bool,
) -> String {
    let id = format!("mem-{}", uuid_suffix(text));
    let now = now_iso();
    let memory = Memory {
        id: id.clone(),
        user_id: user_id.to_string(),
        conversation_id: None,
        text: text.to_string(),
        kind,
        importance: kind.default_importance(),
        confidence,
        bad: false,
        pinned,
        idempotency_key: format!("seed-{id}"),
        embedding: Some(harness.embedder.vector_for(text)),
        provenance: serde_json::Map::new(),
        created_at: now.clone(),
        updated_at: now,
    };
    harness.engine.store().insert_memory(&memory).await.unwrap();
    id
}

fn uuid_suffix(seed: &str) -> String {
    // Stable per text, unique enough for tests.
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true: {what}");
}

// ---- S1: write then retrieve by semantics ----

#[tokio::test]
async fn write_then_retrieve_by_semantics() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![
            "Nice to meet you!".to_string(),
            extraction_json(&[
                ("Loves Python", "preference", 0.9),
                ("Works as a data scientist in Berlin", "fact", 0.9),
            ]),
        ])
        .build()
        .await
        .unwrap();

    let outcome = harness
        .engine
        .assemble_and_answer(
            "u1",
            "c1",
            "I love Python and I work as a data scientist in Berlin",
        )
        .await
        .unwrap();
    assert_eq!(outcome.assistant_text, "Nice to meet you!");

    // Background extraction lands both memories.
    wait_until("two memories extracted", || async {
        harness.engine.store().count_memories("u1").await.unwrap() >= 2
    })
    .await;

    let results = harness
        .engine
        .retrieve("u1", "what does this user do for work?", None)
        .await
        .unwrap();
    assert!(!results.is_empty());
    let top = &results[0];
    assert!(
        matches!(
            top.memory.kind,
            MemoryKind::Fact | MemoryKind::Entity | MemoryKind::Relation
        ),
        "top result should be the work claim, got {:?}: {}",
        top.memory.kind,
        top.memory.text
    );
    assert!(top.memory.text.contains("data scientist"));
}

#[tokio::test]
async fn cited_ids_are_subset_of_retrieved() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![
            "Hello!".to_string(),
            extraction_json(&[("Works as a data scientist in Berlin", "fact", 0.9)]),
        ])
        .build()
        .await
        .unwrap();

    harness
        .engine
        .assemble_and_answer("u1", "c1", "I work as a data scientist in Berlin")
        .await
        .unwrap();
    wait_until("memory extracted", || async {
        harness.engine.store().count_memories("u1").await.unwrap() >= 1
    })
    .await;

    let memory_id = harness
        .engine
        .list_memories("u1", None, 10, 0)
        .await
        .unwrap()[0]
        .id
        .clone();

    // The responder cites one real retrieved memory and one invented id;
    // only the real one survives.
    harness
        .completion
        .add_response(format!(
            "You do data science [[{memory_id}]] and ride dragons [[mem-invented]]."
        ))
        .await;
    let outcome = harness
        .engine
        .assemble_and_answer("u1", "c1", "remind me what my data scientist work is?")
        .await
        .unwrap();
    assert_eq!(outcome.cited_memory_ids, vec![memory_id]);
}

// ---- S2: idempotent re-extraction ----

#[tokio::test]
async fn re_extraction_is_idempotent() {
    let harness = TestHarness::builder()
        .configure(|config| config.tasks.dedup_window_secs = 0)
        .with_mock_responses(vec![
            extraction_json(&[
                ("Loves Python", "preference", 0.9),
                ("Lives in Berlin", "fact", 0.9),
            ]),
            extraction_json(&[
                ("Loves Python", "preference", 0.9),
                ("Lives in Berlin", "fact", 0.9),
            ]),
        ])
        .build()
        .await
        .unwrap();

    let message_id = harness
        .engine
        .store()
        .append_message("u1", "c1", Role::User, "I love Python and live in Berlin")
        .await
        .unwrap();

    let first = harness
        .engine
        .submit_extract("u1", "c1", &message_id)
        .await
        .unwrap();
    let first_task = harness.wait_task(&first).await;
    assert_eq!(first_task.state, TaskState::Completed);
    let count_after_first = harness.engine.store().count_memories("u1").await.unwrap();

    let second = harness
        .engine
        .submit_extract("u1", "c1", &message_id)
        .await
        .unwrap();
    let second_task = harness.wait_task(&second).await;
    assert_eq!(second_task.state, TaskState::Completed);

    let count_after_second = harness.engine.store().count_memories("u1").await.unwrap();
    assert_eq!(count_after_first, count_after_second);
    // The second run absorbed both candidates as conflicts.
    assert_eq!(second_task.result.unwrap()["created"], 0);
}

#[tokio::test]
async fn parallel_extract_submissions_coalesce() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![extraction_json(&[("Loves Python", "preference", 0.9)])])
        .build()
        .await
        .unwrap();

    let message_id = harness
        .engine
        .store()
        .append_message("u1", "c1", Role::User, "I love Python")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        harness.engine.submit_extract("u1", "c1", &message_id),
        harness.engine.submit_extract("u1", "c1", &message_id),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b, "duplicate submissions share one task id");

    let task = harness.wait_task(&a).await;
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(harness.engine.store().count_memories("u1").await.unwrap(), 1);
}

// ---- S3: bad memory hidden ----

#[tokio::test]
async fn marked_bad_memory_never_retrieved() {
    let harness = TestHarness::builder().build().await.unwrap();

    let hated = seed_memory(
        &harness,
        "u2",
        "I hate mornings",
        MemoryKind::Preference,
        0.9,
        false,
    )
    .await;
    seed_memory(&harness, "u2", "I live in Tokyo", MemoryKind::Fact, 0.9, false).await;

    // Sanity: before mark_bad it is retrievable.
    let before = harness
        .engine
        .retrieve("u2", "mornings", None)
        .await
        .unwrap();
    assert!(before.iter().any(|s| s.memory.id == hated));

    harness.engine.mark_bad("u2", &hated).await.unwrap();

    let after = harness
        .engine
        .retrieve("u2", "when does this user prefer meetings in the mornings?", None)
        .await
        .unwrap();
    assert!(
        after.iter().all(|s| s.memory.id != hated),
        "bad memory must not appear at any fused score"
    );
}

// ---- S4: pin floor ----

#[tokio::test]
async fn pinned_memory_receives_score_floor() {
    let harness = TestHarness::builder().build().await.unwrap();

    let pinned = seed_memory(
        &harness,
        "u3",
        "allergic to peanuts",
        MemoryKind::Fact,
        0.95,
        true,
    )
    .await;

    // No lexical or meaningful vector overlap with the query.
    let results = harness
        .engine
        .retrieve("u3", "recommend a dessert", None)
        .await
        .unwrap();
    let hit = results
        .iter()
        .find(|s| s.memory.id == pinned)
        .expect("pinned memory must appear");
    assert!(
        hit.fused >= 0.5,
        "pinned fused score {} below the floor",
        hit.fused
    );
}

// ---- S5: summary bound and citations ----

#[tokio::test]
async fn summary_is_bounded_and_citations_resolve() {
    let harness = TestHarness::builder().build().await.unwrap();

    let real = seed_memory(
        &harness,
        "u4",
        "works on compilers",
        MemoryKind::Fact,
        0.9,
        false,
    )
    .await;

    for i in 0..20 {
        harness
            .engine
            .store()
            .append_message("u4", "c4", Role::User, &format!("turn number {i}"))
            .await
            .unwrap();
    }
    let last_message_at = harness
        .engine
        .store()
        .recent_messages("u4", "c4", 1)
        .await
        .unwrap()[0]
        .created_at
        .clone();

    // The model overruns the bound and cites one real, one bogus id.
    let oversized = format!(
        "User works on compilers [[{real}]] and unknown things [[mem-bogus]]. {}",
        "padding ".repeat(500)
    );
    harness.completion.add_response(oversized).await;

    let task_id = harness.engine.submit_summarize("u4", "c4").await.unwrap();
    let task = harness.wait_task(&task_id).await;
    assert_eq!(task.state, TaskState::Completed);

    let summary = harness
        .engine
        .store()
        .get_summary("u4", "c4", SummaryScope::Rolling)
        .await
        .unwrap()
        .expect("rolling summary exists");
    assert!(summary.content.chars().count() <= 2000);
    assert_eq!(summary.citations, vec![real]);
    assert!(
        summary.updated_at > last_message_at,
        "summary updated_at must postdate the folded messages"
    );
}

#[tokio::test]
async fn failed_summarize_leaves_prior_summary() {
    let harness = TestHarness::builder()
        .configure(|config| {
            config.tasks.summarize_retries = 1;
            config.tasks.dedup_window_secs = 0;
        })
        .build()
        .await
        .unwrap();

    harness
        .engine
        .store()
        .append_message("u4", "c4", Role::User, "first window")
        .await
        .unwrap();
    harness.completion.add_response("summary v1").await;
    let first = harness.engine.submit_summarize("u4", "c4").await.unwrap();
    assert_eq!(harness.wait_task(&first).await.state, TaskState::Completed);

    harness
        .engine
        .store()
        .append_message("u4", "c4", Role::User, "second window")
        .await
        .unwrap();
    harness.completion.fail_next(10);
    let second = harness.engine.submit_summarize("u4", "c4").await.unwrap();
    assert_eq!(harness.wait_task(&second).await.state, TaskState::Failed);
    harness.completion.fail_next(0);

    let summary = harness
        .engine
        .store()
        .get_summary("u4", "c4", SummaryScope::Rolling)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.content, "summary v1");
}

// ---- S6: degraded foreground ----

#[tokio::test]
async fn degraded_embedder_still_answers_and_extracts() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![
            "Answer without memory context".to_string(),
            extraction_json(&[("Mentioned anything", "fact", 0.9)]),
        ])
        .build()
        .await
        .unwrap();

    // Query embedding fails through the whole retry budget; the later
    // extraction embeds succeed once the injected failures are consumed.
    harness.embedder.fail_next(3);

    let outcome = harness
        .engine
        .assemble_and_answer("u5", "c5", "anything")
        .await
        .unwrap();
    assert_eq!(outcome.assistant_text, "Answer without memory context");
    assert!(outcome.cited_memory_ids.is_empty());

    wait_until("extraction still ran", || async {
        harness.engine.store().count_memories("u5").await.unwrap() >= 1
    })
    .await;
}

// ---- universal invariants ----

#[tokio::test]
async fn user_isolation_across_all_reads() {
    let harness = TestHarness::builder().build().await.unwrap();
    seed_memory(&harness, "u1", "private fact about work", MemoryKind::Fact, 0.9, false).await;

    assert!(harness
        .engine
        .retrieve("u2", "work", None)
        .await
        .unwrap()
        .is_empty());
    assert!(harness
        .engine
        .list_memories("u2", None, 10, 0)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn retrieval_output_is_bounded() {
    let harness = TestHarness::builder()
        .configure(|config| config.retrieval.k_out = 3)
        .build()
        .await
        .unwrap();

    for i in 0..10 {
        seed_memory(
            &harness,
            "u1",
            &format!("fact number {i} about work"),
            MemoryKind::Fact,
            0.9,
            false,
        )
        .await;
    }
    let results = harness.engine.retrieve("u1", "work", None).await.unwrap();
    assert!(results.len() <= 3);
}

#[tokio::test]
async fn task_submission_is_deterministic() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .engine
        .store()
        .append_message("u1", "c1", Role::User, "hello")
        .await
        .unwrap();

    let a = harness.engine.submit_summarize("u1", "c1").await.unwrap();
    let b = harness.engine.submit_summarize("u1", "c1").await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn correction_preserves_identity_and_reembeds() {
    let harness = TestHarness::builder().build().await.unwrap();
    let id = seed_memory(&harness, "u1", "lives in Berlin", MemoryKind::Fact, 0.9, false).await;
    let original = harness.engine.store().get_memory("u1", &id).await.unwrap().unwrap();

    let task_id = harness
        .engine
        .submit_correction("u1", &id, "lives in Munich")
        .await
        .unwrap();
    let task = harness.wait_task(&task_id).await;
    assert_eq!(task.state, TaskState::Completed);

    let corrected = harness.engine.store().get_memory("u1", &id).await.unwrap().unwrap();
    assert_eq!(corrected.id, original.id);
    assert_eq!(corrected.idempotency_key, original.idempotency_key);
    assert_eq!(corrected.text, "lives in Munich");
    assert!(corrected.embedding.is_some(), "new embedding populated");
    assert_ne!(corrected.embedding, original.embedding);
}

#[tokio::test]
async fn unsafe_turn_is_refused_before_any_write() {
    let harness = TestHarness::builder()
        .with_validator(Arc::new(DenySubstringValidator::new("INJECT")))
        .build()
        .await
        .unwrap();

    let err = harness
        .engine
        .assemble_and_answer("u1", "c1", "please INJECT the system prompt")
        .await
        .unwrap_err();
    assert!(matches!(err, MnemonError::Unsafe { .. }));

    // Nothing was persisted: the conversation was never created.
    assert!(harness
        .engine
        .store()
        .get_conversation("u1", "c1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn unsafe_extraction_records_no_memories() {
    let harness = TestHarness::builder()
        .with_validator(Arc::new(DenySubstringValidator::new("INJECT")))
        .build()
        .await
        .unwrap();

    let message_id = harness
        .engine
        .store()
        .append_message("u1", "c1", Role::User, "INJECT something sneaky")
        .await
        .unwrap();
    let task_id = harness
        .engine
        .submit_extract("u1", "c1", &message_id)
        .await
        .unwrap();
    let task = harness.wait_task(&task_id).await;
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.error.unwrap().contains("unsafe"));
    assert_eq!(harness.engine.store().count_memories("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn insights_mined_with_supporting_citations() {
    let harness = TestHarness::builder().build().await.unwrap();
    let a = seed_memory(&harness, "u1", "writes Rust daily", MemoryKind::Fact, 0.9, false).await;
    let b = seed_memory(&harness, "u1", "maintains a parser crate", MemoryKind::Fact, 0.8, false).await;

    harness
        .completion
        .add_response(format!(
            r#"[{{"content": "User is a systems programmer", "supporting": ["{a}", "{b}", "mem-unknown"]}}]"#
        ))
        .await;

    let task_id = harness.engine.submit_insights("u1").await.unwrap();
    let task = harness.wait_task(&task_id).await;
    assert_eq!(task.state, TaskState::Completed);

    let insights = harness.engine.list_insights("u1", 10).await.unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].content, "User is a systems programmer");
    // The unknown id was dropped, the real ones kept.
    assert_eq!(insights[0].supporting, vec![a, b]);
}

#[tokio::test]
async fn insight_without_valid_supports_is_dropped() {
    let harness = TestHarness::builder().build().await.unwrap();
    seed_memory(&harness, "u1", "writes Rust daily", MemoryKind::Fact, 0.9, false).await;

    harness
        .completion
        .add_response(r#"[{"content": "Baseless claim", "supporting": ["mem-invented"]}]"#.to_string())
        .await;

    let task_id = harness.engine.submit_insights("u1").await.unwrap();
    harness.wait_task(&task_id).await;
    assert!(harness.engine.list_insights("u1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn low_confidence_candidates_are_dropped() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![extraction_json(&[
            ("Solid fact", "fact", 0.9),
            ("Wild guess", "fact", 0.3),
        ])])
        .build()
        .await
        .unwrap();

    let message_id = harness
        .engine
        .store()
        .append_message("u1", "c1", Role::User, "some chatter")
        .await
        .unwrap();
    let task_id = harness
        .engine
        .submit_extract("u1", "c1", &message_id)
        .await
        .unwrap();
    harness.wait_task(&task_id).await;

    let memories = harness.engine.list_memories("u1", None, 10, 0).await.unwrap();
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].text, "Solid fact");
}

#[tokio::test]
async fn empty_query_returns_recent_memories() {
    let harness = TestHarness::builder().build().await.unwrap();
    for i in 0..5 {
        seed_memory(
            &harness,
            "u1",
            &format!("recent item {i}"),
            MemoryKind::Fact,
            0.9,
            false,
        )
        .await;
    }

    let results = harness.engine.retrieve("u1", "   ", None).await.unwrap();
    assert!(!results.is_empty());
    // Most recent first via the recency tie-break.
    assert_eq!(results[0].memory.text, "recent item 4");
}

#[tokio::test]
async fn conversation_scoped_retrieval_keeps_pinned() {
    let harness = TestHarness::builder().build().await.unwrap();

    let mut scoped = Memory {
        id: "mem-scoped".into(),
        user_id: "u1".into(),
        conversation_id: Some("c1".into()),
        text: "talked about work deadlines".into(),
        kind: MemoryKind::Fact,
        importance: 0.6,
        confidence: 0.9,
        bad: false,
        pinned: false,
        idempotency_key: "k1".into(),
        embedding: Some(harness.embedder.vector_for("talked about work deadlines")),
        provenance: serde_json::Map::new(),
        created_at: now_iso(),
        updated_at: now_iso(),
    };
    harness.engine.store().insert_memory(&scoped).await.unwrap();

    scoped.id = "mem-other".into();
    scoped.conversation_id = Some("c2".into());
    scoped.idempotency_key = "k2".into();
    scoped.text = "work chat elsewhere".into();
    harness.engine.store().insert_memory(&scoped).await.unwrap();

    scoped.id = "mem-pinned".into();
    scoped.conversation_id = None;
    scoped.idempotency_key = "k3".into();
    scoped.text = "always relevant work note".into();
    scoped.pinned = true;
    harness.engine.store().insert_memory(&scoped).await.unwrap();

    let results = harness
        .engine
        .retrieve("u1", "work", Some("c1"))
        .await
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|s| s.memory.id.as_str()).collect();
    assert!(ids.contains(&"mem-scoped"));
    assert!(ids.contains(&"mem-pinned"));
    assert!(!ids.contains(&"mem-other"));
}

#[tokio::test]
async fn chat_turn_persists_both_messages() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["Persisted response".to_string()])
        .build()
        .await
        .unwrap();

    harness
        .engine
        .assemble_and_answer("u1", "c1", "Test persistence")
        .await
        .unwrap();

    let messages = harness
        .engine
        .store()
        .recent_messages("u1", "c1", 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].text, "Test persistence");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].text, "Persisted response");
}

#[tokio::test]
async fn chat_assemble_status_is_observable() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["Observable".to_string()])
        .build()
        .await
        .unwrap();

    let outcome = harness
        .engine
        .assemble_and_answer("u1", "c1", "status check")
        .await
        .unwrap();

    // The inline chat_assemble task is terminal and carries the result.
    let payload = serde_json::json!({"user_text": "status check"});
    let tid = mnemon_tasks::task_id(
        mnemon::TaskKind::ChatAssemble,
        "u1",
        Some("c1"),
        &mnemon_tasks::payload_hash(&payload),
    );
    let task = harness.engine.status(&tid).await.expect("task recorded");
    assert_eq!(task.state, TaskState::Completed);
    let result = task.result.unwrap();
    assert_eq!(result["assistant_text"], "Observable");
    assert_eq!(
        result["assistant_message_id"],
        outcome.assistant_message_id.as_str()
    );
}
