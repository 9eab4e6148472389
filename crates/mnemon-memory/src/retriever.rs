// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retriever fusing vector similarity, lexical rank, and recency.
//!
//! The three store queries fan out concurrently; a source that fails with a
//! transient error after retries contributes an empty set instead of
//! failing the retrieval. Fusion is a weighted sum of the normalized vector
//! and lexical scores; recency is only a tie-break ordinal. Pinned memories
//! receive a fused-score floor.

use std::collections::HashMap;
use std::sync::Arc;

use mnemon_config::model::RetrievalConfig;
use mnemon_core::error::MnemonError;
use mnemon_core::retry::{with_backoff, Backoff};
use mnemon_core::traits::EmbeddingAdapter;
use mnemon_core::types::{Memory, MemoryFilter};
use mnemon_security::sanitize;
use mnemon_storage::Store;
use tracing::{debug, warn};

/// A retrieved memory with its per-source scores and fused score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Normalized vector score (`clamp(1 - distance, 0, 1)`), 0 if absent.
    pub s_vec: f64,
    /// Normalized lexical score (`rank / max_rank` over the lexical set).
    pub s_lex: f64,
    /// Position in the recency source, if present (0 = most recent).
    pub recency_rank: Option<usize>,
    /// `w_vec * s_vec + w_lex * s_lex`, floored for pinned memories.
    pub fused: f64,
}

/// Hybrid ranker over a user's memory partition.
pub struct HybridRetriever {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingAdapter>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Retrieves up to `k_out` memories for a query under strict per-user
    /// isolation. Never returns `bad` memories.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<Vec<ScoredMemory>, MnemonError> {
        let filter = MemoryFilter {
            conversation_id: conversation_id.map(str::to_string),
            ..Default::default()
        };
        let query = sanitize(query);

        // An empty query skips vector and lexical entirely.
        if query.is_empty() {
            let recent = self
                .source_or_empty(
                    "recent",
                    self.store
                        .recent_memories(user_id, self.config.k_out, &filter)
                        .await,
                )?
                .unwrap_or_default();
            let mut scored: Vec<ScoredMemory> = recent
                .into_iter()
                .enumerate()
                .map(|(rank, memory)| {
                    let fused = if memory.pinned {
                        self.config.pinned_floor
                    } else {
                        0.0
                    };
                    ScoredMemory {
                        memory,
                        s_vec: 0.0,
                        s_lex: 0.0,
                        recency_rank: Some(rank),
                        fused,
                    }
                })
                .collect();
            sort_ranked(&mut scored);
            scored.truncate(self.config.k_out);
            return Ok(scored);
        }

        // Embed the query; on failure proceed with an empty vector set.
        let query_vec = match self.embed_query(&query).await {
            Ok(vec) => vec,
            Err(err) => {
                warn!(error = %err, "query embedding failed, continuing without vector source");
                Vec::new()
            }
        };

        // Fan out the three sources concurrently.
        let (vec_res, lex_res, rec_res) = tokio::join!(
            with_backoff("vector_topk", Backoff::default(), || {
                self.store
                    .vector_topk(user_id, &query_vec, self.config.k_vec, &filter)
            }),
            with_backoff("lexical_topk", Backoff::default(), || {
                self.store
                    .lexical_topk(user_id, &query, self.config.k_lex, &filter)
            }),
            with_backoff("recent_memories", Backoff::default(), || {
                self.store
                    .recent_memories(user_id, self.config.k_recent, &filter)
            }),
        );

        let vector_hits = self.source_or_empty("vector", vec_res)?.unwrap_or_default();
        let lexical_hits = self.source_or_empty("lexical", lex_res)?.unwrap_or_default();
        let recent_hits = self.source_or_empty("recent", rec_res)?.unwrap_or_default();

        let mut scored = fuse(
            &self.config,
            vector_hits,
            lexical_hits,
            recent_hits,
        );
        sort_ranked(&mut scored);
        scored.truncate(self.config.k_out);

        debug!(
            user_id,
            returned = scored.len(),
            "hybrid retrieval complete"
        );
        Ok(scored)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, MnemonError> {
        let query = query.to_string();
        let results = with_backoff("embed_query", Backoff::default(), || {
            self.embedder.embed(vec![query.clone()])
        })
        .await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| MnemonError::fatal("embedder returned no results"))?
    }

    /// Treat a transient source failure (post-retry) as an empty set;
    /// anything else propagates.
    fn source_or_empty<T>(
        &self,
        source: &str,
        result: Result<T, MnemonError>,
    ) -> Result<Option<T>, MnemonError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_transient() => {
                warn!(source, error = %err, "retrieval source degraded to empty");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Merge the three source sets and compute fused scores.
fn fuse(
    config: &RetrievalConfig,
    vector_hits: Vec<(Memory, f64)>,
    lexical_hits: Vec<(Memory, f64)>,
    recent_hits: Vec<Memory>,
) -> Vec<ScoredMemory> {
    struct Entry {
        memory: Memory,
        s_vec: f64,
        s_lex: f64,
        recency_rank: Option<usize>,
    }

    let mut by_id: HashMap<String, Entry> = HashMap::new();

    for (memory, distance) in vector_hits {
        let s_vec = (1.0 - distance).clamp(0.0, 1.0);
        let entry = by_id.entry(memory.id.clone()).or_insert(Entry {
            memory,
            s_vec: 0.0,
            s_lex: 0.0,
            recency_rank: None,
        });
        entry.s_vec = entry.s_vec.max(s_vec);
    }

    let max_rank = lexical_hits
        .iter()
        .map(|(_, rank)| *rank)
        .fold(0.0_f64, f64::max);
    for (memory, rank) in lexical_hits {
        let s_lex = if max_rank > 0.0 {
            (rank / max_rank).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let entry = by_id.entry(memory.id.clone()).or_insert(Entry {
            memory,
            s_vec: 0.0,
            s_lex: 0.0,
            recency_rank: None,
        });
        entry.s_lex = entry.s_lex.max(s_lex);
    }

    for (rank, memory) in recent_hits.into_iter().enumerate() {
        let entry = by_id.entry(memory.id.clone()).or_insert(Entry {
            memory,
            s_vec: 0.0,
            s_lex: 0.0,
            recency_rank: None,
        });
        entry.recency_rank = Some(match entry.recency_rank {
            Some(existing) => existing.min(rank),
            None => rank,
        });
    }

    by_id
        .into_values()
        .map(|entry| {
            let mut fused = config.w_vec * entry.s_vec + config.w_lex * entry.s_lex;
            if entry.memory.pinned {
                fused = fused.max(config.pinned_floor);
            }
            ScoredMemory {
                memory: entry.memory,
                s_vec: entry.s_vec,
                s_lex: entry.s_lex,
                recency_rank: entry.recency_rank,
                fused,
            }
        })
        .collect()
}

/// Order: fused desc, then recency rank asc (absent last), then
/// `created_at` desc, then `id` asc.
fn sort_ranked(scored: &mut [ScoredMemory]) {
    scored.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ar = a.recency_rank.unwrap_or(usize::MAX);
                let br = b.recency_rank.unwrap_or(usize::MAX);
                ar.cmp(&br)
            })
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}
