// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable record keeper: memories, messages, conversations, summaries,
//! and insights, all partitioned by `user_id`.
//!
//! Every read and write carries the partition key and the SQL enforces it;
//! cross-user access surfaces as `NotFound`. Embeddings are stored as f32
//! little-endian BLOBs; lexical rank comes from the FTS5 index kept in sync
//! by triggers.

use mnemon_core::error::MnemonError;
use mnemon_core::types::{
    Conversation, Insight, Memory, MemoryFilter, MemoryKind, MemoryPatch, Message, Role, Summary,
    SummaryScope,
};
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

use crate::database::{map_tr_err, Database};
use crate::vector::{blob_to_vec, cosine_distance, vec_to_blob};

/// Result of a memory insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created.
    Inserted(String),
    /// A row with the same `(user_id, idempotency_key)` already existed;
    /// its id is returned and the caller may treat this as success.
    Existing(String),
}

impl InsertOutcome {
    pub fn id(&self) -> &str {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Existing(id) => id,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Current UTC timestamp in the store's ISO 8601 format.
///
/// Microsecond precision keeps `(created_at, id)` orderings stable for
/// back-to-back writes.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

const MEMORY_COLUMNS: &str = "id, user_id, conversation_id, content, type, importance, \
     confidence, bad, pinned, idempotency_key, embedding, provenance, created_at, updated_at";

/// SQLite-backed store implementing the engine's persistence contract.
#[derive(Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ---------- conversations & messages ----------

    /// Appends a message, creating the conversation lazily if absent.
    ///
    /// Returns the new message id. A conversation id already owned by a
    /// different user is `NotFound` for this caller.
    pub async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        text: &str,
    ) -> Result<String, MnemonError> {
        let user_id = user_id.to_string();
        let conv_for_err = conversation_id.to_string();
        let conversation_id = conversation_id.to_string();
        let role = role.as_str();
        let text = text.to_string();
        let message_id = format!("msg-{}", Uuid::new_v4().simple());
        let now = now_iso();

        let msg_id = message_id.clone();
        let owned = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT user_id FROM conversations WHERE id = ?1",
                        params![conversation_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match owner {
                    Some(owner) if owner != user_id => {
                        tx.commit()?;
                        return Ok(false);
                    }
                    Some(_) => {}
                    None => {
                        tx.execute(
                            "INSERT INTO conversations (id, user_id, created_at) VALUES (?1, ?2, ?3)",
                            params![conversation_id, user_id, now],
                        )?;
                    }
                }
                tx.execute(
                    "INSERT INTO messages (id, conversation_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![msg_id, conversation_id, role, text, now],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if !owned {
            return Err(MnemonError::NotFound {
                entity: "conversation",
                id: conv_for_err,
            });
        }
        Ok(message_id)
    }

    /// Fetches a conversation shell for this user.
    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, MnemonError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let conv = conn
                    .query_row(
                        "SELECT id, user_id, created_at FROM conversations
                         WHERE id = ?1 AND user_id = ?2",
                        params![conversation_id, user_id],
                        |row| {
                            Ok(Conversation {
                                id: row.get(0)?,
                                user_id: row.get(1)?,
                                created_at: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(conv)
            })
            .await
            .map_err(map_tr_err)
    }

    /// The last `k` messages of a conversation, in ascending time order.
    pub async fn recent_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        k: usize,
    ) -> Result<Vec<Message>, MnemonError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT m.id, m.conversation_id, m.role, m.content, m.created_at
                     FROM messages m
                     JOIN conversations c ON c.id = m.conversation_id
                     WHERE c.id = ?1 AND c.user_id = ?2
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT ?3",
                )?;
                let mut messages = stmt
                    .query_map(params![conversation_id, user_id, k as i64], row_to_message)?
                    .collect::<Result<Vec<_>, _>>()?;
                messages.reverse();
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetches one message by id, scoped to this user's conversations.
    pub async fn get_message(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, MnemonError> {
        let user_id = user_id.to_string();
        let message_id = message_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let message = conn
                    .query_row(
                        "SELECT m.id, m.conversation_id, m.role, m.content, m.created_at
                         FROM messages m
                         JOIN conversations c ON c.id = m.conversation_id
                         WHERE m.id = ?1 AND c.user_id = ?2",
                        params![message_id, user_id],
                        row_to_message,
                    )
                    .optional()?;
                Ok(message)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Messages of a conversation strictly after `since`, ascending.
    pub async fn messages_since(
        &self,
        user_id: &str,
        conversation_id: &str,
        since: &str,
    ) -> Result<Vec<Message>, MnemonError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let since = since.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT m.id, m.conversation_id, m.role, m.content, m.created_at
                     FROM messages m
                     JOIN conversations c ON c.id = m.conversation_id
                     WHERE c.id = ?1 AND c.user_id = ?2 AND m.created_at > ?3
                     ORDER BY m.created_at ASC, m.id ASC",
                )?;
                let messages = stmt
                    .query_map(params![conversation_id, user_id, since], row_to_message)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Deletes a conversation: messages and summaries go with it, memories
    /// are detached (their `conversation_id` becomes null).
    pub async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), MnemonError> {
        let user_id = user_id.to_string();
        let conv_for_err = conversation_id.to_string();
        let conversation_id = conversation_id.to_string();
        let deleted = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                    params![conversation_id, user_id],
                )?;
                if removed > 0 {
                    tx.execute(
                        "DELETE FROM messages WHERE conversation_id = ?1",
                        params![conversation_id],
                    )?;
                    tx.execute(
                        "DELETE FROM summaries WHERE conversation_id = ?1 AND user_id = ?2",
                        params![conversation_id, user_id],
                    )?;
                    tx.execute(
                        "UPDATE memories SET conversation_id = NULL
                         WHERE conversation_id = ?1 AND user_id = ?2",
                        params![conversation_id, user_id],
                    )?;
                }
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(map_tr_err)?;

        if deleted {
            Ok(())
        } else {
            Err(MnemonError::NotFound {
                entity: "conversation",
                id: conv_for_err,
            })
        }
    }

    // ---------- memories ----------

    /// Inserts a memory atomically. A `(user_id, idempotency_key)` collision
    /// is absorbed: the existing row's id is returned.
    pub async fn insert_memory(&self, memory: &Memory) -> Result<InsertOutcome, MnemonError> {
        let m = memory.clone();
        self.db
            .connection()
            .call(move |conn| {
                let embedding_blob = m.embedding.as_ref().map(|v| vec_to_blob(v));
                let provenance = serde_json::to_string(&m.provenance)
                    .unwrap_or_else(|_| "{}".to_string());
                let inserted = conn.execute(
                    "INSERT INTO memories (id, user_id, conversation_id, content, type, \
                     importance, confidence, bad, pinned, idempotency_key, embedding, \
                     provenance, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        m.id,
                        m.user_id,
                        m.conversation_id,
                        m.text,
                        m.kind.as_str(),
                        m.importance,
                        m.confidence,
                        m.bad as i64,
                        m.pinned as i64,
                        m.idempotency_key,
                        embedding_blob,
                        provenance,
                        m.created_at,
                        m.updated_at,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(InsertOutcome::Inserted(m.id)),
                    Err(rusqlite::Error::SqliteFailure(f, _))
                        if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        let existing: String = conn.query_row(
                            "SELECT id FROM memories
                             WHERE user_id = ?1 AND idempotency_key = ?2",
                            params![m.user_id, m.idempotency_key],
                            |row| row.get(0),
                        )?;
                        Ok(InsertOutcome::Existing(existing))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetches a memory for this user, or `None`.
    pub async fn get_memory(
        &self,
        user_id: &str,
        memory_id: &str,
    ) -> Result<Option<Memory>, MnemonError> {
        let user_id = user_id.to_string();
        let memory_id = memory_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND user_id = ?2"
                ))?;
                let memory = stmt
                    .query_row(params![memory_id, user_id], row_to_memory)
                    .optional()?;
                Ok(memory)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Applies a partial update to a memory row.
    ///
    /// A text change clears the stored embedding unless the patch also
    /// supplies a new one. `updated_at` is always bumped.
    pub async fn update_memory(
        &self,
        user_id: &str,
        memory_id: &str,
        patch: MemoryPatch,
    ) -> Result<(), MnemonError> {
        let user_id_owned = user_id.to_string();
        let memory_id_owned = memory_id.to_string();
        let now = now_iso();
        let updated = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND user_id = ?2"
                    ))?;
                    stmt.query_row(params![memory_id_owned, user_id_owned], row_to_memory)
                        .optional()?
                };
                let Some(mut m) = current else {
                    tx.commit()?;
                    return Ok(false);
                };

                if let Some(text) = patch.text {
                    if text != m.text {
                        m.embedding = None;
                    }
                    m.text = text;
                }
                if let Some(embedding) = patch.embedding {
                    m.embedding = embedding;
                }
                if let Some(bad) = patch.bad {
                    m.bad = bad;
                }
                if let Some(pinned) = patch.pinned {
                    m.pinned = pinned;
                }
                if let Some(importance) = patch.importance {
                    m.importance = importance;
                }
                if let Some(confidence) = patch.confidence {
                    m.confidence = confidence;
                }
                if let Some(provenance) = patch.provenance {
                    m.provenance = provenance;
                }

                let embedding_blob = m.embedding.as_ref().map(|v| vec_to_blob(v));
                let provenance = serde_json::to_string(&m.provenance)
                    .unwrap_or_else(|_| "{}".to_string());
                tx.execute(
                    "UPDATE memories SET content = ?1, embedding = ?2, bad = ?3, pinned = ?4, \
                     importance = ?5, confidence = ?6, provenance = ?7, updated_at = ?8
                     WHERE id = ?9 AND user_id = ?10",
                    params![
                        m.text,
                        embedding_blob,
                        m.bad as i64,
                        m.pinned as i64,
                        m.importance,
                        m.confidence,
                        provenance,
                        now,
                        memory_id_owned,
                        user_id_owned,
                    ],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)?;

        if updated {
            Ok(())
        } else {
            Err(MnemonError::NotFound {
                entity: "memory",
                id: memory_id.to_string(),
            })
        }
    }

    /// Hard-deletes a memory scoped to a user.
    pub async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<(), MnemonError> {
        let user_id_owned = user_id.to_string();
        let memory_id_owned = memory_id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM memories WHERE id = ?1 AND user_id = ?2",
                    params![memory_id_owned, user_id_owned],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)?;
        if removed {
            Ok(())
        } else {
            Err(MnemonError::NotFound {
                entity: "memory",
                id: memory_id.to_string(),
            })
        }
    }

    /// Top-k memories by cosine distance to `query`, ascending.
    ///
    /// Rows without an embedding are skipped; `bad` rows are excluded. A
    /// stored vector whose length differs from the query's is fatal.
    pub async fn vector_topk(
        &self,
        user_id: &str,
        query: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(Memory, f64)>, MnemonError> {
        if query.is_empty() {
            return Ok(vec![]);
        }
        let user_id = user_id.to_string();
        let query = query.to_vec();
        let filter = filter.clone();
        self.db
            .connection()
            .call(move |conn| {
                let (clause, extra) = filter_clause(&filter, "", 2);
                let sql = format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories
                     WHERE user_id = ?1 AND bad = 0 AND embedding IS NOT NULL{clause}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut bind: Vec<Box<dyn rusqlite::ToSql + Send>> =
                    vec![Box::new(user_id.clone())];
                bind.extend(extra);
                let rows = stmt
                    .query_map(
                        rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                        row_to_memory,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut scored = Vec::with_capacity(rows.len());
                for memory in rows {
                    let Some(embedding) = memory.embedding.as_ref() else {
                        continue;
                    };
                    if embedding.len() != query.len() {
                        return Err(tokio_rusqlite::Error::Other(
                            format!(
                                "embedding dimension mismatch for {}: stored {}, query {}",
                                memory.id,
                                embedding.len(),
                                query.len()
                            )
                            .into(),
                        ));
                    }
                    let distance = cosine_distance(&query, embedding);
                    scored.push((memory, distance));
                }
                scored.sort_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.id.cmp(&b.0.id))
                });
                scored.truncate(k);
                Ok(scored)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Top-k memories by full-text rank over tokenized text, best first.
    ///
    /// The returned rank is the negated FTS5 BM25 score, so higher is more
    /// relevant. An empty or non-alphanumeric query yields no results.
    pub async fn lexical_topk(
        &self,
        user_id: &str,
        query_text: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(Memory, f64)>, MnemonError> {
        let Some(match_query) = fts_match_query(query_text) else {
            return Ok(vec![]);
        };
        let user_id = user_id.to_string();
        let filter = filter.clone();
        self.db
            .connection()
            .call(move |conn| {
                let (clause, extra) = filter_clause(&filter, "m.", 3);
                let sql = format!(
                    "SELECT {cols}, bm25(memories_fts) AS rank
                     FROM memories_fts
                     JOIN memories m ON m.rowid = memories_fts.rowid
                     WHERE memories_fts MATCH ?1 AND m.user_id = ?2 AND m.bad = 0{clause}
                     ORDER BY bm25(memories_fts) LIMIT ?{last}",
                    cols = memory_columns_qualified("m"),
                    last = 3 + extra.len(),
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut bind: Vec<Box<dyn rusqlite::ToSql + Send>> =
                    vec![Box::new(match_query), Box::new(user_id.clone())];
                bind.extend(extra);
                bind.push(Box::new(k as i64));
                let results = stmt
                    .query_map(
                        rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                        |row| {
                            let memory = row_to_memory(row)?;
                            let bm25: f64 = row.get(14)?;
                            Ok((memory, -bm25))
                        },
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(results)
            })
            .await
            .map_err(map_tr_err)
    }

    /// The most recent `k` memories, ordered `(created_at desc, id desc)`.
    pub async fn recent_memories(
        &self,
        user_id: &str,
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<Memory>, MnemonError> {
        let user_id = user_id.to_string();
        let filter = filter.clone();
        self.db
            .connection()
            .call(move |conn| {
                let (clause, extra) = filter_clause(&filter, "", 2);
                let sql = format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories
                     WHERE user_id = ?1 AND bad = 0{clause}
                     ORDER BY created_at DESC, id DESC LIMIT ?{last}",
                    last = 2 + extra.len(),
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut bind: Vec<Box<dyn rusqlite::ToSql + Send>> =
                    vec![Box::new(user_id.clone())];
                bind.extend(extra);
                bind.push(Box::new(k as i64));
                let memories = stmt
                    .query_map(
                        rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                        row_to_memory,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Paged listing for the API layer. Excludes `bad` rows.
    pub async fn list_memories(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>, MnemonError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.map(str::to_string);
        self.db
            .connection()
            .call(move |conn| {
                let memories = match conversation_id {
                    Some(conv) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {MEMORY_COLUMNS} FROM memories
                             WHERE user_id = ?1 AND bad = 0 AND conversation_id = ?2
                             ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4"
                        ))?;
                        let rows = stmt
                            .query_map(
                                params![user_id, conv, limit as i64, offset as i64],
                                row_to_memory,
                            )?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {MEMORY_COLUMNS} FROM memories
                             WHERE user_id = ?1 AND bad = 0
                             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                        ))?;
                        let rows = stmt
                            .query_map(
                                params![user_id, limit as i64, offset as i64],
                                row_to_memory,
                            )?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(memories)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Total memory rows for a user (including `bad`).
    pub async fn count_memories(&self, user_id: &str) -> Result<i64, MnemonError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(map_tr_err)
    }

    // ---------- summaries ----------

    pub async fn get_summary(
        &self,
        user_id: &str,
        conversation_id: &str,
        scope: SummaryScope,
    ) -> Result<Option<Summary>, MnemonError> {
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let scope_str = scope.as_str();
        self.db
            .connection()
            .call(move |conn| {
                let summary = conn
                    .query_row(
                        "SELECT id, user_id, conversation_id, scope, content, citations, \
                         created_at, updated_at
                         FROM summaries
                         WHERE user_id = ?1 AND conversation_id = ?2 AND scope = ?3",
                        params![user_id, conversation_id, scope_str],
                        row_to_summary,
                    )
                    .optional()?;
                Ok(summary)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Rewrites the single summary row for `(user, conversation, scope)`.
    pub async fn upsert_summary(
        &self,
        user_id: &str,
        conversation_id: &str,
        scope: SummaryScope,
        content: &str,
        citations: &[String],
    ) -> Result<String, MnemonError> {
        let summary_id = format!("sum-{user_id}-{conversation_id}-{}", scope.as_str());
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let scope_str = scope.as_str();
        let content = content.to_string();
        let citations_json =
            serde_json::to_string(citations).unwrap_or_else(|_| "[]".to_string());
        let now = now_iso();

        let id = summary_id.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO summaries (id, user_id, conversation_id, scope, content, \
                     citations, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(user_id, conversation_id, scope) DO UPDATE SET
                         content = excluded.content,
                         citations = excluded.citations,
                         updated_at = excluded.updated_at",
                    params![id, user_id, conversation_id, scope_str, content, citations_json, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        debug!(summary_id = summary_id.as_str(), "summary upserted");
        Ok(summary_id)
    }

    // ---------- insights ----------

    pub async fn insert_insight(&self, insight: &Insight) -> Result<(), MnemonError> {
        let i = insight.clone();
        self.db
            .connection()
            .call(move |conn| {
                let supporting = serde_json::to_string(&i.supporting)
                    .unwrap_or_else(|_| "[]".to_string());
                conn.execute(
                    "INSERT INTO insights (id, user_id, content, supporting, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![i.id, i.user_id, i.content, supporting, i.created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn list_insights(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Insight>, MnemonError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, content, supporting, created_at FROM insights
                     WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
                )?;
                let insights = stmt
                    .query_map(params![user_id, limit as i64], |row| {
                        let supporting_json: String = row.get(3)?;
                        Ok(Insight {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            content: row.get(2)?,
                            supporting: serde_json::from_str(&supporting_json)
                                .unwrap_or_default(),
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(insights)
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Extra WHERE clauses for a memory filter, with their bind values.
///
/// `alias` prefixes column names (empty or `"m."`); placeholder numbering
/// starts at `start` and continues for each bound value, so the caller's
/// trailing binds (LIMIT etc.) go at `start + binds.len()`.
fn filter_clause(
    filter: &MemoryFilter,
    alias: &str,
    start: usize,
) -> (String, Vec<Box<dyn rusqlite::ToSql + Send>>) {
    let mut clause = String::new();
    let mut binds: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();
    let mut next = start;
    if let Some(conv) = &filter.conversation_id {
        clause.push_str(&format!(
            " AND ({alias}conversation_id = ?{next} OR {alias}pinned = 1)"
        ));
        binds.push(Box::new(conv.clone()));
        next += 1;
    }
    if let Some(min_confidence) = filter.min_confidence {
        clause.push_str(&format!(" AND {alias}confidence >= ?{next}"));
        binds.push(Box::new(min_confidence));
    }
    (clause, binds)
}

fn memory_columns_qualified(alias: &str) -> String {
    MEMORY_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build an FTS5 MATCH expression from free text.
///
/// Tokens are quoted so user input cannot inject FTS syntax; they are OR-ed
/// for recall (ranking keeps the best matches on top).
fn fts_match_query(raw: &str) -> Option<String> {
    let tokens: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn row_to_message(row: &rusqlite::Row) -> Result<Message, rusqlite::Error> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("invalid role: {role_str}").into(),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_memory(row: &rusqlite::Row) -> Result<Memory, rusqlite::Error> {
    let kind_str: String = row.get(4)?;
    let kind = MemoryKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("invalid memory type: {kind_str}").into(),
        )
    })?;
    let embedding_blob: Option<Vec<u8>> = row.get(10)?;
    let provenance_json: String = row.get(11)?;
    let provenance = serde_json::from_str(&provenance_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        conversation_id: row.get(2)?,
        text: row.get(3)?,
        kind,
        importance: row.get(5)?,
        confidence: row.get(6)?,
        bad: row.get::<_, i64>(7)? != 0,
        pinned: row.get::<_, i64>(8)? != 0,
        idempotency_key: row.get(9)?,
        embedding: embedding_blob.map(|b| blob_to_vec(&b)),
        provenance,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_to_summary(row: &rusqlite::Row) -> Result<Summary, rusqlite::Error> {
    let scope_str: String = row.get(3)?;
    let scope = SummaryScope::parse(&scope_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid summary scope: {scope_str}").into(),
        )
    })?;
    let citations_json: String = row.get(5)?;
    Ok(Summary {
        id: row.get(0)?,
        user_id: row.get(1)?,
        conversation_id: row.get(2)?,
        scope,
        content: row.get(4)?,
        citations: serde_json::from_str(&citations_json).unwrap_or_default(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Extension trait for optional row queries.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
