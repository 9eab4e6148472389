// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic task identity.
//!
//! `task_id = hex(SHA256(kind || 0x1F || user || 0x1F || conv-or-empty ||
//! 0x1F || payload_hash))`. Duplicate submissions inside the dedup window
//! hash to the same id, so the queue treats them as one run. Truncation is
//! not permitted.

use mnemon_core::types::TaskKind;
use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: u8 = 0x1F;

/// Stable hash of a task payload.
///
/// serde_json serializes object keys in sorted order, so structurally equal
/// payloads hash identically.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(payload).unwrap_or_default();
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

/// Derives the deterministic task id.
pub fn task_id(
    kind: TaskKind,
    user_id: &str,
    conversation_id: Option<&str>,
    payload_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(user_id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(conversation_id.unwrap_or("").as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(payload_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_inputs_same_id() {
        let hash = payload_hash(&json!({"message_id": "msg-1"}));
        let a = task_id(TaskKind::Extract, "u1", Some("c1"), &hash);
        let b = task_id(TaskKind::Extract, "u1", Some("c1"), &hash);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn id_differs_by_kind_user_conv_payload() {
        let hash = payload_hash(&json!({"message_id": "msg-1"}));
        let base = task_id(TaskKind::Extract, "u1", Some("c1"), &hash);
        assert_ne!(base, task_id(TaskKind::Summarize, "u1", Some("c1"), &hash));
        assert_ne!(base, task_id(TaskKind::Extract, "u2", Some("c1"), &hash));
        assert_ne!(base, task_id(TaskKind::Extract, "u1", Some("c2"), &hash));
        assert_ne!(base, task_id(TaskKind::Extract, "u1", None, &hash));
        let other_hash = payload_hash(&json!({"message_id": "msg-2"}));
        assert_ne!(base, task_id(TaskKind::Extract, "u1", Some("c1"), &other_hash));
    }

    #[test]
    fn payload_hash_is_key_order_independent() {
        let a = payload_hash(&json!({"a": 1, "b": 2}));
        let b = payload_hash(&json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn separator_prevents_field_gluing() {
        // ("ab", "c") must not collide with ("a", "bc").
        let hash = payload_hash(&json!({}));
        let a = task_id(TaskKind::Extract, "ab", Some("c"), &hash);
        let b = task_id(TaskKind::Extract, "a", Some("bc"), &hash);
        assert_ne!(a, b);
    }
}
