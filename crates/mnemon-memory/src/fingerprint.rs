// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory fingerprints: stable idempotency keys over normalized text.
//!
//! The fingerprint format is part of the storage contract; changing the
//! normalization rules requires a schema-version bump because existing rows
//! become incompatible.

use mnemon_core::types::MemoryKind;
use sha2::{Digest, Sha256};

/// Separator byte between the hashed fields.
const FIELD_SEPARATOR: u8 = 0x1F;

/// Normalizes memory text for fingerprinting: lowercase, whitespace runs
/// collapsed to single spaces, trailing punctuation stripped.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['.', ',', ';', ':', '!', '?'])
        .to_string()
}

/// Computes the idempotency key:
/// `hex(SHA256(utf8(normalized_text) || 0x1F || utf8(type)))`.
pub fn fingerprint(text: &str, kind: MemoryKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(kind.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_collapses() {
        assert_eq!(normalize("  I Love   Python  "), "i love python");
        assert_eq!(normalize("Lives\tin\nBerlin"), "lives in berlin");
    }

    #[test]
    fn normalize_strips_trailing_punctuation() {
        assert_eq!(normalize("Works in Berlin."), "works in berlin");
        assert_eq!(normalize("Really?!"), "really");
        // Interior punctuation is preserved.
        assert_eq!(normalize("a.b.c"), "a.b.c");
    }

    #[test]
    fn fingerprint_is_stable_under_normalization() {
        let a = fingerprint("I love Python.", MemoryKind::Preference);
        let b = fingerprint("  i LOVE   python  ", MemoryKind::Preference);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_kind() {
        let a = fingerprint("lives in Berlin", MemoryKind::Fact);
        let b = fingerprint("lives in Berlin", MemoryKind::Entity);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_text() {
        let a = fingerprint("lives in Berlin", MemoryKind::Fact);
        let b = fingerprint("lives in Munich", MemoryKind::Fact);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_full_sha256_hex() {
        let fp = fingerprint("anything", MemoryKind::Fact);
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
