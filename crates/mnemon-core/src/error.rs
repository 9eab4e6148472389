// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the mnemon memory engine.
//!
//! Every failure in the engine maps to one of these kinds, and the kind
//! decides propagation: `Transient` is retried with bounded backoff,
//! `Conflict` is absorbed by the write path, `Unsafe` abandons the
//! operation, everything else is surfaced.

use thiserror::Error;

/// The primary error type used across all mnemon crates.
#[derive(Debug, Error)]
pub enum MnemonError {
    /// Configuration errors (invalid TOML, missing required fields, bad bounds).
    #[error("configuration error: {0}")]
    Config(String),

    /// An id does not exist for the calling user.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique-key violation on memory insert. Carries the existing row's id
    /// so callers can absorb the conflict as success.
    #[error("duplicate memory, existing id {existing_id}")]
    Conflict { existing_id: String },

    /// The validator refused the text. The operation must be abandoned and
    /// the text must not reach the completion capability.
    #[error("unsafe input in {context}: {reason}")]
    Unsafe { context: String, reason: String },

    /// Network, timeout, or 5xx-style failure from an external capability.
    /// Retried with backoff up to the per-kind cap.
    #[error("transient error: {message}")]
    Transient {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Schema, dimension mismatch, malformed persisted data, misconfiguration.
    /// Never retried.
    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Task queue full or rate limit hit. Surfaced immediately.
    #[error("overloaded: {0}")]
    Overload(String),

    /// Deadline expiry or explicit cancel.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl MnemonError {
    /// Shorthand for a transient error without an underlying source.
    pub fn transient(message: impl Into<String>) -> Self {
        MnemonError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a fatal error without an underlying source.
    pub fn fatal(message: impl Into<String>) -> Self {
        MnemonError::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a retry with backoff is permitted for this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, MnemonError::Transient { .. })
    }

    /// The existing row id if this is an absorbed-conflict error.
    pub fn conflict_id(&self) -> Option<&str> {
        match self {
            MnemonError::Conflict { existing_id } => Some(existing_id),
            _ => None,
        }
    }
}
