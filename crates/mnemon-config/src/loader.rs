// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mnemon.toml` > `~/.config/mnemon/mnemon.toml`
//! > `/etc/mnemon/mnemon.toml` with environment variable overrides via the
//! `MNEMON_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MnemonConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mnemon/mnemon.toml` (system-wide)
/// 3. `~/.config/mnemon/mnemon.toml` (user XDG config)
/// 4. `./mnemon.toml` (local directory)
/// 5. `MNEMON_*` environment variables
pub fn load_config() -> Result<MnemonConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemonConfig::default()))
        .merge(Toml::file("/etc/mnemon/mnemon.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mnemon/mnemon.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mnemon.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<MnemonConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemonConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemonConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemonConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so underscore-containing
/// key names stay unambiguous: `MNEMON_RETRIEVAL_PINNED_FLOOR` must map to
/// `retrieval.pinned_floor`, not `retrieval.pinned.floor`.
fn env_provider() -> Env {
    Env::prefixed("MNEMON_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("engine_", "engine.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("retrieval_", "retrieval.", 1)
            .replacen("writer_", "writer.", 1)
            .replacen("summarizer_", "summarizer.", 1)
            .replacen("insights_", "insights.", 1)
            .replacen("embedding_", "embedding.", 1)
            .replacen("tasks_", "tasks.", 1)
            .replacen("chat_", "chat.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.retrieval.k_vec, 40);
        assert_eq!(config.retrieval.k_lex, 40);
        assert_eq!(config.retrieval.k_recent, 10);
        assert_eq!(config.retrieval.k_out, 20);
        assert!((config.retrieval.w_vec - 0.6).abs() < f64::EPSILON);
        assert!((config.retrieval.w_lex - 0.4).abs() < f64::EPSILON);
        assert!((config.retrieval.pinned_floor - 0.5).abs() < f64::EPSILON);
        assert!((config.writer.min_confidence - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.summarizer.turn_interval, 8);
        assert_eq!(config.summarizer.max_chars, 2000);
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.tasks.dedup_window_secs, 30);
        assert_eq!(config.tasks.extract_retries, 3);
        assert_eq!(config.tasks.summarize_retries, 2);
        assert_eq!(config.insights.window, 100);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [retrieval]
            k_out = 5
            w_vec = 0.8

            [summarizer]
            max_chars = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k_out, 5);
        assert!((config.retrieval.w_vec - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.summarizer.max_chars, 500);
        // Untouched sections keep their defaults.
        assert_eq!(config.retrieval.k_vec, 40);
        assert_eq!(config.writer.max_candidate_chars, 1000);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let result = load_config_from_str(
            r#"
            [retrieval]
            k_out = 5
            mystery_knob = 3
            "#,
        );
        assert!(result.is_err(), "unknown keys must be rejected at load");
    }

    #[test]
    fn unknown_section_is_rejected() {
        let result = load_config_from_str("[telemetry]\nenabled = true\n");
        assert!(result.is_err());
    }
}
