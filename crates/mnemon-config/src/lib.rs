// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the mnemon memory engine.
//!
//! Layered loading (defaults, TOML hierarchy, environment) lives in
//! [`loader`]; the typed model with per-field defaults lives in [`model`].

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::MnemonConfig;
