// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input safety for the mnemon memory engine.
//!
//! Two complementary mechanisms, applied at every boundary where untrusted
//! text enters a prompt:
//! 1. **Validation** ([`PatternValidator`]): verdict with reason and score;
//!    an unsafe verdict abandons the operation.
//! 2. **Sanitization** ([`sanitize`]): structural cleanup (control and
//!    invisible characters, whitespace, length caps) applied regardless of
//!    verdict.

pub mod sanitize;
pub mod validator;

pub use sanitize::{sanitize, sanitize_with_limit, MAX_SANITIZED_CHARS};
pub use validator::{log_security_event, PatternValidator};
