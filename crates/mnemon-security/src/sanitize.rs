// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structural sanitization applied regardless of the validator verdict.
//!
//! Strips control and invisible characters, normalizes whitespace runs, and
//! enforces a length cap. JSON-safe escaping is handled by serde at
//! serialization time; this pass only removes what should never reach a
//! prompt in any form.

/// Default cap applied by [`sanitize`].
pub const MAX_SANITIZED_CHARS: usize = 10_000;

/// Sanitize untrusted text with the default length cap.
pub fn sanitize(text: &str) -> String {
    sanitize_with_limit(text, MAX_SANITIZED_CHARS)
}

/// Sanitize untrusted text, capping the result at `max_chars` characters.
pub fn sanitize_with_limit(text: &str, max_chars: usize) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !is_stripped_char(*c))
        .map(|c| if c == '\t' { ' ' } else { c })
        .collect();

    // Collapse horizontal whitespace runs; keep newlines as-is.
    let mut out = String::with_capacity(cleaned.len());
    let mut prev_space = false;
    for c in cleaned.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }

    let trimmed = out.trim();
    trimmed.chars().take(max_chars).collect()
}

/// Characters removed outright: C0/C1 controls (except newline), DEL,
/// zero-width characters, and bidirectional override markers.
fn is_stripped_char(c: char) -> bool {
    // Newlines survive; tabs are mapped to spaces afterwards.
    if c == '\n' || c == '\t' {
        return false;
    }
    c.is_control()
        || matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
        || matches!(c, '\u{202A}'..='\u{202E}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let input = "hello\x00\x01 world\x7f";
        assert_eq!(sanitize(input), "hello world");
    }

    #[test]
    fn keeps_newlines() {
        let input = "line one\nline two";
        assert_eq!(sanitize(input), "line one\nline two");
    }

    #[test]
    fn strips_zero_width_and_bidi() {
        let input = "pay\u{200B}load \u{202E}reversed";
        assert_eq!(sanitize(input), "payload reversed");
    }

    #[test]
    fn collapses_spaces_and_tabs() {
        let input = "a  \t  b";
        assert_eq!(sanitize(input), "a b");
    }

    #[test]
    fn trims_and_caps_length() {
        let input = format!("  {}  ", "x".repeat(50));
        assert_eq!(sanitize_with_limit(&input, 10), "x".repeat(10));
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(sanitize("   "), "");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn cap_respects_char_boundaries() {
        let input = "héllo wörld";
        let capped = sanitize_with_limit(input, 4);
        assert_eq!(capped, "héll");
    }
}
