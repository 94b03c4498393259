//! Validation rules applied to inbound messages

use chatgate_core::{Error, Result};
use regex::Regex;
use std::fmt::Debug;

/// Default allow-list: letters, digits, whitespace and common punctuation.
///
/// Markup and script delimiters (`<`, `>`, backtick, braces, brackets,
/// backslash) are not in the set.
pub const DEFAULT_ALLOWED_PATTERN: &str = r#"[\p{L}\p{N}\s.,!?'"\-:;()&%$#@/+*=]+"#;

/// Outcome of a single rule or a whole chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the text was accepted
    pub passed: bool,

    /// Human-readable rejection reason, empty when passed
    pub reason: String,
}

impl Verdict {
    /// Accept the text
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: String::new(),
        }
    }

    /// Reject the text with a reason reported to the sender
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }

    /// Split into the `(passed, reason)` pair
    pub fn into_parts(self) -> (bool, String) {
        (self.passed, self.reason)
    }
}

/// A single predicate over inbound text.
///
/// Rules are immutable once built and carry no per-call state, so one chain
/// is shared read-only by every connection.
pub trait ValidationRule: Send + Sync + Debug {
    /// Rule name (for logging/debugging)
    fn name(&self) -> &str;

    /// Check the text
    fn validate(&self, text: &str) -> Verdict;
}

/// Rejects text longer than a configured number of characters
#[derive(Debug, Clone)]
pub struct LengthRule {
    max_length: usize,
}

impl LengthRule {
    /// `max_length` counts Unicode scalar values, not bytes
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl ValidationRule for LengthRule {
    fn name(&self) -> &str {
        "length"
    }

    fn validate(&self, text: &str) -> Verdict {
        // Byte length is an upper bound on char count; skip the scan when it fits.
        if text.len() <= self.max_length || text.chars().count() <= self.max_length {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "Message size exceeds the maximum of {} characters",
                self.max_length
            ))
        }
    }
}

/// Accepts text only if the whole of it matches an allow-list pattern
#[derive(Debug, Clone)]
pub struct PatternRule {
    pattern: Regex,
}

impl PatternRule {
    /// Compile the pattern wrapped as `^(?:...)$`: the whole message must
    /// match, a matching prefix is not enough.
    pub fn new(allowed_pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})$", allowed_pattern);
        let pattern = Regex::new(&anchored).map_err(|e| {
            Error::config(format!("Invalid allow-list pattern {:?}: {}", allowed_pattern, e))
        })?;
        Ok(Self { pattern })
    }

    /// The anchored expression actually evaluated
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for PatternRule {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_PATTERN).expect("default allow-list pattern compiles")
    }
}

impl ValidationRule for PatternRule {
    fn name(&self) -> &str {
        "pattern"
    }

    fn validate(&self, text: &str) -> Verdict {
        if self.pattern.is_match(text) {
            Verdict::pass()
        } else {
            Verdict::fail("Invalid message format")
        }
    }
}

/// Escapes the text for HTML and rejects it if escaping hits an anomaly.
///
/// Any control character other than tab, newline and carriage return is
/// treated as an encoding anomaly. Plain text never trips this rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeRule;

impl EscapeRule {
    pub fn new() -> Self {
        Self
    }
}

impl ValidationRule for EscapeRule {
    fn name(&self) -> &str {
        "escape"
    }

    fn validate(&self, text: &str) -> Verdict {
        match escape_html(text) {
            Ok(_) => Verdict::pass(),
            Err(offending) => {
                tracing::debug!(codepoint = offending as u32, "escape rule rejected control character");
                Verdict::fail("Input message looks malicious")
            }
        }
    }
}

/// HTML-escape `text`, failing with the first anomalous character
pub fn escape_html(text: &str) -> std::result::Result<String, char> {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '\t' | '\n' | '\r' => escaped.push(c),
            c if c.is_control() => return Err(c),
            c => escaped.push(c),
        }
    }
    Ok(escaped)
}
