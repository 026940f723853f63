// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reasoning tag extraction
//!
//! Different model families wrap chain-of-thought output in different
//! tag dialects: `<think>` (DeepSeek R1, Qwen3), `<seed:think>`,
//! `<reasoning>`, and `<|START_THINKING|>…<|END_THINKING|>`. Everything
//! here normalizes to canonical `<think>` tags, optionally carrying a
//! `duration="X.Y"` attribute recorded at generation time.
//!
//! Only a *leading* tag marks reasoning; a `<think>` appearing mid-text
//! is ordinary content.

use std::sync::OnceLock;

use regex::Regex;

/// Result of parsing a complete response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedThinking {
    /// Extracted reasoning text, trimmed; `None` when no leading tag
    pub thinking: Option<String>,
    /// Text after the reasoning block (the whole input when no tag)
    pub content: String,
    /// Duration attribute from the opening tag, if present
    pub duration_seconds: Option<f64>,
}

/// Result of parsing a still-arriving response
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingThinking {
    /// Reasoning text seen so far, trimmed
    pub thinking: Option<String>,
    /// Content after the reasoning block; empty while thinking is open
    pub content: String,
    /// False while an opened tag has not yet been closed
    pub is_thinking_complete: bool,
}

fn open_alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<seed:think>|<reasoning>|<\|START_THINKING\|>").unwrap())
}

fn close_alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</seed:think>|</reasoning>|<\|END_THINKING\|>").unwrap())
}

/// Matches a leading canonical open tag, capturing an optional duration
fn leading_open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^<think(?:\s+duration="([0-9]+(?:\.[0-9]+)?)")?\s*>"#).unwrap()
    })
}

fn close_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</think>").unwrap())
}

fn leading_dialect_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:<think[\s>]|<seed:think>|<reasoning>|<\|START_THINKING\|>)")
            .unwrap()
    })
}

/// Rewrite known reasoning tag dialects to canonical `<think>` tags.
///
/// Case-insensitive and idempotent; canonical tags pass through
/// unchanged.
pub fn normalize_thinking_tags(text: &str) -> String {
    let text = open_alias_regex().replace_all(text, "<think>");
    close_alias_regex().replace_all(&text, "</think>").into_owned()
}

/// Fast predicate: does the text begin with a reasoning tag in any
/// accepted dialect?
pub fn has_thinking_content(text: &str) -> bool {
    leading_dialect_regex().is_match(text)
}

/// Parse a complete response into reasoning and content.
///
/// An unterminated leading tag consumes the remainder as reasoning with
/// empty content; streaming callers should prefer
/// [`parse_streaming_thinking_content`], which reports completeness.
pub fn parse_thinking_content(text: &str) -> ParsedThinking {
    let normalized = normalize_thinking_tags(text);
    let trimmed = normalized.trim_start();

    let Some(open) = leading_open_regex().captures(trimmed) else {
        return ParsedThinking {
            thinking: None,
            content: text.to_string(),
            duration_seconds: None,
        };
    };

    let duration_seconds = open
        .get(1)
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let after_open = &trimmed[open.get(0).unwrap().end()..];

    match close_tag_regex().find(after_open) {
        Some(close) => {
            let thinking = after_open[..close.start()].trim().to_string();
            let remainder = &after_open[close.end()..];
            // embed_thinking_content joins with a blank line; anything
            // else gets its leading whitespace dropped.
            let content = remainder
                .strip_prefix("\n\n")
                .map(str::to_string)
                .unwrap_or_else(|| remainder.trim_start().to_string());
            ParsedThinking {
                thinking: Some(thinking),
                content,
                duration_seconds,
            }
        }
        None => ParsedThinking {
            thinking: Some(after_open.trim().to_string()),
            content: String::new(),
            duration_seconds,
        },
    }
}

/// Is the text (so far) an incomplete prefix of a leading open tag?
///
/// While a tag is still arriving byte by byte it must not be shown as
/// content; the next delta resolves it either way.
fn is_partial_leading_open(text: &str) -> bool {
    if text.is_empty() || !text.starts_with('<') {
        return false;
    }
    let lower = text.to_lowercase();
    const OPENERS: [&str; 4] = ["<think>", "<seed:think>", "<reasoning>", "<|start_thinking|>"];
    if OPENERS.iter().any(|opener| opener.starts_with(&lower)) {
        return true;
    }
    // An attribute-carrying open tag is incomplete until its '>' arrives
    lower.starts_with("<think") && !lower.contains('>')
}

/// Parse a partially-received response.
///
/// An opened-but-unclosed tag reports `is_thinking_complete = false`
/// with the reasoning seen so far and empty content; once the close tag
/// arrives this behaves like [`parse_thinking_content`]. A leading open
/// tag that has not finished arriving is likewise held back rather than
/// flashed as visible content.
pub fn parse_streaming_thinking_content(text: &str) -> StreamingThinking {
    let normalized = normalize_thinking_tags(text);
    let trimmed = normalized.trim_start();

    let Some(open) = leading_open_regex().captures(trimmed) else {
        if is_partial_leading_open(trimmed) {
            return StreamingThinking {
                thinking: None,
                content: String::new(),
                is_thinking_complete: false,
            };
        }
        return StreamingThinking {
            thinking: None,
            content: text.to_string(),
            is_thinking_complete: true,
        };
    };

    let after_open = &trimmed[open.get(0).unwrap().end()..];

    match close_tag_regex().find(after_open) {
        Some(close) => {
            let remainder = &after_open[close.end()..];
            StreamingThinking {
                thinking: Some(after_open[..close.start()].trim().to_string()),
                content: remainder
                    .strip_prefix("\n\n")
                    .map(str::to_string)
                    .unwrap_or_else(|| remainder.trim_start().to_string()),
                is_thinking_complete: true,
            }
        }
        None => StreamingThinking {
            thinking: Some(after_open.trim().to_string()),
            content: String::new(),
            is_thinking_complete: false,
        },
    }
}

/// Wrap reasoning in canonical `<think>` tags and concatenate with
/// content. The inverse of [`parse_thinking_content`].
///
/// A finite duration is recorded to one decimal place; empty reasoning
/// yields the content unchanged.
pub fn embed_thinking_content(thinking: &str, content: &str, duration: Option<f64>) -> String {
    let thinking = thinking.trim();
    if thinking.is_empty() {
        return content.to_string();
    }

    let mut out = match duration {
        Some(d) if d.is_finite() => format!("<think duration=\"{d:.1}\">\n"),
        _ => "<think>\n".to_string(),
    };
    out.push_str(thinking);
    out.push_str("\n</think>");

    if !content.is_empty() {
        out.push_str("\n\n");
        out.push_str(content);
    }
    out
}
