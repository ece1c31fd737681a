//! Hex token codec.
//!
//! The engine surface and the request API exchange bytes as uppercase,
//! two-digit, single-space separated tokens (`"0A FF 10"`). Anything else is
//! rejected, never trimmed or repaired.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Key length in bytes.
pub const KEY_LEN: usize = 16;

/// IV length in bytes.
pub const IV_LEN: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("Invalid hex token format: {0}")]
    Format(String),

    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9A-Fa-f]{2} )*[0-9A-Fa-f]{2}$").expect("static pattern"))
}

/// Check the token shape without decoding.
pub fn is_token_string(input: &str) -> bool {
    token_pattern().is_match(input)
}

/// Encode bytes as uppercase space-separated tokens.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&hex::encode_upper([*byte]));
    }
    out
}

/// Decode space-separated tokens into bytes.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    if !is_token_string(input) {
        return Err(HexError::Format(preview(input)));
    }
    input
        .split(' ')
        .map(|token| {
            hex::decode(token)
                .map(|b| b[0])
                .map_err(|e| HexError::Format(e.to_string()))
        })
        .collect()
}

/// True when `input` is a well-formed token string, and when
/// `expected` is given, holds exactly that many tokens.
pub fn validate_length(input: &str, expected: Option<usize>) -> bool {
    if !is_token_string(input) {
        return false;
    }
    match expected {
        Some(n) => input.split(' ').count() == n,
        None => true,
    }
}

/// Decode and require an exact byte count.
pub fn decode_exact(input: &str, expected: usize) -> Result<Vec<u8>, HexError> {
    let bytes = decode_hex(input)?;
    if bytes.len() != expected {
        return Err(HexError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Split a compact hex string (`"0aff10"`) into the token form.
///
/// Odd trailing nibbles become a single-character token, which the decoder
/// then rejects.
pub fn tokens_from_compact(compact: &str) -> Result<String, HexError> {
    if compact.is_empty() || !compact.is_ascii() {
        return Err(HexError::Format(preview(compact)));
    }
    let tokens: Vec<&str> = compact
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect();
    let joined = tokens.join(" ");
    if !is_token_string(&joined) {
        return Err(HexError::Format(preview(compact)));
    }
    Ok(joined.to_ascii_uppercase())
}

fn preview(input: &str) -> String {
    const MAX: usize = 32;
    if input.chars().count() <= MAX {
        format!("{:?}", input)
    } else {
        let head: String = input.chars().take(MAX).collect();
        format!("{:?}...", head)
    }
}
