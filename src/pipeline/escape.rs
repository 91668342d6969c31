//! Validation of user text and tokens that end up inside a filter graph.
//!
//! Filter graphs have two levels of syntax (graph separators `,;[]` and
//! option separators `:=`), plus quoting with `'` and `\`. Rather than
//! escaping through both levels, text is restricted to characters that
//! carry no meaning at either level and is then single-quoted.

use super::error::ValidationError;

pub const MAX_OVERLAY_TEXT_CHARS: usize = 200;
const MAX_COLOR_NAME_LEN: usize = 32;

/// Punctuation accepted in overlay text besides letters, digits and space.
const TEXT_PUNCTUATION: &[char] = &['.', '!', '?', '-', '_', '(', ')', '&', '#', '@', '+', '*', '/'];

/// Overlay text that has passed the filter-safe character check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterText(String);

impl FilterText {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let text = raw.trim();
        let len = text.chars().count();
        if len == 0 || len > MAX_OVERLAY_TEXT_CHARS {
            return Err(ValidationError::OverlayTextLength {
                max: MAX_OVERLAY_TEXT_CHARS,
            });
        }

        if !text.chars().all(is_safe_text_char) {
            return Err(ValidationError::UnsafeOverlayText);
        }

        Ok(Self(text.to_string()))
    }

    /// Single-quoted form for use as a filter option value
    pub fn quoted(&self) -> String {
        format!("'{}'", self.0)
    }
}

fn is_safe_text_char(c: char) -> bool {
    c == ' ' || c.is_alphanumeric() || TEXT_PUNCTUATION.contains(&c)
}

/// A color accepted by the engine's color parser: a plain name such as
/// `white`, or `#RRGGBB[AA]` / `0xRRGGBB[AA]`, optionally followed by
/// `@alpha` with alpha in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorToken(String);

impl ColorToken {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let token = raw.trim();
        let invalid = || ValidationError::InvalidColor(token.to_string());

        let (base, alpha) = match token.split_once('@') {
            Some((base, alpha)) => (base, Some(alpha)),
            None => (token, None),
        };

        let base_ok = if let Some(hex) = base.strip_prefix('#').or_else(|| base.strip_prefix("0x")) {
            (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        } else {
            !base.is_empty()
                && base.len() <= MAX_COLOR_NAME_LEN
                && base.chars().all(|c| c.is_ascii_alphabetic())
        };
        if !base_ok {
            return Err(invalid());
        }

        if let Some(alpha) = alpha {
            let digits_ok = !alpha.is_empty() && alpha.chars().all(|c| c.is_ascii_digit() || c == '.');
            match alpha.parse::<f64>() {
                Ok(value) if digits_ok && (0.0..=1.0).contains(&value) => {}
                _ => return Err(invalid()),
            }
        }

        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
