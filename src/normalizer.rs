// Unit normalizer
// Magnitude-suffixed cells → numbers. Token counts are kept in millions.

use crate::error::NormalizationError;

/// Strip whitespace and thousands separators.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect()
}

/// Drop a trailing unit word ("tokens", "token"), case-insensitive.
fn strip_unit_word(text: &str) -> &str {
    for word in ["tokens", "token"] {
        if text.len() >= word.len() {
            let split = text.len() - word.len();
            if text.is_char_boundary(split) && text[split..].eq_ignore_ascii_case(word) {
                return &text[..split];
            }
        }
    }
    text
}

/// Weekly token count in millions.
///
/// `"2.94B"` → 2940, `"600M"` → 600, `"1,200 tokens"` → 1200.
pub fn token_magnitude(text: &str) -> Result<f64, NormalizationError> {
    let compacted = compact(text);
    let body = strip_unit_word(&compacted);

    let (number, scale) = match body.chars().last() {
        Some('B') | Some('b') => (&body[..body.len() - 1], 1000.0),
        Some('M') | Some('m') => (&body[..body.len() - 1], 1.0),
        _ => (body, 1.0),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| NormalizationError::new("tokens", text))?;
    if !value.is_finite() {
        return Err(NormalizationError::new("tokens", text));
    }

    Ok(value * scale)
}

/// Context window in tokens. `"262K"` → 268288, `"4096"` → 4096.
pub fn context_length(text: &str) -> Result<i64, NormalizationError> {
    let body = compact(text);

    let (number, scale) = match body.chars().last() {
        Some('K') | Some('k') => (&body[..body.len() - 1], 1024),
        _ => (body.as_str(), 1),
    };

    let value: i64 = number
        .parse()
        .map_err(|_| NormalizationError::new("context_length", text))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| NormalizationError::new("context_length", text))
}

/// Price per million tokens, e.g. `"$0.15/M"` → 0.15.
///
/// An empty cell or `free` is a real zero price. Anything else that does not
/// parse is an error.
pub fn price(text: &str) -> Result<f64, NormalizationError> {
    let body = compact(text);
    if body.is_empty() || body.eq_ignore_ascii_case("free") {
        return Ok(0.0);
    }

    let mut number = body.trim_start_matches('$');
    for unit in ["/1M", "/M", "/1m", "/m"] {
        if let Some(stripped) = number.strip_suffix(unit) {
            number = stripped;
            break;
        }
    }

    let value: f64 = number
        .parse()
        .map_err(|_| NormalizationError::new("price", text))?;
    if !value.is_finite() || value < 0.0 {
        return Err(NormalizationError::new("price", text));
    }

    Ok(value)
}
