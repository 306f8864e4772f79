use std::time::Duration;

use crate::error::OrbError;

/// Parse a human-readable duration string.
///
/// Accepts formats like `"500ms"`, `"30s"`, `"2m"`, `"1h"` and bare numbers,
/// which are taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, OrbError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(OrbError::Validation {
            message: "duration cannot be empty".into(),
        });
    }

    // number, then an optional unit
    let (num_str, suffix) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(i) => (&s[..i], s[i..].to_ascii_lowercase()),
        None => (s, String::new()),
    };

    let num: u64 = num_str.trim().parse().map_err(|_| OrbError::Validation {
        message: format!("invalid duration number: '{num_str}'"),
    })?;

    let millis_per_unit: u64 = match suffix.as_str() {
        "ms" => 1,
        "" | "s" | "sec" | "secs" => 1000,
        "m" | "min" | "mins" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        _ => {
            return Err(OrbError::Validation {
                message: format!("unknown duration suffix: '{suffix}' (use ms, s, m, or h)"),
            });
        }
    };

    num.checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| OrbError::Validation {
            message: format!("duration overflows: '{s}'"),
        })
}

/// Flatten and shorten process output for single-line log fields.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.trim().replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
