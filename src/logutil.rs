//! Logging helpers that keep user supplied text (player names, ids) on a single log line.

/// Longest preview of a user string that makes it into the log.
pub const MAX_PREVIEW: usize = 120;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
/// - other control characters => `\xNN`
///
/// Anything past [`MAX_PREVIEW`] characters is cut and replaced with an ellipsis.
pub fn escape_log(s: &str) -> String {
    escape_log_limited(s, MAX_PREVIEW)
}

pub fn escape_log_limited(s: &str, max_chars: usize) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
