//! Player identity validation
//!
//! Player ids come from the chat platform and become keys in the player document, so
//! they are checked strictly. Display names are only shown back to people, so they are
//! cleaned up rather than rejected.

/// Player id validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Player id is empty")]
    Empty,

    #[error("Player id is too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("Player id cannot start or end with whitespace")]
    InvalidWhitespace,

    #[error("Player id contains invalid characters: {chars}")]
    InvalidCharacters { chars: String },
}

pub const MAX_PLAYER_ID_LEN: usize = 64;
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Shown when a display name is empty after cleanup.
pub const FALLBACK_DISPLAY_NAME: &str = "Unknown";

fn id_char_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':' | '@')
}

/// Validate a player id and return it unchanged.
pub fn validate_player_id(id: &str) -> Result<String, NameError> {
    if id.is_empty() {
        return Err(NameError::Empty);
    }
    if id.trim() != id {
        return Err(NameError::InvalidWhitespace);
    }
    if id.chars().count() > MAX_PLAYER_ID_LEN {
        return Err(NameError::TooLong { max: MAX_PLAYER_ID_LEN });
    }

    let mut invalid: Vec<char> = id.chars().filter(|c| !id_char_allowed(*c)).collect();
    if !invalid.is_empty() {
        invalid.sort_unstable();
        invalid.dedup();
        let chars = invalid
            .iter()
            .map(|c| {
                if c.is_control() || c.is_whitespace() {
                    format!("\\u{{{:04x}}}", *c as u32)
                } else {
                    c.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(NameError::InvalidCharacters { chars });
    }

    Ok(id.to_string())
}

/// Strip control characters, collapse runs of whitespace and cap the length.
pub fn sanitize_display_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_DISPLAY_NAME_LEN).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        FALLBACK_DISPLAY_NAME.to_string()
    } else {
        capped.to_string()
    }
}
